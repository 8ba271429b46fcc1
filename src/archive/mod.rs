//! Archive module: WARC files and their CDX index
//!
//! This module owns everything that touches archived bytes:
//! - Decoding chunked transfer encoding
//! - Parsing stored HTTP messages (shared by the writer and the reader)
//! - Writing request/response records into rotating `.warc.gz` files
//! - Generating, appending, and loading the `index.cdx` lookup table
//! - Serving archived responses back out as a cache

mod chunked;
mod http;
mod index;
mod reader;
mod record;
mod store;
mod writer;

pub use chunked::ChunkedDecoder;
pub use http::{
    is_error_status, parse_http_head, parse_http_message, ContentEncoding, HttpHead, HttpMessage,
};
pub use index::{
    append_index, generate_index, read_index, IndexEntry, INDEX_FILE_NAME, INDEX_HEADER,
};
pub use reader::{open_record, ArchivedResponse};
pub use record::{RecordHeader, RecordType};
pub use store::{ArchiveStore, ExchangeRecord};
pub use writer::{archive_file_name, ArchiveWriter};

use thiserror::Error;

/// Errors raised while reading or writing archive data
///
/// These are framing and format violations. They are fatal to the record
/// being parsed; index generation downgrades them to a warning only when the
/// failing record is the truncated tail of a file.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid chunk size digit: {0:#04x}")]
    InvalidChunkSize(u8),

    #[error("Expected CRLF")]
    MissingCrlf,

    #[error("Unexpected end of data while reading {0}")]
    UnexpectedEof(&'static str),

    #[error("Malformed HTTP message: {0}")]
    Http(String),

    #[error("Content-Length mismatch: header says {declared}, body has {actual} bytes")]
    LengthMismatch { declared: u64, actual: u64 },

    #[error("Malformed record header: {0}")]
    RecordHeader(String),

    #[error("Index file {path} has an unexpected header: {found}")]
    IndexHeader { path: String, found: String },

    #[error("Malformed index row {line}: {message}")]
    IndexRow { line: usize, message: String },
}

/// Result type alias for archive operations
pub type ArchiveResult<T> = Result<T, ArchiveError>;
