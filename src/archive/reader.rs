//! Reads archived responses back out through their index entries

use crate::archive::http::parse_http_message;
use crate::archive::record::{RecordHeader, RecordType};
use crate::archive::{ArchiveError, ArchiveResult, IndexEntry};
use chrono::{DateTime, Utc};
use flate2::bufread::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use url::Url;

/// A response record as it was stored, with its payload decoded
#[derive(Debug, Clone)]
pub struct ArchivedResponse {
    pub url: String,
    pub date: Option<DateTime<Utc>>,
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
    pub content_type: Option<String>,
    pub location: Option<Url>,
    pub last_modified: Option<DateTime<Utc>>,
    pub payload: Vec<u8>,
}

impl ArchivedResponse {
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("html"))
    }
}

/// Opens the record an index entry points at and decodes its payload
pub fn open_record(directory: &Path, entry: &IndexEntry) -> ArchiveResult<ArchivedResponse> {
    let mut file = File::open(entry.archive_path(directory))?;
    file.seek(SeekFrom::Start(entry.compressed_offset))?;

    let compressed = BufReader::new(file.take(entry.compressed_length));
    let mut member = BufReader::new(GzDecoder::new(compressed));

    let header = RecordHeader::read_from(&mut member)?;
    if header.record_type != RecordType::Response {
        return Err(ArchiveError::RecordHeader(format!(
            "expected a response record at {}:{}, found {}",
            entry.warc_file, entry.compressed_offset, header.record_type
        )));
    }

    let url = header.target_uri.clone().unwrap_or_else(|| entry.url.clone());
    let base = Url::parse(&url).ok();
    let message = parse_http_message(member, header.content_length, base.as_ref())?;
    let head = message.head.clone();
    let payload = message.read_payload()?;

    Ok(ArchivedResponse {
        url,
        date: header.date,
        status_code: head.status_code,
        headers: head.headers,
        content_type: head.content_type,
        location: head.location,
        last_modified: head.last_modified,
        payload,
    })
}
