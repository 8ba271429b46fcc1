//! CDX index over the archive files of a directory
//!
//! The index is a whitespace-separated text file with one row per response
//! record. The header line names the columns, so rows are read through the
//! labels the file declares rather than through a fixed position.
//!
//! The index is derived data: `generate_index` rebuilds it from scratch by
//! scanning every `.warc.gz` file, and `append_index` adds rows for records
//! written since.

use crate::archive::http::parse_http_message;
use crate::archive::record::{RecordHeader, RecordType, RECORD_TRAILER};
use crate::archive::{ArchiveError, ArchiveResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use flate2::bufread::GzDecoder;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};
use url::Url;

/// File name of the index inside the archive directory
pub const INDEX_FILE_NAME: &str = "index.cdx";

/// Header line written at the top of every index file
pub const INDEX_HEADER: &str = "CDX a V S b g s m PayloadLength LastModified";

const INDEX_DATE_FORMAT: &str = "%Y%m%d%H%M%S";
const ARCHIVE_EXTENSION: &str = ".warc.gz";

/// One response record's location and metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexEntry {
    /// Target URL of the response
    pub url: String,

    /// Archive file name, relative to the archive directory
    pub warc_file: String,

    /// Offset of the record's gzip member in the archive file
    pub compressed_offset: u64,

    /// Length of the record's gzip member
    pub compressed_length: u64,

    /// Capture date (second precision)
    pub date: Option<DateTime<Utc>>,

    /// HTTP status code of the response
    pub http_status: Option<u16>,

    /// Media type of the response, without parameters
    pub content_type: Option<String>,

    /// Decoded payload length in bytes
    pub payload_length: Option<u64>,

    /// `Last-Modified` date reported by the server
    pub last_modified: Option<DateTime<Utc>>,
}

impl IndexEntry {
    /// Full path of the archive file holding this record
    pub fn archive_path(&self, directory: &Path) -> PathBuf {
        directory.join(&self.warc_file)
    }
}

/// Binds a header label to how the column is written and read back
struct Column {
    label: &'static str,
    write: fn(&IndexEntry) -> String,
    read: fn(&mut IndexEntry, &str) -> Result<(), String>,
}

const COLUMNS: &[Column] = &[
    Column {
        label: "a",
        write: |e| e.url.clone(),
        read: |e, v| {
            e.url = v.to_string();
            Ok(())
        },
    },
    Column {
        label: "V",
        write: |e| e.compressed_offset.to_string(),
        read: |e, v| {
            e.compressed_offset = parse_number(v)?;
            Ok(())
        },
    },
    Column {
        label: "S",
        write: |e| e.compressed_length.to_string(),
        read: |e, v| {
            e.compressed_length = parse_number(v)?;
            Ok(())
        },
    },
    Column {
        label: "b",
        write: |e| format_date(e.date),
        read: |e, v| {
            e.date = parse_date(v)?;
            Ok(())
        },
    },
    Column {
        label: "g",
        write: |e| e.warc_file.clone(),
        read: |e, v| {
            e.warc_file = v.to_string();
            Ok(())
        },
    },
    Column {
        label: "s",
        write: |e| dash_or(e.http_status),
        read: |e, v| {
            e.http_status = parse_optional(v)?;
            Ok(())
        },
    },
    Column {
        label: "m",
        write: |e| match e.content_type.as_deref() {
            Some(ct) if !ct.is_empty() => ct.to_string(),
            _ => "-".to_string(),
        },
        read: |e, v| {
            e.content_type = (v != "-").then(|| v.to_string());
            Ok(())
        },
    },
    Column {
        label: "PayloadLength",
        write: |e| dash_or(e.payload_length),
        read: |e, v| {
            e.payload_length = parse_optional(v)?;
            Ok(())
        },
    },
    Column {
        label: "LastModified",
        write: |e| format_date(e.last_modified),
        read: |e, v| {
            e.last_modified = parse_date(v)?;
            Ok(())
        },
    },
];

fn parse_number<T: std::str::FromStr>(value: &str) -> Result<T, String> {
    value
        .parse::<T>()
        .map_err(|_| format!("invalid number '{}'", value))
}

fn parse_optional<T: std::str::FromStr>(value: &str) -> Result<Option<T>, String> {
    if value == "-" {
        Ok(None)
    } else {
        parse_number(value).map(Some)
    }
}

fn dash_or<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn format_date(date: Option<DateTime<Utc>>) -> String {
    date.map_or_else(
        || "-".to_string(),
        |d| d.format(INDEX_DATE_FORMAT).to_string(),
    )
}

fn parse_date(value: &str) -> Result<Option<DateTime<Utc>>, String> {
    if value == "-" {
        return Ok(None);
    }
    NaiveDateTime::parse_from_str(value, INDEX_DATE_FORMAT)
        .map(|naive| Some(naive.and_utc()))
        .map_err(|_| format!("invalid date '{}'", value))
}

/// Formats an entry as one index row (without the newline)
pub(crate) fn format_row(entry: &IndexEntry) -> String {
    COLUMNS
        .iter()
        .map(|column| (column.write)(entry))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reads every row of an index file
///
/// Columns are mapped through the labels following `CDX` in the header
/// line; labels without a known column are skipped.
pub fn read_index(path: &Path) -> ArchiveResult<Vec<IndexEntry>> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = reader.lines();

    let header = lines.next().transpose()?.unwrap_or_default();
    let mut labels = header.split_whitespace();
    if !labels.any(|label| label == "CDX") {
        return Err(ArchiveError::IndexHeader {
            path: path.display().to_string(),
            found: header.clone(),
        });
    }
    let columns: Vec<Option<&Column>> = labels
        .map(|label| COLUMNS.iter().find(|c| c.label == label))
        .collect();

    let mut entries = Vec::new();
    for (number, line) in lines.enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let mut entry = IndexEntry::default();
        for (column, value) in columns.iter().zip(line.split_whitespace()) {
            if let Some(column) = column {
                (column.read)(&mut entry, value).map_err(|message| ArchiveError::IndexRow {
                    line: number + 2,
                    message,
                })?;
            }
        }
        entries.push(entry);
    }

    Ok(entries)
}

/// Appends rows to the directory's index, creating it if needed
///
/// An existing index must carry the same header line; rows are never
/// appended to an index with a different column layout.
pub fn append_index(directory: &Path, entries: &[IndexEntry]) -> ArchiveResult<()> {
    if entries.is_empty() {
        return Ok(());
    }

    let path = directory.join(INDEX_FILE_NAME);
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(&path)?;

    let mut text = String::new();
    if file.metadata()?.len() == 0 {
        text.push_str(INDEX_HEADER);
        text.push('\n');
    } else {
        let mut first = String::new();
        BufReader::new(&file).read_line(&mut first)?;
        if first.trim_end() != INDEX_HEADER {
            return Err(ArchiveError::IndexHeader {
                path: path.display().to_string(),
                found: first.trim_end().to_string(),
            });
        }
    }

    for entry in entries {
        text.push_str(&format_row(entry));
        text.push('\n');
    }

    file.write_all(text.as_bytes())?;
    file.sync_data()?;
    tracing::debug!("Appended {} rows to {}", entries.len(), path.display());
    Ok(())
}

/// Lists the archive files of a directory in name order
pub(crate) fn list_archive_files(directory: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for item in fs::read_dir(directory)? {
        let path = item?.path();
        let is_archive = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(ARCHIVE_EXTENSION));
        if is_archive && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Rebuilds the directory's index by scanning every archive file
///
/// The index is written to a temporary file and renamed into place, so a
/// crash never leaves a half-written index behind. Files are scanned in name
/// order, which makes the output byte-identical across runs over the same
/// archives. A file whose last record is cut short yields all of its
/// complete records and a warning.
pub fn generate_index(directory: &Path) -> ArchiveResult<Vec<IndexEntry>> {
    let tmp_path = directory.join(format!("{}.tmp", INDEX_FILE_NAME));
    let entries = match write_index_file(directory, &tmp_path) {
        Ok(entries) => entries,
        Err(err) => {
            let _ = fs::remove_file(&tmp_path);
            return Err(err);
        }
    };
    fs::rename(&tmp_path, directory.join(INDEX_FILE_NAME))?;

    tracing::info!(
        "Generated index for {} with {} entries",
        directory.display(),
        entries.len()
    );
    Ok(entries)
}

/// Scans every archive file of `directory` into a fresh index at `path`
fn write_index_file(directory: &Path, path: &Path) -> ArchiveResult<Vec<IndexEntry>> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "{}", INDEX_HEADER)?;

    let mut entries = Vec::new();
    for archive in list_archive_files(directory)? {
        let file_name = archive
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        tracing::info!("Indexing {}", file_name);

        let first = entries.len();
        scan_archive_file(&archive, &file_name, &mut entries)?;
        for entry in &entries[first..] {
            writeln!(out, "{}", format_row(entry))?;
        }
    }

    out.flush()?;
    Ok(entries)
}

fn scan_archive_file(
    path: &Path,
    file_name: &str,
    entries: &mut Vec<IndexEntry>,
) -> ArchiveResult<()> {
    let file = File::open(path)?;
    let file_length = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    loop {
        let start = reader.stream_position()?;
        if start == file_length {
            return Ok(());
        }

        match scan_member(&mut reader) {
            Ok(Some(mut entry)) => {
                let end = reader.stream_position()?;
                entry.warc_file = file_name.to_string();
                entry.compressed_offset = start;
                entry.compressed_length = end - start;
                entries.push(entry);
            }
            Ok(None) => {}
            Err(err) => {
                if reader.stream_position()? == file_length {
                    tracing::warn!(
                        "Truncated archive {} at offset {}: {}",
                        file_name,
                        start,
                        err
                    );
                    return Ok(());
                }
                return Err(err);
            }
        }
    }
}

/// Reads one gzip member holding one record. Returns an entry for responses.
fn scan_member<R: BufRead>(reader: &mut R) -> ArchiveResult<Option<IndexEntry>> {
    let mut member = BufReader::new(GzDecoder::new(reader));
    let header = RecordHeader::read_from(&mut member)?;

    let entry = if header.record_type == RecordType::Response {
        let url = header
            .target_uri
            .clone()
            .ok_or_else(|| ArchiveError::RecordHeader("response without WARC-Target-URI".into()))?;
        let mut content = (&mut member).take(header.content_length);
        let mut entry = describe_response(&url, header.date, &mut content, header.content_length)?;
        io::copy(&mut content, &mut io::sink())?;
        if content.limit() != 0 {
            return Err(ArchiveError::UnexpectedEof("response record content"));
        }
        entry.url = url;
        Some(entry)
    } else {
        let skipped = io::copy(&mut (&mut member).take(header.content_length), &mut io::sink())?;
        if skipped != header.content_length {
            return Err(ArchiveError::UnexpectedEof("record content"));
        }
        None
    };

    let mut trailer = [0u8; 4];
    member
        .read_exact(&mut trailer)
        .map_err(|_| ArchiveError::UnexpectedEof("record trailer"))?;
    if trailer != RECORD_TRAILER {
        return Err(ArchiveError::MissingCrlf);
    }

    let mut extra = [0u8; 1];
    if member.read(&mut extra)? != 0 {
        return Err(ArchiveError::RecordHeader(
            "unexpected data after record trailer".to_string(),
        ));
    }

    Ok(entry)
}

/// Parses a stored HTTP response and measures its payload
///
/// Offsets and the file name are left for the caller to fill in. The
/// decoded payload is counted; a declared `Content-Length` that disagrees
/// with the count, or body bytes the framing does not account for, are an
/// error.
pub(crate) fn describe_response<R: BufRead>(
    url: &str,
    date: Option<DateTime<Utc>>,
    reader: &mut R,
    message_length: u64,
) -> ArchiveResult<IndexEntry> {
    let base = Url::parse(url).ok();
    let mut message = parse_http_message(reader, message_length, base.as_ref())?;
    let counted = message.count_payload()?;
    let head = message.head;

    if let Some(declared) = head.payload_length {
        if declared != counted {
            return Err(ArchiveError::LengthMismatch {
                declared,
                actual: counted,
            });
        }
    }

    Ok(IndexEntry {
        url: url.to_string(),
        warc_file: String::new(),
        compressed_offset: 0,
        compressed_length: 0,
        date,
        http_status: Some(head.status_code),
        content_type: head.content_type,
        payload_length: Some(counted),
        last_modified: head.last_modified,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn sample_entry() -> IndexEntry {
        IndexEntry {
            url: "https://example.com/a?b=c".to_string(),
            warc_file: "archive-web-00000.warc.gz".to_string(),
            compressed_offset: 1234,
            compressed_length: 567,
            date: Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()),
            http_status: Some(200),
            content_type: Some("text/html".to_string()),
            payload_length: Some(42),
            last_modified: None,
        }
    }

    #[test]
    fn test_row_format() {
        assert_eq!(
            format_row(&sample_entry()),
            "https://example.com/a?b=c 1234 567 20240102030405 archive-web-00000.warc.gz 200 text/html 42 -"
        );
    }

    #[test]
    fn test_missing_content_type_written_as_dash() {
        let mut entry = sample_entry();
        entry.content_type = None;
        assert!(format_row(&entry).contains(" 200 - 42 "));
    }

    #[test]
    fn test_append_then_read() {
        let dir = TempDir::new().unwrap();
        let entry = sample_entry();
        append_index(dir.path(), &[entry.clone()]).unwrap();
        append_index(dir.path(), &[entry.clone()]).unwrap();

        let text = fs::read_to_string(dir.path().join(INDEX_FILE_NAME)).unwrap();
        assert!(text.starts_with(INDEX_HEADER));
        assert_eq!(text.lines().count(), 3);

        let entries = read_index(&dir.path().join(INDEX_FILE_NAME)).unwrap();
        assert_eq!(entries, vec![entry.clone(), entry]);
    }

    #[test]
    fn test_append_refuses_foreign_header() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(INDEX_FILE_NAME), "CDX N b a m s k r M S V g\n").unwrap();
        let result = append_index(dir.path(), &[sample_entry()]);
        assert!(matches!(result, Err(ArchiveError::IndexHeader { .. })));
    }

    #[test]
    fn test_read_maps_columns_by_label() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(INDEX_FILE_NAME);
        fs::write(
            &path,
            " CDX g a x s\narchive-media-00001.warc.gz https://example.com/img.png ignored 404\n",
        )
        .unwrap();

        let entries = read_index(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].url, "https://example.com/img.png");
        assert_eq!(entries[0].warc_file, "archive-media-00001.warc.gz");
        assert_eq!(entries[0].http_status, Some(404));
    }

    #[test]
    fn test_read_rejects_bad_number() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(INDEX_FILE_NAME);
        fs::write(&path, format!("{}\nhttps://x/ abc 1 - f 200 - 1 -\n", INDEX_HEADER)).unwrap();
        assert!(matches!(
            read_index(&path),
            Err(ArchiveError::IndexRow { line: 2, .. })
        ));
    }

    #[test]
    fn test_describe_response_counts_chunked_payload() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n2\r\nde\r\n0\r\n\r\n";
        let entry =
            describe_response("https://example.com/", None, &mut &raw[..], raw.len() as u64)
                .unwrap();
        assert_eq!(entry.payload_length, Some(5));
        assert_eq!(entry.http_status, Some(200));
        assert_eq!(entry.content_type.as_deref(), Some("text/plain"));
    }

    #[test]
    fn test_describe_response_rejects_bytes_after_last_chunk() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\n\r\nGARBAGE-GARBAGE";
        let result =
            describe_response("https://example.com/", None, &mut &raw[..], raw.len() as u64);
        assert!(matches!(
            result,
            Err(ArchiveError::LengthMismatch {
                declared: 28,
                actual: 13
            })
        ));
    }

    #[test]
    fn test_failed_generation_removes_temporary_file() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let dir = TempDir::new().unwrap();
        let mut file = File::create(dir.path().join("archive-web-00000.warc.gz")).unwrap();
        for _ in 0..2 {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(b"not a record\r\n\r\n").unwrap();
            file.write_all(&encoder.finish().unwrap()).unwrap();
        }
        drop(file);

        assert!(generate_index(dir.path()).is_err());
        assert!(!dir.path().join(format!("{}.tmp", INDEX_FILE_NAME)).exists());
        assert!(!dir.path().join(INDEX_FILE_NAME).exists());
    }
}
