//! WARC record header block
//!
//! Every record starts with `WARC/1.0` followed by `Name: value` lines in a
//! fixed order and a blank line. The payload and a trailing `\r\n\r\n`
//! follow the header.

use crate::archive::{ArchiveError, ArchiveResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::fmt;
use std::io::BufRead;
use uuid::Uuid;

const WARC_VERSION: &str = "WARC/1.0";
const WARC_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Bytes that close every record after its payload
pub const RECORD_TRAILER: &[u8] = b"\r\n\r\n";

/// Kind of a WARC record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordType {
    Warcinfo,
    Request,
    Response,
    Other(String),
}

impl RecordType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Warcinfo => "warcinfo",
            Self::Request => "request",
            Self::Response => "response",
            Self::Other(s) => s,
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "warcinfo" => Self::Warcinfo,
            "request" => Self::Request,
            "response" => Self::Response,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata block of one WARC record
#[derive(Debug, Clone, PartialEq)]
pub struct RecordHeader {
    pub record_type: RecordType,
    pub content_type: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub record_id: Option<Uuid>,
    pub target_uri: Option<String>,
    pub ip_address: Option<String>,
    pub concurrent_to: Option<Uuid>,
    pub content_length: u64,
    pub warcinfo_id: Option<Uuid>,
}

impl RecordHeader {
    /// Header for a request or response record carrying an HTTP message
    #[allow(clippy::too_many_arguments)]
    pub fn for_exchange(
        is_response: bool,
        url: &str,
        date: DateTime<Utc>,
        ip_address: &str,
        record_id: Uuid,
        concurrent_to: Option<Uuid>,
        content_length: u64,
        warcinfo_id: Uuid,
    ) -> Self {
        let (record_type, msgtype) = if is_response {
            (RecordType::Response, "response")
        } else {
            (RecordType::Request, "request")
        };

        Self {
            record_type,
            content_type: Some(format!("application/http;msgtype={}", msgtype)),
            date: Some(date),
            record_id: Some(record_id),
            target_uri: Some(url.to_string()),
            ip_address: Some(ip_address.to_string()),
            concurrent_to,
            content_length,
            warcinfo_id: Some(warcinfo_id),
        }
    }

    /// Serializes the header block, including the terminating blank line
    pub fn encode(&self) -> Vec<u8> {
        let mut out = String::new();
        let mut line = |name: &str, value: &str| {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push_str("\r\n");
        };

        line("WARC-Type", self.record_type.as_str());
        if let Some(content_type) = &self.content_type {
            line("Content-Type", content_type);
        }
        if let Some(date) = &self.date {
            line("WARC-Date", &date.format(WARC_DATE_FORMAT).to_string());
        }
        if let Some(id) = &self.record_id {
            line("WARC-Record-ID", &format_record_id(id));
        }
        if let Some(uri) = &self.target_uri {
            line("WARC-Target-URI", uri);
        }
        if let Some(ip) = &self.ip_address {
            line("WARC-IP-Address", ip);
        }
        if let Some(id) = &self.concurrent_to {
            line("WARC-Concurrent-To", &format_record_id(id));
        }
        line("Content-Length", &self.content_length.to_string());
        if let Some(id) = &self.warcinfo_id {
            line("WARC-Warcinfo-ID", &format_record_id(id));
        }

        let mut encoded = Vec::with_capacity(out.len() + WARC_VERSION.len() + 4);
        encoded.extend_from_slice(WARC_VERSION.as_bytes());
        encoded.extend_from_slice(b"\r\n");
        encoded.extend_from_slice(out.as_bytes());
        encoded.extend_from_slice(b"\r\n");
        encoded
    }

    /// Reads a header block up to and including its blank line
    pub fn read_from<R: BufRead>(reader: &mut R) -> ArchiveResult<Self> {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(ArchiveError::UnexpectedEof("record header"));
        }
        if !line.starts_with("WARC/") {
            return Err(ArchiveError::RecordHeader(format!(
                "expected version line, got '{}'",
                line.trim_end()
            )));
        }

        let mut record_type = None;
        let mut header = Self {
            record_type: RecordType::Other(String::new()),
            content_type: None,
            date: None,
            record_id: None,
            target_uri: None,
            ip_address: None,
            concurrent_to: None,
            content_length: 0,
            warcinfo_id: None,
        };
        let mut content_length = None;

        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                return Err(ArchiveError::UnexpectedEof("record header"));
            }
            let text = line.trim_end_matches(['\r', '\n']);
            if text.is_empty() {
                break;
            }

            let Some((name, value)) = text.split_once(':') else {
                return Err(ArchiveError::RecordHeader(format!(
                    "header line without colon: '{}'",
                    text
                )));
            };
            let value = value.trim();

            match name {
                "WARC-Type" => record_type = Some(RecordType::parse(value)),
                "Content-Type" => header.content_type = Some(value.to_string()),
                "WARC-Date" => header.date = parse_warc_date(value),
                "WARC-Record-ID" => header.record_id = parse_record_id(value),
                "WARC-Target-URI" => header.target_uri = Some(value.to_string()),
                "WARC-IP-Address" => header.ip_address = Some(value.to_string()),
                "WARC-Concurrent-To" => header.concurrent_to = parse_record_id(value),
                "WARC-Warcinfo-ID" => header.warcinfo_id = parse_record_id(value),
                "Content-Length" => {
                    content_length = Some(value.parse::<u64>().map_err(|_| {
                        ArchiveError::RecordHeader(format!("invalid Content-Length '{}'", value))
                    })?);
                }
                _ => {}
            }
        }

        header.record_type = record_type
            .ok_or_else(|| ArchiveError::RecordHeader("missing WARC-Type".to_string()))?;
        header.content_length = content_length
            .ok_or_else(|| ArchiveError::RecordHeader("missing Content-Length".to_string()))?;
        Ok(header)
    }
}

fn format_record_id(id: &Uuid) -> String {
    format!("<urn:uuid:{}>", id)
}

fn parse_record_id(value: &str) -> Option<Uuid> {
    let inner = value
        .strip_prefix("<urn:uuid:")
        .and_then(|v| v.strip_suffix('>'))
        .unwrap_or(value);
    Uuid::parse_str(inner).ok()
}

fn parse_warc_date(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, WARC_DATE_FORMAT)
        .map(|naive| naive.and_utc())
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|d| d.with_timezone(&Utc))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> RecordHeader {
        RecordHeader::for_exchange(
            true,
            "https://example.com/",
            Utc.with_ymd_and_hms(2024, 3, 5, 7, 9, 11).unwrap(),
            "127.0.0.1",
            Uuid::new_v4(),
            Some(Uuid::new_v4()),
            42,
            Uuid::new_v4(),
        )
    }

    #[test]
    fn test_encode_field_order() {
        let header = sample();
        let text = String::from_utf8(header.encode()).unwrap();
        let names: Vec<&str> = text
            .lines()
            .skip(1)
            .filter_map(|l| l.split_once(':').map(|(n, _)| n))
            .collect();
        assert!(text.starts_with("WARC/1.0\r\nWARC-Type: response\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
        assert!(text.contains("WARC-Date: 2024-03-05T07:09:11Z\r\n"));
        assert!(text.contains("Content-Type: application/http;msgtype=response\r\n"));
        assert_eq!(
            names,
            vec![
                "WARC-Type",
                "Content-Type",
                "WARC-Date",
                "WARC-Record-ID",
                "WARC-Target-URI",
                "WARC-IP-Address",
                "WARC-Concurrent-To",
                "Content-Length",
                "WARC-Warcinfo-ID",
            ]
        );
    }

    #[test]
    fn test_read_back_encoded_header() {
        let header = sample();
        let mut encoded = header.encode();
        encoded.extend_from_slice(b"payload");
        let mut reader = &encoded[..];
        let parsed = RecordHeader::read_from(&mut reader).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(reader, b"payload");
    }

    #[test]
    fn test_request_header_has_no_concurrent_to() {
        let header = RecordHeader::for_exchange(
            false,
            "https://example.com/",
            Utc::now(),
            "::1",
            Uuid::new_v4(),
            None,
            0,
            Uuid::new_v4(),
        );
        let text = String::from_utf8(header.encode()).unwrap();
        assert!(text.contains("WARC-Type: request\r\n"));
        assert!(!text.contains("WARC-Concurrent-To"));
    }

    #[test]
    fn test_missing_content_length_is_error() {
        let raw = b"WARC/1.0\r\nWARC-Type: response\r\n\r\n";
        let result = RecordHeader::read_from(&mut &raw[..]);
        assert!(matches!(result, Err(ArchiveError::RecordHeader(_))));
    }

    #[test]
    fn test_truncated_header_is_eof_error() {
        let raw = b"WARC/1.0\r\nWARC-Type: response\r\n";
        let result = RecordHeader::read_from(&mut &raw[..]);
        assert!(matches!(result, Err(ArchiveError::UnexpectedEof(_))));
    }
}
