//! Parser for stored HTTP response messages
//!
//! The same parser runs when the writer derives index metadata from bytes it
//! has just written and when the reader serves an archived response back
//! out, so both sides always agree on what a record contains.

use crate::archive::{ArchiveError, ArchiveResult, ChunkedDecoder};
use chrono::{DateTime, Utc};
use flate2::bufread::GzDecoder;
use std::cell::Cell;
use std::io::{self, BufRead, BufReader, Read};
use std::rc::Rc;
use url::Url;

/// Buffer size handed to the brotli decompressor
const BROTLI_BUFFER_SIZE: usize = 4096;

/// Content coding applied to the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Identity,
    Gzip,
    Brotli,
}

/// Status line and headers of an HTTP message, plus framing facts
#[derive(Debug, Clone)]
pub struct HttpHead {
    /// Status code from the status line
    pub status_code: u16,

    /// Header lines in wire order, split at the first colon and trimmed
    pub headers: Vec<(String, String)>,

    /// Target of a `Location` header, resolved against the request URL
    pub location: Option<Url>,

    /// Media type from `Content-Type`, without parameters
    pub content_type: Option<String>,

    /// Parsed `Last-Modified` date, if present and well-formed
    pub last_modified: Option<DateTime<Utc>>,

    /// Declared `Content-Length`; `None` when absent or when the body is
    /// chunked or compressed
    pub payload_length: Option<u64>,

    /// True for `Transfer-Encoding: chunked`
    pub chunked: bool,

    /// Content coding of the payload
    pub encoding: ContentEncoding,

    /// Bytes taken by the status line and headers, including the blank line
    pub head_length: u64,

    /// Bytes of the message after the head
    pub body_length: u64,
}

impl HttpHead {
    /// Returns the first header value with the given name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns true if the status code denotes a failed fetch
    pub fn is_error_status(&self) -> bool {
        is_error_status(self.status_code)
    }

    /// Layers the body decoders over `raw`, which must yield at least the
    /// message body (`body_length` bytes)
    ///
    /// The returned message refuses to end early: once the decoded payload
    /// is exhausted, any body byte left unconsumed is a length mismatch.
    pub fn decode_body<'a, R: BufRead + 'a>(&self, raw: R) -> HttpBody<'a> {
        let remaining = Rc::new(Cell::new(self.body_length));
        let limited = BodyReader {
            inner: raw,
            remaining: Rc::clone(&remaining),
        };

        let framed: Box<dyn BufRead + 'a> = if self.chunked {
            Box::new(BufReader::new(ChunkedDecoder::new(limited)))
        } else {
            Box::new(limited)
        };

        let decoded: Box<dyn Read + 'a> = match self.encoding {
            ContentEncoding::Identity => Box::new(framed),
            ContentEncoding::Gzip => Box::new(GzDecoder::new(framed)),
            ContentEncoding::Brotli => {
                Box::new(brotli::Decompressor::new(framed, BROTLI_BUFFER_SIZE))
            }
        };

        HttpBody {
            decoded,
            remaining,
            body_length: self.body_length,
        }
    }
}

/// Message body limited to `body_length` bytes, sharing its unread count
/// with the `HttpBody` on top of it
struct BodyReader<R> {
    inner: R,
    remaining: Rc<Cell<u64>>,
}

impl<R: BufRead> Read for BodyReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl<R: BufRead> BufRead for BodyReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        let left = self.remaining.get();
        if left == 0 {
            return Ok(&[]);
        }
        let buf = self.inner.fill_buf()?;
        let n = (buf.len() as u64).min(left) as usize;
        Ok(&buf[..n])
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt);
        self.remaining
            .set(self.remaining.get().saturating_sub(amt as u64));
    }
}

/// Decoded payload stream of a message
pub struct HttpBody<'a> {
    decoded: Box<dyn Read + 'a>,
    remaining: Rc<Cell<u64>>,
    body_length: u64,
}

impl<'a> HttpBody<'a> {
    /// Fails unless the decoders consumed the whole body. Call after the
    /// decoded stream returned end of file.
    pub fn check_consumed(&self) -> ArchiveResult<()> {
        let left = self.remaining.get();
        if left == 0 {
            Ok(())
        } else {
            Err(ArchiveError::LengthMismatch {
                declared: self.body_length,
                actual: self.body_length - left,
            })
        }
    }
}

impl<'a> Read for HttpBody<'a> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.decoded.read(buf)
    }
}

/// A parsed HTTP message with a lazily decoded payload stream
pub struct HttpMessage<'a> {
    pub head: HttpHead,
    body: HttpBody<'a>,
}

impl<'a> HttpMessage<'a> {
    /// The decoded payload stream
    pub fn body(&mut self) -> &mut HttpBody<'a> {
        &mut self.body
    }

    /// Reads the whole decoded payload into memory
    ///
    /// Body bytes left over after the payload ends, or a body shorter than
    /// its framing, are a `LengthMismatch`.
    pub fn read_payload(mut self) -> ArchiveResult<Vec<u8>> {
        let mut payload = Vec::new();
        self.body.read_to_end(&mut payload)?;
        self.body.check_consumed()?;
        Ok(payload)
    }

    /// Consumes the decoded payload and returns its length
    pub fn count_payload(&mut self) -> ArchiveResult<u64> {
        let counted = io::copy(&mut self.body, &mut io::sink())?;
        self.body.check_consumed()?;
        Ok(counted)
    }
}

/// Returns true for status codes below 100 or at least 400
///
/// Synthetic transport codes (800 and up) fall in the error range too.
pub fn is_error_status(code: u16) -> bool {
    !(100..400).contains(&code)
}

/// Parses the status line and headers of a message
///
/// `message_length` is the total number of bytes of the stored message
/// (the record's content length). `request_url` resolves relative
/// `Location` values. The reader is left positioned at the first body byte.
///
/// Header names are matched case-sensitively in their canonical spelling.
/// When the body is neither chunked nor compressed, a `Content-Length` that
/// disagrees with the stored body size is a hard error.
pub fn parse_http_head<R: BufRead>(
    reader: &mut R,
    message_length: u64,
    request_url: Option<&Url>,
) -> ArchiveResult<HttpHead> {
    let mut line = Vec::new();

    let n = reader.read_until(b'\n', &mut line)?;
    if n == 0 {
        return Err(ArchiveError::UnexpectedEof("HTTP status line"));
    }
    let mut consumed = n as u64;
    let status_code = parse_status_code(&String::from_utf8_lossy(trim_eol(&line)))?;

    let mut head = HttpHead {
        status_code,
        headers: Vec::new(),
        location: None,
        content_type: None,
        last_modified: None,
        payload_length: None,
        chunked: false,
        encoding: ContentEncoding::Identity,
        head_length: 0,
        body_length: 0,
    };
    let mut content_length = None;

    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line)?;
        if n == 0 || line.last() != Some(&b'\n') {
            return Err(ArchiveError::UnexpectedEof("HTTP headers"));
        }
        consumed += n as u64;

        let text = String::from_utf8_lossy(trim_eol(&line)).into_owned();
        if text.is_empty() {
            break;
        }

        let Some((name, value)) = text.split_once(':') else {
            continue;
        };
        let value = value.trim();

        match name {
            "Transfer-Encoding" => {
                if value == "chunked" {
                    head.chunked = true;
                }
            }
            "Content-Length" => {
                let declared = value.parse::<u64>().map_err(|_| {
                    ArchiveError::Http(format!("invalid Content-Length '{}'", value))
                })?;
                content_length = Some(declared);
            }
            "Content-Encoding" => match value {
                "gzip" => head.encoding = ContentEncoding::Gzip,
                "br" => head.encoding = ContentEncoding::Brotli,
                _ => {}
            },
            "Location" => {
                head.location = resolve_location(value, request_url);
                if head.location.is_none() {
                    tracing::debug!("Ignoring unparseable Location header '{}'", value);
                }
            }
            "Content-Type" => {
                let media = value.split([' ', ';']).next().unwrap_or_default();
                head.content_type = Some(media.to_string()).filter(|s| !s.is_empty());
            }
            "Last-Modified" => {
                head.last_modified = parse_http_date(value);
            }
            _ => {}
        }

        head.headers.push((name.trim().to_string(), value.to_string()));
    }

    head.head_length = consumed;
    head.body_length = message_length.checked_sub(consumed).ok_or_else(|| {
        ArchiveError::Http(format!(
            "headers take {} bytes but the message has only {}",
            consumed, message_length
        ))
    })?;

    let compressed = head.encoding != ContentEncoding::Identity;
    if !compressed && !head.chunked {
        if let Some(declared) = content_length {
            if declared != head.body_length {
                return Err(ArchiveError::LengthMismatch {
                    declared,
                    actual: head.body_length,
                });
            }
        }
        head.payload_length = content_length;
    }

    Ok(head)
}

/// Parses a full message, wrapping the body in a length-limited,
/// de-chunked, and decompressed stream
pub fn parse_http_message<'a, R: BufRead + 'a>(
    mut reader: R,
    message_length: u64,
    request_url: Option<&Url>,
) -> ArchiveResult<HttpMessage<'a>> {
    let head = parse_http_head(&mut reader, message_length, request_url)?;
    let body = head.decode_body(reader);
    Ok(HttpMessage { head, body })
}

/// Status code sits between the first and second space of the status line,
/// or after the first space when there is no second one.
fn parse_status_code(status_line: &str) -> ArchiveResult<u16> {
    let mut parts = status_line.splitn(3, ' ');
    let _version = parts.next();
    parts
        .next()
        .and_then(|code| code.trim().parse::<u16>().ok())
        .ok_or_else(|| ArchiveError::Http(format!("invalid status line '{}'", status_line)))
}

fn resolve_location(value: &str, request_url: Option<&Url>) -> Option<Url> {
    match request_url {
        Some(base) if value.starts_with("//") => {
            Url::parse(&format!("{}:{}", base.scheme(), value)).ok()
        }
        Some(base) => base.join(value).ok(),
        None => Url::parse(value).ok(),
    }
}

/// Parses an IMF-fixdate such as `Sun, 06 Nov 1994 08:49:37 GMT`
fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn trim_eol(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
