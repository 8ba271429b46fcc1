//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests with redirects left to the scheduler
//! - Rebuilding the exchange as HTTP/1.1 bytes for the archive
//! - Mapping transport failures to synthetic status codes

use crate::archive::{is_error_status, parse_http_message, ArchiveResult};
use crate::config::{CrawlerConfig, UserAgentConfig};
use crate::crawler::pool::{BufferPool, PooledBuffer};
use chrono::{DateTime, Utc};
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CONTENT_LENGTH, CONTENT_TYPE,
    TRANSFER_ENCODING,
};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::fmt;
use std::io::Write;
use std::time::Duration;
use tokio::sync::watch;
use url::Url;

const ACCEPT_LANGUAGE_VALUE: &str = "en-US, en; q=0.5";
const ACCEPT_ENCODING_VALUE: &str = "gzip, br";
const TRANSPORT_ERROR_BASE: u16 = 800;

/// Connection-level failure, stored on the frontier as `800 + kind`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    Connect = 1,
    Timeout = 2,
    Redirect = 3,
    Body = 4,
    Decode = 5,
    Request = 6,
    Builder = 7,
    TooLarge = 8,
    Other = 9,
}

impl TransportError {
    /// Synthetic status code recorded for this failure
    pub fn code(self) -> u16 {
        TRANSPORT_ERROR_BASE + self as u16
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code.checked_sub(TRANSPORT_ERROR_BASE)? {
            1 => Some(Self::Connect),
            2 => Some(Self::Timeout),
            3 => Some(Self::Redirect),
            4 => Some(Self::Body),
            5 => Some(Self::Decode),
            6 => Some(Self::Request),
            7 => Some(Self::Builder),
            8 => Some(Self::TooLarge),
            9 => Some(Self::Other),
            _ => None,
        }
    }

    /// Classifies a client error
    pub fn classify(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_connect() {
            Self::Connect
        } else if error.is_redirect() {
            Self::Redirect
        } else if error.is_body() {
            Self::Body
        } else if error.is_decode() {
            Self::Decode
        } else if error.is_request() {
            Self::Request
        } else if error.is_builder() {
            Self::Builder
        } else {
            Self::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Timeout => "timeout",
            Self::Redirect => "redirect",
            Self::Body => "body",
            Self::Decode => "decode",
            Self::Request => "request",
            Self::Builder => "builder",
            Self::TooLarge => "too_large",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Renders a stored status for logs: the transport error name for
/// synthetic codes, the HTTP code and reason otherwise
pub fn describe_status(code: u16) -> String {
    if let Some(error) = TransportError::from_code(code) {
        return format!("{} error ({})", error, code);
    }
    match StatusCode::from_u16(code)
        .ok()
        .and_then(|s| s.canonical_reason())
    {
        Some(reason) => format!("HTTP {} {}", code, reason),
        None => format!("HTTP {}", code),
    }
}

/// One HTTP exchange as it went over the wire
#[derive(Debug)]
pub struct FetchedExchange {
    pub url: Url,
    pub status_code: u16,
    /// Media type, without parameters
    pub content_type: Option<String>,
    /// Resolved `Location` target
    pub location: Option<Url>,
    /// Decoded body; left empty for error statuses
    pub payload: Vec<u8>,
    /// Request message as HTTP/1.1 bytes
    pub request: Vec<u8>,
    /// Response message as HTTP/1.1 bytes (head and undecoded body)
    pub response: PooledBuffer,
    /// Body length as received
    pub body_length: u64,
    pub request_date: DateTime<Utc>,
    pub response_date: DateTime<Utc>,
    pub ip_address: String,
}

/// Result of a fetch operation
#[derive(Debug)]
pub enum FetchOutcome {
    /// A response arrived, whatever its status
    Fetched(FetchedExchange),

    /// The exchange failed below HTTP
    Failed(TransportError),

    /// The crawl was cancelled while the fetch was running
    Cancelled,
}

impl FetchOutcome {
    /// Returns true for transport failures and HTTP error statuses
    pub fn is_error(&self) -> bool {
        match self {
            Self::Fetched(exchange) => is_error_status(exchange.status_code),
            Self::Failed(_) => true,
            Self::Cancelled => false,
        }
    }
}

/// Builds an HTTP client with proper configuration
///
/// Redirects are not followed and bodies are not decompressed: the archive
/// stores exactly what the server sent.
///
/// # Arguments
///
/// * `user_agent` - The user agent configuration
/// * `crawler` - Timeouts
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    crawler: &CrawlerConfig,
) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGE_VALUE));
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static(ACCEPT_ENCODING_VALUE));

    Client::builder()
        .user_agent(user_agent.header_value())
        .default_headers(headers)
        .timeout(Duration::from_secs(crawler.request_timeout_secs))
        .connect_timeout(Duration::from_secs(crawler.connect_timeout_secs))
        .redirect(Policy::none())
        .build()
}

/// Shared HTTP client plus the state every fetch needs
pub struct Fetcher {
    client: Client,
    user_agent: String,
    max_response_size: Option<u64>,
    buffers: BufferPool,
}

impl Fetcher {
    pub fn new(user_agent: &UserAgentConfig, crawler: &CrawlerConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(user_agent, crawler)?,
            user_agent: user_agent.header_value(),
            max_response_size: crawler.max_response_size,
            buffers: BufferPool::new(crawler.parallelism as usize),
        })
    }

    /// Fetches a URL
    ///
    /// HTTP error statuses are returned as `Fetched`; only failures below
    /// HTTP become `Failed`. Cancellation is checked before the request and
    /// while the body is read.
    pub async fn fetch(&self, url: &Url, cancel: &mut watch::Receiver<bool>) -> FetchOutcome {
        if *cancel.borrow() {
            return FetchOutcome::Cancelled;
        }

        let request = encode_request(url, &self.user_agent);
        let request_date = Utc::now();

        let sent = tokio::select! {
            sent = self.client.get(url.as_str()).send() => sent,
            _ = wait_cancelled(cancel) => return FetchOutcome::Cancelled,
        };
        let mut response = match sent {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("Request to {} failed: {}", url, e);
                return FetchOutcome::Failed(TransportError::classify(&e));
            }
        };
        let response_date = Utc::now();

        if let (Some(max), Some(declared)) = (self.max_response_size, response.content_length()) {
            if declared > max {
                return FetchOutcome::Failed(TransportError::TooLarge);
            }
        }

        let status = response.status();
        let headers = response.headers().clone();
        let ip_address = response
            .remote_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_default();

        let mut body = self.buffers.get();
        loop {
            let next = tokio::select! {
                next = response.chunk() => next,
                _ = wait_cancelled(cancel) => return FetchOutcome::Cancelled,
            };
            match next {
                Ok(Some(chunk)) => {
                    body.extend_from_slice(&chunk);
                    if self
                        .max_response_size
                        .is_some_and(|max| body.len() as u64 > max)
                    {
                        return FetchOutcome::Failed(TransportError::TooLarge);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!("Reading body of {} failed: {}", url, e);
                    return FetchOutcome::Failed(TransportError::classify(&e));
                }
            }
        }

        let mut encoded = self.buffers.get();
        encode_response(status, &headers, &body, &mut encoded);

        let (content_type, location, payload) = if is_error_status(status.as_u16()) {
            let content_type = headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split([' ', ';']).next())
                .filter(|v| !v.is_empty())
                .map(str::to_string);
            (content_type, None, Vec::new())
        } else {
            // Bodies that cannot be decoded never reach the archive.
            match decode_response(url, &encoded) {
                Ok(decoded) => decoded,
                Err(e) => {
                    tracing::debug!("Undecodable response from {}: {}", url, e);
                    return FetchOutcome::Failed(TransportError::Decode);
                }
            }
        };

        FetchOutcome::Fetched(FetchedExchange {
            url: url.clone(),
            status_code: status.as_u16(),
            content_type,
            location,
            payload,
            request,
            response: encoded,
            body_length: body.len() as u64,
            request_date,
            response_date,
            ip_address,
        })
    }
}

/// Resolves once the cancellation flag is raised
///
/// Never resolves if the sender is gone without raising it.
pub async fn wait_cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Runs a rebuilt response through the archive parser
fn decode_response(
    url: &Url,
    encoded: &[u8],
) -> ArchiveResult<(Option<String>, Option<Url>, Vec<u8>)> {
    let message = parse_http_message(encoded, encoded.len() as u64, Some(url))?;
    let content_type = message.head.content_type.clone();
    let location = message.head.location.clone();
    Ok((content_type, location, message.read_payload()?))
}

/// Rebuilds the request the client sends for `url`
fn encode_request(url: &Url, user_agent: &str) -> Vec<u8> {
    let mut target = url.path().to_string();
    if let Some(query) = url.query() {
        target.push('?');
        target.push_str(query);
    }
    let host = url.host_str().unwrap_or_default();
    let host = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: {}\r\nAccept: */*\r\nAccept-Language: {}\r\nAccept-Encoding: {}\r\nConnection: keep-alive\r\n\r\n",
        target, host, user_agent, ACCEPT_LANGUAGE_VALUE, ACCEPT_ENCODING_VALUE
    )
    .into_bytes()
}

/// Writes a response as HTTP/1.1 bytes
///
/// Header names are title-cased. A chunked body (already de-chunked by the
/// client) is framed again as one chunk; otherwise `Content-Length` is set
/// to the body size so that head and body agree.
fn encode_response(status: StatusCode, headers: &HeaderMap, body: &[u8], out: &mut Vec<u8>) {
    let chunked = headers
        .get_all(TRANSFER_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.to_ascii_lowercase().contains("chunked"));

    let _ = write!(
        out,
        "HTTP/1.1 {} {}\r\n",
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    );

    for (name, value) in headers {
        if name == CONTENT_LENGTH {
            if !chunked {
                let _ = write!(out, "Content-Length: {}\r\n", body.len());
            }
            continue;
        }
        if name == TRANSFER_ENCODING {
            if chunked {
                out.extend_from_slice(b"Transfer-Encoding: chunked\r\n");
            }
            continue;
        }
        out.extend_from_slice(title_case(name.as_str()).as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");

    if chunked {
        if !body.is_empty() {
            let _ = write!(out, "{:x}\r\n", body.len());
            out.extend_from_slice(body);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"0\r\n\r\n");
    } else {
        out.extend_from_slice(body);
    }
}

/// `content-type` -> `Content-Type`
fn title_case(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}
