//! Streaming decoder for `Transfer-Encoding: chunked` bodies
//!
//! The decoder is strict: a bad hex digit in a size line, a CR not followed
//! by LF, or a chunk not terminated by CRLF is reported as
//! `io::ErrorKind::InvalidData` instead of being guessed around. Chunk
//! extensions and trailers are not supported.

use crate::archive::ArchiveError;
use std::io::{self, BufRead, Read};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Expecting a chunk-size line
    Size,
    /// Inside a chunk with `remaining` bytes left
    Data,
    /// Terminal zero-size chunk consumed
    Done,
}

/// A `Read` adapter that strips chunked framing from the wrapped stream
pub struct ChunkedDecoder<R> {
    inner: R,
    state: State,
    remaining: u64,
}

impl<R: BufRead> ChunkedDecoder<R> {
    /// Wraps a reader positioned at the first chunk-size line
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            state: State::Size,
            remaining: 0,
        }
    }

    /// Returns the wrapped reader, positioned wherever decoding stopped
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Returns true once the terminating zero-size chunk has been read
    pub fn is_finished(&self) -> bool {
        self.state == State::Done
    }

    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        let byte = match self.inner.fill_buf()? {
            [] => return Ok(None),
            buf => buf[0],
        };
        self.inner.consume(1);
        Ok(Some(byte))
    }

    fn expect_lf(&mut self) -> io::Result<()> {
        match self.next_byte()? {
            Some(b'\n') => Ok(()),
            _ => Err(invalid(ArchiveError::MissingCrlf)),
        }
    }

    fn expect_crlf(&mut self) -> io::Result<()> {
        match self.next_byte()? {
            Some(b'\r') => self.expect_lf(),
            _ => Err(invalid(ArchiveError::MissingCrlf)),
        }
    }

    /// Reads a hex size line up to and including its CRLF. Spaces are ignored.
    fn read_size_line(&mut self) -> io::Result<u64> {
        let mut size: u64 = 0;
        let mut digits = 0usize;

        loop {
            let byte = match self.next_byte()? {
                Some(b) => b,
                None => return Err(invalid(ArchiveError::UnexpectedEof("chunk size line"))),
            };

            match byte {
                b' ' => continue,
                b'\r' => {
                    self.expect_lf()?;
                    break;
                }
                _ => {
                    let digit = (byte as char)
                        .to_digit(16)
                        .ok_or_else(|| invalid(ArchiveError::InvalidChunkSize(byte)))?;
                    size = size
                        .checked_mul(16)
                        .and_then(|s| s.checked_add(u64::from(digit)))
                        .ok_or_else(|| invalid(ArchiveError::InvalidChunkSize(byte)))?;
                    digits += 1;
                }
            }
        }

        if digits == 0 {
            return Err(invalid(ArchiveError::InvalidChunkSize(b'\r')));
        }

        Ok(size)
    }

    /// Consumes what follows the zero-size chunk: either the final CRLF or
    /// the end of the stream.
    fn read_terminator(&mut self) -> io::Result<()> {
        match self.next_byte()? {
            None => Ok(()),
            Some(b'\r') => self.expect_lf(),
            Some(_) => Err(invalid(ArchiveError::MissingCrlf)),
        }
    }
}

impl<R: BufRead> Read for ChunkedDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            match self.state {
                State::Done => return Ok(0),
                State::Size => {
                    let size = self.read_size_line()?;
                    if size == 0 {
                        self.read_terminator()?;
                        self.state = State::Done;
                        return Ok(0);
                    }
                    self.remaining = size;
                    self.state = State::Data;
                }
                State::Data => {
                    let want = buf.len().min(self.remaining.min(usize::MAX as u64) as usize);
                    let n = self.inner.read(&mut buf[..want])?;
                    if n == 0 {
                        return Err(invalid(ArchiveError::UnexpectedEof("chunk data")));
                    }
                    self.remaining -= n as u64;
                    if self.remaining == 0 {
                        self.expect_crlf()?;
                        self.state = State::Size;
                    }
                    return Ok(n);
                }
            }
        }
    }
}

fn invalid(err: ArchiveError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(input: &[u8]) -> io::Result<Vec<u8>> {
        let mut decoder = ChunkedDecoder::new(input);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        Ok(out)
    }

    #[test]
    fn test_decodes_simple_body() {
        let out = decode(b"4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n").unwrap();
        assert_eq!(out, b"Wikipedia");
    }

    #[test]
    fn test_hex_sizes_any_case() {
        let body = vec![b'x'; 0x1a];
        let mut input = b"1A\r\n".to_vec();
        input.extend_from_slice(&body);
        input.extend_from_slice(b"\r\n0\r\n\r\n");
        assert_eq!(decode(&input).unwrap(), body);

        let mut input = b"1a\r\n".to_vec();
        input.extend_from_slice(&body);
        input.extend_from_slice(b"\r\n0\r\n\r\n");
        assert_eq!(decode(&input).unwrap(), body);
    }

    #[test]
    fn test_spaces_in_size_line_are_ignored() {
        let out = decode(b" 4 \r\nWiki\r\n0\r\n\r\n").unwrap();
        assert_eq!(out, b"Wiki");
    }

    #[test]
    fn test_invalid_hex_digit_is_error() {
        let err = decode(b"4g\r\nWiki\r\n0\r\n\r\n").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_zero_chunk_then_eof_is_accepted() {
        let out = decode(b"4\r\nWiki\r\n0\r\n").unwrap();
        assert_eq!(out, b"Wiki");
    }

    #[test]
    fn test_missing_crlf_after_chunk_is_error() {
        let err = decode(b"4\r\nWikiX\r\n0\r\n\r\n").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_cr_without_lf_is_error() {
        let err = decode(b"4\rWiki\r\n0\r\n\r\n").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_truncated_chunk_data_is_error() {
        assert!(decode(b"9\r\nWiki").is_err());
    }

    #[test]
    fn test_truncated_before_terminal_chunk_is_error() {
        assert!(decode(b"4\r\nWiki\r\n").is_err());
    }

    #[test]
    fn test_stops_at_terminator_leaving_rest() {
        let input: &[u8] = b"3\r\nabc\r\n0\r\n\r\nREST";
        let mut decoder = ChunkedDecoder::new(input);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        assert!(decoder.is_finished());
        assert_eq!(out, b"abc");
        assert_eq!(decoder.into_inner(), b"REST");
    }

    #[test]
    fn test_small_read_buffer() {
        let mut decoder = ChunkedDecoder::new(&b"4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n"[..]);
        let mut out = Vec::new();
        let mut buf = [0u8; 2];
        loop {
            let n = decoder.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, b"Wikipedia");
    }
}
