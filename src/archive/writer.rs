//! Append-only writer for one category of `.warc.gz` files
//!
//! Each record is compressed as its own gzip member, so any record can be
//! read back by seeking to its offset and inflating a single member.

use crate::archive::index::describe_response;
use crate::archive::record::{RecordHeader, RecordType, RECORD_TRAILER};
use crate::archive::{ArchiveResult, ExchangeRecord, IndexEntry};
use chrono::{DateTime, Timelike, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// File name of the `number`-th archive of a category
pub fn archive_file_name(category: &str, number: u32) -> String {
    format!("archive-{}-{:05}.warc.gz", category, number)
}

/// Writer for the currently open archive file of one category
pub struct ArchiveWriter {
    category: String,
    number: u32,
    file_name: String,
    path: PathBuf,
    file: File,
    length: u64,
    warcinfo_id: Uuid,
    recorded: Vec<IndexEntry>,
}

impl ArchiveWriter {
    /// Opens the first unused archive file of `category` numbered
    /// `first_number` or above, and writes its warcinfo record
    pub fn create(
        directory: &Path,
        category: &str,
        first_number: u32,
        software: &str,
    ) -> ArchiveResult<Self> {
        fs::create_dir_all(directory)?;

        let mut number = first_number;
        let (file, file_name) = loop {
            let name = archive_file_name(category, number);
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(directory.join(&name))
            {
                Ok(file) => break (file, name),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => number += 1,
                Err(e) => return Err(e.into()),
            }
        };

        let mut writer = Self {
            category: category.to_string(),
            number,
            path: directory.join(&file_name),
            file_name,
            file,
            length: 0,
            warcinfo_id: Uuid::new_v4(),
            recorded: Vec::new(),
        };
        writer.write_warcinfo(software)?;

        tracing::info!("Opened archive {}", writer.path.display());
        Ok(writer)
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes written to the file so far
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Index entries for responses written since the last `take_recorded`
    pub fn recorded_responses(&self) -> &[IndexEntry] {
        &self.recorded
    }

    /// Hands over the pending index entries, leaving none behind
    pub fn take_recorded(&mut self) -> Vec<IndexEntry> {
        std::mem::take(&mut self.recorded)
    }

    fn write_warcinfo(&mut self, software: &str) -> ArchiveResult<()> {
        let body = format!(
            "Software: {}\r\nFormat: WARC File Format 1.0\r\nConformsto: http://bibnum.bnf.fr/WARC/WARC_ISO_28500_version1_latestdraft.pdf\r\nRobots: off\r\n\r\n",
            software
        );
        let header = RecordHeader {
            record_type: RecordType::Warcinfo,
            content_type: Some("application/warc-fields".to_string()),
            date: Some(whole_seconds(Utc::now())),
            record_id: Some(self.warcinfo_id),
            target_uri: None,
            ip_address: None,
            concurrent_to: None,
            content_length: body.len() as u64,
            warcinfo_id: Some(self.warcinfo_id),
        };
        self.write_member(&header, body.as_bytes())?;
        Ok(())
    }

    /// Compresses one record as a gzip member and appends it.
    /// Returns the member's offset and compressed length.
    fn write_member(&mut self, header: &RecordHeader, payload: &[u8]) -> ArchiveResult<(u64, u64)> {
        let mut encoder = GzEncoder::new(
            Vec::with_capacity(payload.len() / 2 + 512),
            Compression::default(),
        );
        encoder.write_all(&header.encode())?;
        encoder.write_all(payload)?;
        encoder.write_all(RECORD_TRAILER)?;
        let member = encoder.finish()?;

        let offset = self.length;
        self.file.write_all(&member)?;
        self.length += member.len() as u64;
        Ok((offset, member.len() as u64))
    }

    /// Appends one request or response record
    ///
    /// For responses, the bytes are parsed before anything is written to
    /// produce the index entry, which is also kept for the next index
    /// append. A response that does not parse leaves the file untouched.
    #[allow(clippy::too_many_arguments)]
    pub fn write_record(
        &mut self,
        url: &str,
        is_response: bool,
        raw: &[u8],
        date: DateTime<Utc>,
        ip_address: &str,
        record_id: Uuid,
        concurrent_to: Option<Uuid>,
    ) -> ArchiveResult<Option<IndexEntry>> {
        let date = whole_seconds(date);
        let described = if is_response {
            Some(describe_response(url, Some(date), &mut &raw[..], raw.len() as u64)?)
        } else {
            None
        };

        let (offset, length) =
            self.write_raw(url, is_response, raw, date, ip_address, record_id, concurrent_to)?;
        Ok(described.map(|entry| self.record_entry(entry, offset, length)))
    }

    /// Appends a request record immediately followed by its response record
    ///
    /// The response is parsed first; if it is malformed neither record is
    /// written.
    pub fn write_exchange(&mut self, exchange: &ExchangeRecord<'_>) -> ArchiveResult<IndexEntry> {
        let request_date = whole_seconds(exchange.request_date);
        let response_date = whole_seconds(exchange.response_date);
        let entry = describe_response(
            exchange.url,
            Some(response_date),
            &mut &exchange.response[..],
            exchange.response.len() as u64,
        )?;

        let request_id = Uuid::new_v4();
        self.write_raw(
            exchange.url,
            false,
            exchange.request,
            request_date,
            exchange.ip_address,
            request_id,
            None,
        )?;
        let (offset, length) = self.write_raw(
            exchange.url,
            true,
            exchange.response,
            response_date,
            exchange.ip_address,
            Uuid::new_v4(),
            Some(request_id),
        )?;
        Ok(self.record_entry(entry, offset, length))
    }

    #[allow(clippy::too_many_arguments)]
    fn write_raw(
        &mut self,
        url: &str,
        is_response: bool,
        raw: &[u8],
        date: DateTime<Utc>,
        ip_address: &str,
        record_id: Uuid,
        concurrent_to: Option<Uuid>,
    ) -> ArchiveResult<(u64, u64)> {
        let header = RecordHeader::for_exchange(
            is_response,
            url,
            date,
            ip_address,
            record_id,
            concurrent_to,
            raw.len() as u64,
            self.warcinfo_id,
        );
        self.write_member(&header, raw)
    }

    fn record_entry(&mut self, mut entry: IndexEntry, offset: u64, length: u64) -> IndexEntry {
        entry.warc_file = self.file_name.clone();
        entry.compressed_offset = offset;
        entry.compressed_length = length;
        self.recorded.push(entry.clone());
        entry
    }

    /// Flushes the file to disk and returns entries not yet appended to the
    /// index
    pub fn finish(mut self) -> ArchiveResult<Vec<IndexEntry>> {
        self.file.flush()?;
        self.file.sync_all()?;
        tracing::info!(
            "Closed archive {} ({} bytes)",
            self.path.display(),
            self.length
        );
        Ok(std::mem::take(&mut self.recorded))
    }
}

fn whole_seconds(date: DateTime<Utc>) -> DateTime<Utc> {
    date.with_nanosecond(0).unwrap_or(date)
}
