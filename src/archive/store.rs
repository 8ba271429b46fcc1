//! Archive directory facade: rotating writers, index upkeep, cache lookups

use crate::archive::index::{generate_index, list_archive_files, read_index};
use crate::archive::reader::{open_record, ArchivedResponse};
use crate::archive::{append_index, ArchiveResult, ArchiveWriter, IndexEntry, INDEX_FILE_NAME};
use chrono::{DateTime, Utc};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Raw bytes of one HTTP exchange, ready to be archived
#[derive(Debug, Clone)]
pub struct ExchangeRecord<'a> {
    pub url: &'a str,
    pub request: &'a [u8],
    pub response: &'a [u8],
    pub request_date: DateTime<Utc>,
    pub response_date: DateTime<Utc>,
    pub ip_address: &'a str,
}

/// Owns every open writer of a destination directory and the in-memory
/// view of its index
pub struct ArchiveStore {
    directory: PathBuf,
    max_archive_length: u64,
    software: String,
    writers: BTreeMap<String, ArchiveWriter>,
    cache: Option<HashMap<String, IndexEntry>>,
}

impl ArchiveStore {
    /// Creates a store over `directory`
    ///
    /// Nothing is opened until the first record is written.
    pub fn new(directory: &Path, max_archive_length: u64, software: &str) -> Self {
        Self {
            directory: directory.to_path_buf(),
            max_archive_length,
            software: software.to_string(),
            writers: BTreeMap::new(),
            cache: None,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn index_path(&self) -> PathBuf {
        self.directory.join(INDEX_FILE_NAME)
    }

    /// Returns true if the directory already holds archive files
    pub fn has_archives(&self) -> ArchiveResult<bool> {
        if !self.directory.exists() {
            return Ok(false);
        }
        Ok(!list_archive_files(&self.directory)?.is_empty())
    }

    /// Writes a request record followed by its response record
    ///
    /// Both records go to the same file with nothing in between. Returns the
    /// index entry of the response. A response that does not parse is
    /// rejected before either record is written.
    pub fn write_exchange(
        &mut self,
        category: &str,
        exchange: &ExchangeRecord<'_>,
    ) -> ArchiveResult<IndexEntry> {
        let entry = self.writer_for(category)?.write_exchange(exchange)?;
        if let Some(cache) = self.cache.as_mut() {
            cache.insert(entry.url.clone(), entry.clone());
        }
        Ok(entry)
    }

    /// Returns the open writer for `category`, rotating it once it has
    /// grown past the size limit
    fn writer_for(&mut self, category: &str) -> ArchiveResult<&mut ArchiveWriter> {
        let mut next_number = 0;
        let full = self
            .writers
            .get(category)
            .is_some_and(|w| w.length() > self.max_archive_length);
        if full {
            if let Some(old) = self.writers.remove(category) {
                tracing::info!("Rotating archive {}", old.file_name());
                next_number = old.number() + 1;
                self.retire(old)?;
            }
        }

        let writer = match self.writers.entry(category.to_string()) {
            Entry::Occupied(open) => open.into_mut(),
            Entry::Vacant(slot) => slot.insert(ArchiveWriter::create(
                &self.directory,
                category,
                next_number,
                &self.software,
            )?),
        };
        Ok(writer)
    }

    /// Closes a writer and records its pending entries in the index
    fn retire(&mut self, writer: ArchiveWriter) -> ArchiveResult<()> {
        let pending = writer.finish()?;
        self.append_to_index(pending)
    }

    fn append_to_index(&mut self, entries: Vec<IndexEntry>) -> ArchiveResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        if self.index_path().exists() {
            append_index(&self.directory, &entries)
        } else {
            // A fresh scan covers these entries and everything before them.
            self.regenerate()?;
            Ok(())
        }
    }

    /// Appends the pending entries of every open writer to the index
    pub fn flush_index(&mut self) -> ArchiveResult<()> {
        let mut pending = Vec::new();
        for writer in self.writers.values_mut() {
            pending.extend(writer.take_recorded());
        }
        self.append_to_index(pending)
    }

    /// Closes every open writer, appending their entries to the index
    pub fn close_writers(&mut self) -> ArchiveResult<()> {
        let mut pending = Vec::new();
        for (_, writer) in std::mem::take(&mut self.writers) {
            pending.extend(writer.finish()?);
        }
        self.append_to_index(pending)
    }

    fn regenerate(&mut self) -> ArchiveResult<Vec<IndexEntry>> {
        let entries = generate_index(&self.directory)?;
        for writer in self.writers.values_mut() {
            writer.take_recorded();
        }
        Ok(entries)
    }

    /// Closes the writers and rebuilds the index from the archive files
    pub fn generate_index(&mut self) -> ArchiveResult<Vec<IndexEntry>> {
        self.close_writers()?;
        let entries = self.regenerate()?;
        self.cache = None;
        Ok(entries)
    }

    /// The `url -> entry` view of the index
    ///
    /// Loaded on first use from `index.cdx` (generated if missing), then
    /// overlaid with entries of open writers not yet appended.
    pub fn index(&mut self) -> ArchiveResult<&HashMap<String, IndexEntry>> {
        if self.cache.is_none() {
            let entries = if self.index_path().exists() {
                read_index(&self.index_path())?
            } else if self.has_archives()? {
                self.regenerate()?
            } else {
                Vec::new()
            };

            let mut map = HashMap::with_capacity(entries.len());
            for entry in entries {
                map.insert(entry.url.clone(), entry);
            }
            for writer in self.writers.values() {
                for entry in writer.recorded_responses() {
                    map.insert(entry.url.clone(), entry.clone());
                }
            }
            tracing::debug!("Loaded {} index entries", map.len());
            self.cache = Some(map);
        }

        Ok(self.cache.get_or_insert_with(HashMap::new))
    }

    /// Looks up the archived response for `url`
    pub fn try_get_cached(&mut self, url: &str) -> ArchiveResult<Option<IndexEntry>> {
        Ok(self.index()?.get(url).cloned())
    }

    /// Reads the archived response for `url`, if there is one
    pub fn open_cached(&mut self, url: &str) -> ArchiveResult<Option<ArchivedResponse>> {
        match self.try_get_cached(url)? {
            Some(entry) => Ok(Some(open_record(&self.directory, &entry)?)),
            None => Ok(None),
        }
    }

    /// Reads the response an index entry points at
    pub fn open_entry(&self, entry: &IndexEntry) -> ArchiveResult<ArchivedResponse> {
        open_record(&self.directory, entry)
    }
}
