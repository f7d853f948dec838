use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use std::sync::Mutex;
use log::{debug, info, warn};

use super::annotation::{Extraction, FeatureIterator, ProjectionSummary};
use super::cursor::ByteCursor;
use super::format::{self, record::RecordDecoder};
use super::iter::{ChildIter, TreeWalker};
use super::types::error::{HfaError, Result};
use super::types::models::*;
use super::types::value::Record;

/// The main reader for HFA files.
///
/// Opening a file verifies the signature, reads the header record and parses
/// the type dictionary. Entries are read lazily and cached by file offset, so
/// repeated traversals only touch the disk once per entry.
#[derive(Debug)]
pub struct HfaReader<R = BufReader<File>> {
    cursor: Mutex<ByteCursor<R>>,
    options: OpenOptions,
    header: HfaHeader,
    dictionary: format::dictionary::TypeDictionary,

    /// Entry arena keyed by file offset.
    entries: Mutex<HashMap<u64, Entry>>,
}

impl HfaReader<BufReader<File>> {
    /// Opens an HFA file with default options (big-endian, Windows-1252 text).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_options(path, OpenOptions::default())
    }

    /// Opens an HFA file with explicit options.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be opened
    /// - The signature is not `EHFA_HEADER_TAG`
    /// - The header points outside the file
    /// - The type dictionary cannot be parsed
    pub fn with_options(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening HFA file: {}", path.display());
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), options)
    }
}

impl<R: Read + Seek> HfaReader<R> {
    /// Builds a reader over any seekable byte source.
    pub fn from_reader(inner: R, options: OpenOptions) -> Result<Self> {
        let mut cursor = ByteCursor::new(inner, options.endianness)?;

        let header = format::header::parse(&mut cursor)?;
        let dictionary = format::dictionary::read(
            &mut cursor,
            header.record.dictionary as u64,
            options.encoding,
        )?;

        info!(
            "HFA file opened: version {}, {} bytes, {} dictionary types, root entry at {:#x}",
            header.record.version,
            cursor.len(),
            dictionary.len(),
            header.record.root_entry
        );

        Ok(Self {
            cursor: Mutex::new(cursor),
            options,
            header,
            dictionary,
            entries: Mutex::new(HashMap::new()),
        })
    }

    pub fn header(&self) -> &HfaHeader {
        &self.header
    }

    pub fn dictionary(&self) -> &format::dictionary::TypeDictionary {
        &self.dictionary
    }

    pub fn options(&self) -> &OpenOptions {
        &self.options
    }

    /// Size of the underlying source in bytes.
    pub fn file_len(&self) -> Result<u64> {
        let cursor = self.cursor.lock().map_err(|_| HfaError::LockPoisoned)?;
        Ok(cursor.len())
    }

    /// Returns the root entry of the tree.
    pub fn root(&self) -> Result<Entry> {
        self.entry(self.header.record.root_entry as u64)
    }

    /// Returns the entry stored at `offset`, reading it on first access.
    pub fn entry(&self, offset: u64) -> Result<Entry> {
        {
            let entries = self.entries.lock().map_err(|_| HfaError::LockPoisoned)?;
            if let Some(entry) = entries.get(&offset) {
                return Ok(entry.clone());
            }
        }

        let entry = {
            let mut cursor = self.cursor.lock().map_err(|_| HfaError::LockPoisoned)?;
            format::entry::read(&mut cursor, offset, self.options.encoding)?
        };

        let mut entries = self.entries.lock().map_err(|_| HfaError::LockPoisoned)?;
        entries.insert(offset, entry.clone());
        Ok(entry)
    }

    /// Number of entries read so far.
    pub fn cached_entries(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Iterates the immediate children of `parent`.
    ///
    /// The iterator is lazy and can be rewound with [`ChildIter::restart`];
    /// calling this method again also starts from the first child.
    pub fn children(&self, parent: &Entry) -> ChildIter<'_, R> {
        ChildIter::new(self, parent)
    }

    /// Pre-order traversal of the whole tree, yielding `(depth, entry)`.
    ///
    /// A child is visited before its next sibling. See [`TreeWalker`] for the
    /// error behaviour on corrupt trees.
    pub fn walk(&self) -> TreeWalker<'_, R> {
        TreeWalker::new(
            self,
            self.header.record.root_entry as u64,
            self.options.max_depth,
        )
    }

    /// Finds the first entry named `name` in traversal order.
    ///
    /// Unreadable branches are skipped; a corrupt tree is an error.
    pub fn find(&self, name: &str) -> Result<Option<Entry>> {
        for item in self.walk() {
            match item {
                Ok((_, entry)) if entry.name == name => return Ok(Some(entry)),
                Ok(_) => {}
                Err(e) if e.is_out_of_bounds() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Resolves a dotted path of entry names below the root, e.g. `"Layer_1.Map_Info"`.
    pub fn find_path(&self, path: &str) -> Result<Option<Entry>> {
        let mut current = self.root()?;
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            let mut found = None;
            for child in self.children(&current) {
                let child = child?;
                if child.name == segment {
                    found = Some(child);
                    break;
                }
            }
            match found {
                Some(child) => current = child,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    /// Returns a decoder bound to this file's dictionary and byte order.
    pub fn record_decoder(&self) -> RecordDecoder<'_> {
        RecordDecoder::new(&self.dictionary, self.options.endianness, self.options.encoding)
    }

    /// Reads the raw bytes of `size` starting at `offset`.
    pub fn read_block(&self, offset: u64, size: u32) -> Result<Vec<u8>> {
        if offset == 0 {
            return Err(HfaError::InvalidOffset { offset });
        }
        let mut cursor = self.cursor.lock().map_err(|_| HfaError::LockPoisoned)?;
        cursor.seek(offset)?;
        cursor.read_bytes(size as usize)
    }

    /// Decodes the `size` bytes at `offset` as an instance of `type_name`.
    ///
    /// The dictionary lookup happens before any I/O, so an unknown type never
    /// touches the file.
    pub fn decode(&self, type_name: &str, offset: u64, size: u32) -> Result<Record> {
        if !self.dictionary.contains(type_name) {
            return Err(HfaError::UnknownType {
                offset,
                name: type_name.to_string(),
            });
        }
        let bytes = self.read_block(offset, size)?;
        self.record_decoder().decode(type_name, &bytes, offset)
    }

    /// Decodes the data block of `entry` using its declared type.
    pub fn decode_entry(&self, entry: &Entry) -> Result<Record> {
        debug!(
            "Decoding {} ({}) at {:#x}+{}",
            entry.name, entry.type_name, entry.data, entry.data_size
        );
        self.decode(&entry.type_name, entry.data as u64, entry.data_size)
    }

    /// Streams the annotation features of the file.
    pub fn features(&self) -> FeatureIterator<'_, R> {
        FeatureIterator::new(self)
    }

    /// Collects every feature, the entries that had to be skipped, and the
    /// projection summary.
    pub fn extract(&self) -> Result<Extraction> {
        let mut features = Vec::new();
        let mut iter = self.features();
        for feature in iter.by_ref() {
            features.push(feature?);
        }
        let skipped = iter.into_skipped();
        let projection = self.projection()?;

        info!(
            "Extracted {} features ({} entries skipped)",
            features.len(),
            skipped.len()
        );
        Ok(Extraction {
            features,
            skipped,
            projection,
        })
    }

    /// Summarises the `Map_Info`, `Projection` and `Datum` entries.
    ///
    /// Returns `None` when the file carries no map information.
    pub fn projection(&self) -> Result<Option<ProjectionSummary>> {
        let map_info = self.find_record("Map_Info")?;
        let projection = self.find_record("Projection")?;
        let datum = self.find_record("Datum")?;
        Ok(ProjectionSummary::from_records(
            map_info.as_ref(),
            projection.as_ref(),
            datum.as_ref(),
        ))
    }

    /// Decodes the first entry named `name`, if present and decodable.
    fn find_record(&self, name: &str) -> Result<Option<Record>> {
        let Some(entry) = self.find(name)? else {
            debug!("No {} entry", name);
            return Ok(None);
        };
        if !entry.has_data() {
            return Ok(None);
        }
        match self.decode_entry(&entry) {
            Ok(record) => Ok(Some(record)),
            Err(e) if e.is_recoverable() => {
                warn!("Could not decode {} at {:#x}: {}", name, entry.offset, e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
