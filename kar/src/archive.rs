//! Reading sealed archives
//!
//! An [`Archive`] validates the prelude, decodes the header once, then
//! serves every query from the retained byte source. The archive is
//! immutable after open and safe to share across worker threads; each
//! `read_all` and `open_entry` takes its own positional cursor.

use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::codec;
use crate::error::{Error, Result};
use crate::header::{Header, IndexEntry};
use crate::source::{FileSource, ReadAt};
use crate::stream::EntryReader;
use crate::{HEADER_REGION_START, HEADER_SIZE_LEN, KAR_MAGIC};

/// Knobs for opening an archive.
#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    /// Sanity ceiling on the header region. A size slot above this is
    /// treated as corruption rather than an allocation request.
    pub max_header_bytes: i64,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            max_header_bytes: 64 * 1024 * 1024,
        }
    }
}

/// A sealed archive over a random-access byte source.
#[derive(Debug)]
pub struct Archive<R: ReadAt> {
    source: R,
    header: Header,
}

impl<R: ReadAt> Archive<R> {
    /// Open an archive, validating the prelude and decoding the header.
    ///
    /// Either returns a fully usable archive or fails; there is no partially
    /// open state. A source too short to hold the prelude or header region
    /// is structurally invalid and reports [`Error::Format`].
    pub fn open(source: R) -> Result<Self> {
        Self::open_with(source, ArchiveOptions::default())
    }

    /// [`Archive::open`] with explicit options.
    pub fn open_with(source: R, options: ArchiveOptions) -> Result<Self> {
        let mut magic = [0u8; KAR_MAGIC.len()];
        read_region(&source, 0, &mut magic, "magic")?;
        if magic != KAR_MAGIC {
            return Err(Error::Format(format!("bad magic {magic:02x?}")));
        }

        let mut slot = [0u8; HEADER_SIZE_LEN];
        read_region(&source, KAR_MAGIC.len() as u64, &mut slot, "header size")?;
        let header_size = i64::from_le_bytes(slot);
        if header_size <= 0 || header_size > options.max_header_bytes {
            return Err(Error::Format(format!(
                "header size {header_size} outside (0, {}]",
                options.max_header_bytes
            )));
        }

        let mut raw = vec![0u8; header_size as usize];
        read_region(&source, HEADER_REGION_START, &mut raw, "header region")?;
        let header = Header::decode(&raw)?;

        debug!(
            "opened archive by {:?}: version {}, {} entries, {} header bytes",
            header.author,
            header.version,
            header.index.len(),
            header_size
        );

        Ok(Self { source, header })
    }

    /// Find the index entry for `name`. The first match in index order wins.
    pub fn lookup(&self, name: &str) -> Result<&IndexEntry> {
        self.header
            .index
            .iter()
            .find(|entry| entry.name == name)
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    /// Read and decompress the entire contents of `name`.
    pub fn read_all(&self, name: &str) -> Result<Vec<u8>> {
        let entry = self.lookup(name)?;

        let mut compressed = vec![0u8; entry.compressed_size as usize];
        self.source
            .read_exact_at(entry.offset as u64, &mut compressed)?;

        let mut decoder = codec::decompress_stream(compressed.as_slice());
        let mut contents = vec![0u8; entry.size as usize];
        decoder
            .read_exact(&mut contents)
            .map_err(codec::decode_error)?;

        // The writer fixed the length at seal time; leftover decoder output
        // means the index and payload disagree.
        let mut probe = [0u8; 1];
        match decoder.read(&mut probe) {
            Ok(0) => Ok(contents),
            Ok(_) => Err(Error::Format(format!(
                "entry {name:?} decompresses past its indexed size"
            ))),
            Err(err) => Err(codec::decode_error(err)),
        }
    }

    /// Open a streaming reader over the entry `name`.
    ///
    /// Returns immediately; decompression happens as the returned reader is
    /// consumed. Reads are sequential from the start of the entry.
    pub fn open_entry(&self, name: &str) -> Result<EntryReader<'_, R>> {
        let entry = self.lookup(name)?;
        Ok(EntryReader::new(&self.source, entry))
    }

    /// Whether `name` is present in the index.
    pub fn contains(&self, name: &str) -> bool {
        self.header.index.iter().any(|entry| entry.name == name)
    }

    /// The index, in payload order.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.header.index
    }

    pub fn author(&self) -> &str {
        &self.header.author
    }

    pub fn version(&self) -> i64 {
        self.header.version
    }

    pub fn date_created(&self) -> i64 {
        self.header.date_created
    }

    /// The decoded header.
    pub fn header(&self) -> &Header {
        &self.header
    }
}

impl Archive<FileSource> {
    /// Open an archive file from disk, memory-mapped when possible.
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open(FileSource::open(path.as_ref())?)
    }
}

/// Read a prelude or header range, reporting a source that ends inside it as
/// a format error rather than plain I/O.
fn read_region<R: ReadAt>(source: &R, offset: u64, buf: &mut [u8], what: &str) -> Result<()> {
    source.read_exact_at(offset, buf).map_err(|err| {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::Format(format!("archive truncated reading {what}"))
        } else {
            Error::Io(err)
        }
    })
}
