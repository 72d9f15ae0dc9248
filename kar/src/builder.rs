//! Archive creation
//!
//! Archives are versioned and cannot be appended to; the [`Builder`] is the
//! one way to produce them. Each `add` compresses its input straight into
//! the staging directory, so sealing is a single pass: fix the offsets,
//! write the prelude and padded header, then copy the staged blobs out in
//! the order they were added.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::error::{Error, Result};
use crate::header::{Header, IndexEntry};
use crate::staging::{Manifest, StagingStore};
use crate::{HEADER_REGION_START, KAR_MAGIC};

/// Metadata stamped into the archive header at seal time.
#[derive(Debug, Clone, Default)]
pub struct ArchiveMetadata {
    /// Human-readable author string.
    pub author: String,
    /// Seconds since the Unix epoch.
    pub date_created: i64,
    /// Caller-controlled archive version tag.
    pub version: i64,
}

/// Streams entries into per-entry compressed staging files, then seals them
/// into a single archive with a precomputed index.
///
/// `add` may be called from multiple threads; entries take the order in
/// which their `add` calls completed. Any I/O or codec failure poisons the
/// builder and every later call reports [`Error::Poisoned`]. Dropping the
/// builder removes the staging directory unconditionally.
pub struct Builder {
    staging: StagingStore,
    metadata: ArchiveMetadata,
    poisoned: AtomicBool,
}

impl Builder {
    /// Create a builder with its own staging directory.
    pub fn new(metadata: ArchiveMetadata) -> Result<Builder> {
        Ok(Builder {
            staging: StagingStore::new()?,
            metadata,
            poisoned: AtomicBool::new(false),
        })
    }

    /// Compress `reader` into the staging directory under `name`.
    ///
    /// Blocks until compression finishes. A name that was already added is
    /// rejected with [`Error::Duplicate`]; the rejection leaves the builder
    /// usable, unlike an I/O failure. An `add` racing `seal` either commits
    /// before the seal claims the manifest or reports [`Error::Poisoned`];
    /// it is never silently dropped.
    pub fn add<R: Read>(&self, name: &str, mut reader: R) -> Result<()> {
        self.check_usable()?;
        match self.staging.stage(name, &mut reader) {
            Ok(()) => Ok(()),
            Err(err @ (Error::Duplicate(_) | Error::Poisoned)) => Err(err),
            Err(err) => {
                self.poisoned.store(true, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    /// Number of entries staged so far.
    pub fn entry_count(&self) -> usize {
        self.staging.manifest().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count() == 0
    }

    /// Write the finished archive to `sink` and return the total number of
    /// bytes written.
    ///
    /// Holds the manifest lock for the whole pass, so concurrent `add` calls
    /// block until sealing completes. The builder cannot be sealed twice:
    /// the manifest is claimed under that same lock, so exactly one `seal`
    /// ever runs and every later operation reports [`Error::Poisoned`]. If
    /// sealing fails the sink may have been partially written and is the
    /// caller's to discard.
    pub fn seal<W: Write>(&self, sink: W) -> Result<u64> {
        self.check_usable()?;
        let mut manifest = self.staging.manifest();
        if manifest.finished {
            return Err(Error::Poisoned);
        }
        manifest.finished = true;

        match self.seal_inner(&mut manifest, sink) {
            Ok(written) => Ok(written),
            Err(err) => {
                self.poisoned.store(true, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    fn seal_inner<W: Write>(&self, manifest: &mut Manifest, mut sink: W) -> Result<u64> {
        // Provisional header, complete except for offsets. The reserved
        // region size depends only on name and author lengths.
        let mut header = Header {
            author: self.metadata.author.clone(),
            date_created: self.metadata.date_created,
            version: self.metadata.version,
            index: manifest
                .entries
                .iter()
                .map(|entry| IndexEntry {
                    name: entry.name.clone(),
                    offset: i64::MIN,
                    size: entry.size,
                    compressed_size: entry.compressed_size,
                })
                .collect(),
        };
        let reserved = header.max_expected_size();

        sink.write_all(&KAR_MAGIC)?;
        sink.write_all(&reserved.to_le_bytes())?;

        // Payloads start right after the reserved header region.
        let mut offset = HEADER_REGION_START as i64 + reserved;
        for entry in &mut header.index {
            entry.offset = offset;
            offset += entry.compressed_size;
        }

        let encoded = header.encode();
        if encoded.len() as i64 > reserved {
            return Err(Error::Invariant {
                encoded: encoded.len() as u64,
                reserved: reserved as u64,
            });
        }
        sink.write_all(&encoded)?;
        sink.write_all(&vec![0u8; reserved as usize - encoded.len()])?;

        for entry in &manifest.entries {
            let mut blob = self.staging.open_blob(entry)?;
            let copied = io::copy(&mut blob, &mut sink)?;
            if copied != entry.compressed_size as u64 {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "staged blob for {:?} is {} bytes, manifest says {}",
                        entry.name, copied, entry.compressed_size
                    ),
                )));
            }
        }
        sink.flush()?;

        debug!(
            "sealed archive: {} entries, {} header bytes reserved, {} total",
            manifest.entries.len(),
            reserved,
            offset
        );

        manifest.entries.clear();
        Ok(offset as u64)
    }

    fn check_usable(&self) -> Result<()> {
        if self.poisoned.load(Ordering::SeqCst) {
            return Err(Error::Poisoned);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> ArchiveMetadata {
        ArchiveMetadata {
            author: "devblok".to_string(),
            date_created: 1_546_300_800,
            version: 1,
        }
    }

    #[test]
    fn test_add_and_seal() {
        let builder = Builder::new(metadata()).unwrap();
        builder
            .add("test", &b"idunvovkjnreovmegihjbrqlkmfrjnb"[..])
            .unwrap();
        builder
            .add("test2", &b"idunvovkjnreovmsdvwrvnervnreegihjbrqlkmfrjnb"[..])
            .unwrap();
        assert_eq!(builder.entry_count(), 2);

        let mut sealed = Vec::new();
        let written = builder.seal(&mut sealed).unwrap();
        assert_eq!(written, sealed.len() as u64);
        assert_eq!(&sealed[..4], &KAR_MAGIC);
    }

    #[test]
    fn test_size_slot_matches_reserved_region() {
        let builder = Builder::new(metadata()).unwrap();
        builder.add("entry", &b"bytes"[..]).unwrap();

        let mut sealed = Vec::new();
        builder.seal(&mut sealed).unwrap();

        let reserved = i64::from_le_bytes(sealed[4..12].try_into().unwrap());
        assert!(reserved > 0);
        // The payload region starts exactly where the reserved region ends.
        assert!(sealed.len() as i64 > HEADER_REGION_START as i64 + reserved);
    }

    #[test]
    fn test_seal_twice_is_rejected() {
        let builder = Builder::new(metadata()).unwrap();
        builder.add("entry", &b"bytes"[..]).unwrap();
        builder.seal(&mut Vec::new()).unwrap();

        let err = builder.seal(&mut Vec::new()).unwrap_err();
        assert!(matches!(err, Error::Poisoned));
        let err = builder.add("late", &b"x"[..]).unwrap_err();
        assert!(matches!(err, Error::Poisoned));
    }

    #[test]
    fn test_duplicate_does_not_poison() {
        let builder = Builder::new(metadata()).unwrap();
        builder.add("dup", &b"x"[..]).unwrap();

        let err = builder.add("dup", &b"y"[..]).unwrap_err();
        assert!(matches!(err, Error::Duplicate(_)));

        // Still usable: the first entry survives and seal succeeds.
        builder.add("other", &b"z"[..]).unwrap();
        assert_eq!(builder.entry_count(), 2);
        builder.seal(&mut Vec::new()).unwrap();
    }

    #[test]
    fn test_failing_reader_poisons() {
        struct FailingReader;
        impl Read for FailingReader {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("synthetic read failure"))
            }
        }

        let builder = Builder::new(metadata()).unwrap();
        let err = builder.add("bad", FailingReader).unwrap_err();
        assert!(matches!(err, Error::Io(_)));

        let err = builder.add("good", &b"x"[..]).unwrap_err();
        assert!(matches!(err, Error::Poisoned));
        let err = builder.seal(&mut Vec::new()).unwrap_err();
        assert!(matches!(err, Error::Poisoned));
    }
}
