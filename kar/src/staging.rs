//! Builder-side staging of compressed entries
//!
//! Every entry handed to the builder is compressed immediately into its own
//! blob inside a process-owned temporary directory. The directory lives as
//! long as the builder and is removed on drop, success or not. The manifest
//! is the only shared mutable state: appends are serialized by one mutex and
//! fix the order entries will take in the sealed archive.

use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};
use tempfile::TempDir;
use tracing::{debug, trace};

use crate::codec;
use crate::error::{Error, Result};

/// One staged entry, recorded in the order its `stage` call completed.
#[derive(Debug, Clone)]
pub(crate) struct StagedEntry {
    pub name: String,
    pub temp_name: String,
    pub size: i64,
    pub compressed_size: i64,
}

/// Manifest contents, only ever touched under the store's mutex. `finished`
/// is set by seal while it holds the lock, so the check-and-append in
/// `stage` and the check-and-seal are both atomic with the locked section.
#[derive(Debug, Default)]
pub(crate) struct Manifest {
    pub entries: Vec<StagedEntry>,
    pub finished: bool,
}

/// Temporary directory of per-entry compressed blobs plus the manifest.
pub(crate) struct StagingStore {
    dir: TempDir,
    counter: AtomicU64,
    manifest: Mutex<Manifest>,
}

impl StagingStore {
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("kar-builder-").tempdir()?;
        debug!("created staging directory {:?}", dir.path());
        Ok(Self {
            dir,
            counter: AtomicU64::new(0),
            manifest: Mutex::new(Manifest::default()),
        })
    }

    /// Compress `reader` into a fresh blob and append it to the manifest.
    ///
    /// Safe to call from multiple threads; the append is the linearization
    /// point. A name already present in the manifest is rejected there with
    /// [`Error::Duplicate`], and a manifest a seal has already claimed is
    /// rejected with [`Error::Poisoned`] so no entry can slip in after the
    /// payload copy has started.
    pub fn stage<R: Read>(&self, name: &str, reader: &mut R) -> Result<()> {
        // The counter keeps temp names unique under concurrent staging.
        let temp_name = format!("{:08x}", self.counter.fetch_add(1, Ordering::Relaxed));
        let path = self.dir.path().join(&temp_name);

        let file = File::create(&path)?;
        let mut encoder = codec::compress_stream(file);
        let size = io::copy(reader, &mut encoder)?;
        let file = encoder.finish().map_err(codec::encode_error)?;
        file.sync_all()?;
        let compressed_size = file.metadata()?.len();
        drop(file);

        trace!(
            "staged {:?} as {}: {} bytes -> {} compressed",
            name, temp_name, size, compressed_size
        );

        let mut manifest = self.manifest.lock();
        if manifest.finished {
            return Err(Error::Poisoned);
        }
        if manifest.entries.iter().any(|entry| entry.name == name) {
            return Err(Error::Duplicate(name.to_string()));
        }
        manifest.entries.push(StagedEntry {
            name: name.to_string(),
            temp_name,
            size: size as i64,
            compressed_size: compressed_size as i64,
        });
        Ok(())
    }

    /// Lock the manifest. Seal holds this guard for its whole duration so no
    /// `stage` can slip an entry in while offsets are being fixed.
    pub fn manifest(&self) -> MutexGuard<'_, Manifest> {
        self.manifest.lock()
    }

    /// Re-open a staged blob for reading.
    pub fn open_blob(&self, entry: &StagedEntry) -> Result<File> {
        Ok(File::open(self.blob_path(entry))?)
    }

    fn blob_path(&self, entry: &StagedEntry) -> PathBuf {
        self.dir.path().join(&entry.temp_name)
    }
}
