//! Random-access byte sources
//!
//! An [`Archive`](crate::Archive) reads through the [`ReadAt`] trait:
//! positional reads through a shared reference, so any number of readers can
//! pull from the same source concurrently without coordination. Memory maps,
//! plain byte slices and files all qualify. [`FileSource`] is the usual way
//! to open an archive from disk: it memory-maps the file when it can and
//! falls back to positional file reads when it cannot.

use std::fs::File;
use std::io;
use std::path::Path;

use memmap2::{Mmap, MmapOptions};
use tracing::debug;

/// Files above this size are not memory-mapped.
const MMAP_CEILING: u64 = 2_147_483_648;

/// Positional reads over a shared reference.
pub trait ReadAt {
    /// Read up to `buf.len()` bytes starting at `offset`, returning the
    /// number of bytes read. A return of 0 means end of source.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Fill `buf` completely from `offset` or fail with `UnexpectedEof`.
    fn read_exact_at(&self, mut offset: u64, mut buf: &mut [u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.read_at(offset, buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("source ended {} bytes early at offset {offset}", buf.len()),
                    ));
                }
                Ok(n) => {
                    buf = &mut buf[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl ReadAt for [u8] {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset >= self.len() as u64 {
            return Ok(0);
        }
        let start = offset as usize;
        let n = buf.len().min(self.len() - start);
        buf[..n].copy_from_slice(&self[start..start + n]);
        Ok(n)
    }
}

impl ReadAt for Vec<u8> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.as_slice().read_at(offset, buf)
    }
}

impl ReadAt for Mmap {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self[..].read_at(offset, buf)
    }
}

#[cfg(unix)]
impl ReadAt for File {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(self, buf, offset)
    }
}

#[cfg(windows)]
impl ReadAt for File {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_read(self, buf, offset)
    }
}

impl<T: ReadAt + ?Sized> ReadAt for &T {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_at(offset, buf)
    }
}

/// An archive file on disk, memory-mapped when possible.
///
/// Memory mapping is attempted for non-empty files below a size ceiling;
/// anything else is served through positional file reads. Either way the
/// source supports concurrent readers.
pub struct FileSource {
    mmap: Option<Mmap>,
    file: File,
    len: u64,
}

impl FileSource {
    /// Open a file as a random-access byte source.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();

        debug!("opening archive source {:?} ({} bytes)", path, len);

        let mmap = if len > 0 && len < MMAP_CEILING {
            match unsafe { MmapOptions::new().map(&file) } {
                Ok(mmap) => Some(mmap),
                Err(e) => {
                    debug!("memory map failed, falling back to file reads: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Ok(Self { mmap, file, len })
    }

    /// Total size of the source in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether reads are served from a memory map.
    pub fn is_memory_mapped(&self) -> bool {
        self.mmap.is_some()
    }
}

impl ReadAt for FileSource {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        match &self.mmap {
            Some(mmap) => mmap.read_at(offset, buf),
            None => self.file.read_at(offset, buf),
        }
    }
}
