//! KAR resource archive
//!
//! KAR is an LZ4-backed container format built for streaming resources
//! (textures, meshes, shaders) from disk with minimum latency. The archive
//! itself is not compressed; every entry is compressed individually as one
//! LZ4 frame, so an entry can be decompressed straight from its place in the
//! file. Combined with a precomputed index at the front of the archive, this
//! makes KAR files well suited to memory mapping and concurrent reads. It
//! trades some space efficiency for getting resources from disk to a usable
//! state as fast as possible.
//!
//! Archives are sealed on write and immutable after: [`Builder`] stages
//! entries into per-entry compressed temporary files and emits the finished
//! archive in one pass, [`Archive`] opens a sealed archive over any
//! random-access byte source and answers lookup, whole-read and streaming
//! queries.
//!
//! ```no_run
//! use kar::{Archive, ArchiveMetadata, Builder};
//!
//! # fn main() -> kar::Result<()> {
//! let builder = Builder::new(ArchiveMetadata {
//!     author: "devblok".to_string(),
//!     date_created: 0,
//!     version: 1,
//! })?;
//! builder.add("shaders/basic.spv", &b"...spir-v..."[..])?;
//!
//! let mut sealed = Vec::new();
//! builder.seal(&mut sealed)?;
//!
//! let archive = Archive::open(sealed)?;
//! let bytes = archive.read_all("shaders/basic.spv")?;
//! # let _ = bytes;
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod builder;
pub mod codec;
pub mod error;
pub mod header;
pub mod source;
mod staging;
pub mod stream;

pub use archive::{Archive, ArchiveOptions};
pub use builder::{ArchiveMetadata, Builder};
pub use error::{Error, Result};
pub use header::{Header, IndexEntry};
pub use source::{FileSource, ReadAt};
pub use stream::EntryReader;

/// Magic bytes at the start of every archive.
pub const KAR_MAGIC: [u8; 4] = [b'K', b'A', b'R', 0x00];

/// Width in bytes of the header-size slot that follows the magic, holding a
/// little-endian signed 64-bit integer.
pub const HEADER_SIZE_LEN: usize = 8;

/// Byte position at which the header region starts.
pub const HEADER_REGION_START: u64 = KAR_MAGIC.len() as u64 + HEADER_SIZE_LEN as u64;
