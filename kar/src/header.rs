//! Archive header encoding and decoding
//!
//! The header is a little-endian, length-prefixed field list: author,
//! creation timestamp, version tag, then the entry index. The builder
//! reserves a region sized by [`Header::max_expected_size`] before the first
//! payload is written, so the decoder consumes exactly the encoded prefix
//! and ignores the zero padding that fills the rest of the region.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{Error, Result};

/// Smallest possible encoded index entry: empty name plus three 64-bit
/// fields. Used to reject entry counts the input cannot possibly hold.
const MIN_ENTRY_ENCODED: u64 = 4 + 8 + 8 + 8;

/// Fixed overhead reserved per header beyond the author bytes.
const BASE_OVERHEAD: i64 = 64;

/// Fixed overhead reserved per index entry beyond the name bytes.
const ENTRY_OVERHEAD: i64 = 32;

/// Info for one file in the archive index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Entry name, matched exactly on lookup.
    pub name: String,

    /// Absolute byte position where this entry's compressed payload begins.
    pub offset: i64,

    /// Uncompressed byte length.
    pub size: i64,

    /// Bytes the payload occupies in the archive.
    pub compressed_size: i64,
}

/// The decoded archive header: metadata plus the entry index, in the order
/// payloads appear in the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    pub author: String,
    pub date_created: i64,
    pub version: i64,
    pub index: Vec<IndexEntry>,
}

impl Header {
    /// Encode the header to its byte form.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.max_expected_size() as usize);
        out.extend_from_slice(&(self.author.len() as u32).to_le_bytes());
        out.extend_from_slice(self.author.as_bytes());
        out.extend_from_slice(&self.date_created.to_le_bytes());
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&(self.index.len() as u32).to_le_bytes());
        for entry in &self.index {
            out.extend_from_slice(&(entry.name.len() as u32).to_le_bytes());
            out.extend_from_slice(entry.name.as_bytes());
            out.extend_from_slice(&entry.offset.to_le_bytes());
            out.extend_from_slice(&entry.size.to_le_bytes());
            out.extend_from_slice(&entry.compressed_size.to_le_bytes());
        }
        out
    }

    /// Decode a header from the front of `raw`. Trailing bytes beyond the
    /// encoded form are region padding and are ignored.
    pub fn decode(raw: &[u8]) -> Result<Header> {
        let mut cursor = Cursor::new(raw);

        let author = read_string(&mut cursor, "author")?;
        let date_created = read_i64(&mut cursor, "date_created")?;
        let version = read_i64(&mut cursor, "version")?;

        let entry_count = read_u32(&mut cursor, "entry count")?;
        let remaining = raw.len() as u64 - cursor.position();
        if u64::from(entry_count) * MIN_ENTRY_ENCODED > remaining {
            return Err(Error::Format(format!(
                "index of {entry_count} entries cannot fit in {remaining} header bytes"
            )));
        }

        let mut index = Vec::with_capacity(entry_count as usize);
        for _ in 0..entry_count {
            let name = read_string(&mut cursor, "entry name")?;
            let offset = read_i64(&mut cursor, "entry offset")?;
            let size = read_i64(&mut cursor, "entry size")?;
            let compressed_size = read_i64(&mut cursor, "entry compressed size")?;

            if offset < 0 || size < 0 || compressed_size < 0 {
                return Err(Error::Format(format!(
                    "entry {name:?} has negative offset or size"
                )));
            }

            index.push(IndexEntry {
                name,
                offset,
                size,
                compressed_size,
            });
        }

        Ok(Header {
            author,
            date_created,
            version,
            index,
        })
    }

    /// Upper bound on the encoded size of this header, used to reserve the
    /// padded header region before any payload is written.
    pub fn max_expected_size(&self) -> i64 {
        let mut size = BASE_OVERHEAD + self.author.len() as i64;
        for entry in &self.index {
            size += ENTRY_OVERHEAD + entry.name.len() as i64;
        }
        size
    }
}

fn read_u32(cursor: &mut Cursor<&[u8]>, field: &str) -> Result<u32> {
    cursor
        .read_u32::<LittleEndian>()
        .map_err(|_| Error::Format(format!("header truncated reading {field}")))
}

fn read_i64(cursor: &mut Cursor<&[u8]>, field: &str) -> Result<i64> {
    cursor
        .read_i64::<LittleEndian>()
        .map_err(|_| Error::Format(format!("header truncated reading {field}")))
}

fn read_string(cursor: &mut Cursor<&[u8]>, field: &str) -> Result<String> {
    let len = read_u32(cursor, field)? as usize;
    let start = cursor.position() as usize;
    let raw = *cursor.get_ref();

    let end = start.checked_add(len).filter(|&end| end <= raw.len());
    let Some(end) = end else {
        return Err(Error::Format(format!(
            "{field} length {len} overruns header at byte {start}"
        )));
    };

    let value = std::str::from_utf8(&raw[start..end])
        .map_err(|_| Error::Format(format!("{field} is not valid UTF-8")))?
        .to_string();
    cursor.set_position(end as u64);
    Ok(value)
}
