//! Streaming entry decompression
//!
//! [`EntryReader`] decompresses one entry lazily as the consumer reads,
//! pulling compressed bytes from a bounded window of the archive through a
//! positional cursor. Readers are sequential, single-consumer and not
//! restartable; any number of them can be open over the same archive at
//! once, each with its own cursor.

use std::io::{self, Read};

use lz4_flex::frame::FrameDecoder;
use tracing::trace;

use crate::codec;
use crate::error::Error;
use crate::header::IndexEntry;
use crate::source::ReadAt;

/// Sequential `Read` over the window `[offset, offset + len)` of a shared
/// byte source. The cursor is local, so concurrent sections over one source
/// never interfere.
pub struct SectionReader<'a, R: ReadAt> {
    source: &'a R,
    offset: u64,
    remaining: u64,
}

impl<'a, R: ReadAt> SectionReader<'a, R> {
    pub fn new(source: &'a R, offset: u64, len: u64) -> Self {
        Self {
            source,
            offset,
            remaining: len,
        }
    }
}

impl<R: ReadAt> Read for SectionReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let cap = self.remaining.min(buf.len() as u64) as usize;
        if cap == 0 {
            return Ok(0);
        }
        let n = self.source.read_at(self.offset, &mut buf[..cap])?;
        self.offset += n as u64;
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// A decompressing reader for a single entry in an archive.
///
/// Produces exactly the entry's uncompressed length and then reports end of
/// file. The writer fixed that length at seal time, so a decoder that keeps
/// producing past it means the archive is corrupt; that surfaces as an
/// `InvalidData` error wrapping [`Error::Format`]. A decoder that runs dry
/// early surfaces as `UnexpectedEof`.
pub struct EntryReader<'a, R: ReadAt> {
    name: String,
    decoder: FrameDecoder<SectionReader<'a, R>>,
    remaining: u64,
    checked_eof: bool,
}

impl<'a, R: ReadAt> EntryReader<'a, R> {
    pub(crate) fn new(source: &'a R, entry: &IndexEntry) -> Self {
        trace!(
            "streaming entry {:?}: {} compressed bytes at offset {}",
            entry.name, entry.compressed_size, entry.offset
        );
        let section = SectionReader::new(source, entry.offset as u64, entry.compressed_size as u64);
        Self {
            name: entry.name.clone(),
            decoder: codec::decompress_stream(section),
            remaining: entry.size as u64,
            checked_eof: false,
        }
    }

    /// Decompressed bytes this reader has yet to produce.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl<R: ReadAt> Read for EntryReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            if !self.checked_eof {
                let mut probe = [0u8; 1];
                let surplus = self.decoder.read(&mut probe)?;
                self.checked_eof = true;
                if surplus > 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        Error::Format(format!(
                            "entry {:?} decompresses past its indexed size",
                            self.name
                        )),
                    ));
                }
            }
            return Ok(0);
        }

        let cap = self.remaining.min(buf.len() as u64) as usize;
        if cap == 0 {
            return Ok(0);
        }
        let n = self.decoder.read(&mut buf[..cap])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "entry {:?} ended {} bytes before its indexed size",
                    self.name, self.remaining
                ),
            ));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_section_reader_stays_in_bounds() {
        let data = b"....window....";

        let slice = &data[..];
        let mut section = SectionReader::new(&slice, 4, 6);
        let mut out = Vec::new();
        section.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"window");
    }

    #[test]
    fn test_section_reader_clamps_to_source_end() {
        let data = b"short";

        // Window claims more than the source holds; reads just stop early.
        let slice = &data[..];
        let mut section = SectionReader::new(&slice, 2, 100);
        let mut out = Vec::new();
        section.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"ort");
    }

    fn framed(payload: &[u8]) -> Vec<u8> {
        let mut encoder = codec::compress_stream(Vec::new());
        encoder.write_all(payload).unwrap();
        encoder.finish().unwrap()
    }

    fn entry(name: &str, compressed: &[u8], size: i64) -> IndexEntry {
        IndexEntry {
            name: name.to_string(),
            offset: 0,
            size,
            compressed_size: compressed.len() as i64,
        }
    }

    #[test]
    fn test_entry_reader_yields_exact_size() {
        let payload = b"streamed entry payload";
        let compressed = framed(payload);

        let mut reader = EntryReader::new(&compressed, &entry("e", &compressed, payload.len() as i64));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, payload);
        assert_eq!(reader.remaining(), 0);

        // EOF is sticky.
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_surplus_decoded_bytes_are_corruption() {
        let compressed = framed(b"twelve bytes plus more");

        // Index claims fewer bytes than the frame actually holds.
        let mut reader = EntryReader::new(&compressed, &entry("e", &compressed, 12));
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_decoder_underrun_is_unexpected_eof() {
        let compressed = framed(b"short");

        // Index claims more bytes than the frame can produce.
        let mut reader = EntryReader::new(&compressed, &entry("e", &compressed, 64));
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
