//! LZ4 frame codec adapter
//!
//! Entry payloads are stored as independent LZ4 frames so each one can be
//! decompressed straight from its place in the archive. The frame format is
//! self-delimiting, which keeps the index free of codec detail beyond the
//! compressed byte count.

use std::io::{Read, Write};

use lz4_flex::frame::{FrameDecoder, FrameEncoder};

use crate::error::Error;

/// Wrap `sink` in a writer that compresses bytes on the fly into one LZ4
/// frame. Call [`FrameEncoder::finish`] to flush all pending blocks and get
/// the sink back.
pub fn compress_stream<W: Write>(sink: W) -> FrameEncoder<W> {
    FrameEncoder::new(sink)
}

/// Wrap `source` in a reader that decompresses an LZ4 frame on the fly.
pub fn decompress_stream<R: Read>(source: R) -> FrameDecoder<R> {
    FrameDecoder::new(source)
}

/// Classify an error reported by the frame decoder's `Read` impl.
///
/// The decoder folds its own errors into `std::io::Error`; a malformed frame
/// is a [`Error::Codec`], anything else came from the underlying byte source.
pub(crate) fn decode_error(err: std::io::Error) -> Error {
    match err.get_ref() {
        Some(inner) if inner.is::<lz4_flex::frame::Error>() => Error::Codec(err.to_string()),
        _ => Error::Io(err),
    }
}

/// Classify an error reported by the frame encoder.
pub(crate) fn encode_error(err: lz4_flex::frame::Error) -> Error {
    match err {
        lz4_flex::frame::Error::IoError(inner) => Error::Io(inner),
        other => Error::Codec(other.to_string()),
    }
}
