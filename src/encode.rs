//! Two-pass CBOR encoder: size query, then byte emission, sharing one
//! recursive traversal and one length-class selection rule.
//!
//! Grounded on `original_source/encode.c`'s `cbor_enc`/`enc_*` family, whose
//! every emitter takes a `justsize` flag and either returns a byte count or
//! actually writes. This port keeps that one-traversal-two-outcomes shape
//! but replaces the `justsize` boolean with an [`EncodeSink`] trait object:
//! [`CountingSink`] only accumulates a length, [`BufSink`] copies into a
//! caller buffer and fails with [`ErrorCode::BufferTooSmall`] on overflow —
//! resolving `spec.md` §9's "Buffer-exhaustion signalling" note in favor of
//! an explicit status rather than the source's overloaded `ulong` return.

use crate::error::{CborError, ErrorCode};
use crate::value::{Value, ValueKind};

trait EncodeSink {
    fn put(&mut self, bytes: &[u8]) -> Result<(), CborError>;
}

struct CountingSink(usize);

impl EncodeSink for CountingSink {
    fn put(&mut self, bytes: &[u8]) -> Result<(), CborError> {
        self.0 += bytes.len();
        Ok(())
    }
}

struct BufSink<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl EncodeSink for BufSink<'_> {
    fn put(&mut self, bytes: &[u8]) -> Result<(), CborError> {
        let end = self
            .pos
            .checked_add(bytes.len())
            .ok_or_else(|| CborError::without_offset(ErrorCode::BufferTooSmall))?;
        let dst = self
            .buf
            .get_mut(self.pos..end)
            .ok_or_else(|| CborError::without_offset(ErrorCode::BufferTooSmall))?;
        dst.copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }
}

/// Write the initial byte plus any length-class bytes for `major` (shifted
/// into the high three bits) and magnitude `v`, per `spec.md` §4.4's integer
/// length-class selection: 1/2/3/5/9 bytes depending on `v`'s range.
fn write_header(sink: &mut dyn EncodeSink, major: u8, v: u64) -> Result<(), CborError> {
    let m = major << 5;
    if v < 24 {
        sink.put(&[m | v as u8])
    } else if v < 0x100 {
        sink.put(&[m | 24, v as u8])
    } else if v < 0x1_0000 {
        let b = (v as u16).to_be_bytes();
        sink.put(&[m | 25, b[0], b[1]])
    } else if v < 0x1_0000_0000 {
        let b = (v as u32).to_be_bytes();
        sink.put(&[m | 26, b[0], b[1], b[2], b[3]])
    } else {
        let b = v.to_be_bytes();
        sink.put(&[m | 27, b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
    }
}

fn encode_into(value: Value, sink: &mut dyn EncodeSink) -> Result<(), CborError> {
    match value.kind() {
        ValueKind::UInt => {
            write_header(sink, 0, value.as_uint().expect("UInt has a uint payload"))
        }
        ValueKind::NInt => write_header(
            sink,
            1,
            value.as_nint_magnitude().expect("NInt has a magnitude"),
        ),
        ValueKind::Bytes => {
            let bytes = value.as_bytes().expect("Bytes has a byte payload");
            write_header(sink, 2, bytes.len() as u64)?;
            sink.put(bytes)
        }
        ValueKind::Text => {
            let bytes = value.as_text_bytes().expect("Text has a text payload");
            write_header(sink, 3, bytes.len() as u64)?;
            sink.put(bytes)
        }
        ValueKind::Array => {
            let children = value.as_array().expect("Array has children");
            write_header(sink, 4, children.len() as u64)?;
            for &child in children {
                encode_into(child, sink)?;
            }
            Ok(())
        }
        ValueKind::Map => {
            let elements = value.as_map_entries().expect("Map has elements");
            write_header(sink, 5, elements.len() as u64)?;
            for &elem in elements {
                encode_into(elem, sink)?;
            }
            Ok(())
        }
        ValueKind::MapElement => {
            let (k, v) = value
                .as_map_element()
                .expect("MapElement has a key/value pair");
            encode_into(k, sink)?;
            encode_into(v, sink)
        }
        ValueKind::Tag => {
            let (tag, item) = value.as_tag().expect("Tag has a tag number and item");
            write_header(sink, 6, tag)?;
            encode_into(item, sink)
        }
        ValueKind::Null => sink.put(&[0xf6]),
        ValueKind::Float32 => {
            let f = value.as_f32().expect("Float32 has an f32 payload");
            let b = f.to_bits().to_be_bytes();
            sink.put(&[0xfa, b[0], b[1], b[2], b[3]])
        }
        ValueKind::Float64 => {
            let d = value.as_f64().expect("Float64 has an f64 payload");
            let b = d.to_bits().to_be_bytes();
            sink.put(&[0xfb, b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
        }
    }
}

/// The exact number of bytes [`encode`] would write for `value`.
///
/// `spec.md` §8's size-query law: `encode_size(v) == bytes_written_on_success`
/// for the same `v`, since both share [`encode_into`].
#[must_use]
pub fn encode_size(value: Value) -> usize {
    let mut sink = CountingSink(0);
    encode_into(value, &mut sink).expect("a counting sink never fails");
    sink.0
}

/// Encode `value` into `buf`, returning the number of bytes written.
///
/// # Errors
///
/// Returns `ErrorCode::BufferTooSmall` if `buf` is shorter than
/// [`encode_size(value)`](encode_size); the buffer is left partially
/// written in that case (the caller should discard it; there is no partial
/// tree to free here since `encode` never allocates).
pub fn encode(value: Value, buf: &mut [u8]) -> Result<usize, CborError> {
    let mut sink = BufSink { buf, pos: 0 };
    encode_into(value, &mut sink)?;
    Ok(sink.pos)
}
