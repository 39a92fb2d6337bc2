//! Best-effort human-readable rendering of a value tree, for diagnostics.
//!
//! Grounded on `original_source/convS2M.c`'s `cbor_print` and the variant in
//! `original_source/test.c` (which is the one that actually prints
//! `CBOR_NINT`, as `-%llud` of `uint+1`, i.e. exactly `-(m+1)` — the
//! rendering rule `spec.md` §4.7 specifies). Both write into a
//! caller-bounded `char*` range via `seprint`, truncating silently once the
//! range fills; [`BoundedWriter`] plays that role here for a `&mut [u8]`.

use core::fmt::{self, Write};

use crate::value::{Value, ValueKind};

/// A [`fmt::Write`] sink over a fixed byte buffer that truncates instead of
/// erroring once `buf` is full, matching `spec.md` §4.7: "the renderer
/// truncates silently when the buffer is full."
struct BoundedWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl Write for BoundedWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let remaining = self.buf.len() - self.pos;
        let n = remaining.min(s.len());
        self.buf[self.pos..self.pos + n].copy_from_slice(&s.as_bytes()[..n]);
        self.pos += n;
        Ok(())
    }
}

fn print_value(value: Value, w: &mut BoundedWriter<'_>) -> fmt::Result {
    match value.kind() {
        ValueKind::UInt => write!(w, "{}", value.as_uint().expect("UInt has a uint payload")),
        ValueKind::NInt => {
            let m = value.as_nint_magnitude().expect("NInt has a magnitude");
            write!(w, "-{}", u128::from(m) + 1)
        }
        ValueKind::Bytes => {
            let bytes = value.as_bytes().expect("Bytes has a byte payload");
            for b in bytes {
                write!(w, "{b:02X}")?;
            }
            Ok(())
        }
        ValueKind::Text => {
            let bytes = value.as_text_bytes().expect("Text has a text payload");
            write!(w, "\"")?;
            match core::str::from_utf8(bytes) {
                Ok(s) => write!(w, "{s}")?,
                Err(_) => write!(w, "<invalid utf8>")?,
            }
            write!(w, "\"")
        }
        ValueKind::Array => {
            let children = value.as_array().expect("Array has children");
            write!(w, "[")?;
            for (i, &child) in children.iter().enumerate() {
                if i > 0 {
                    write!(w, ", ")?;
                }
                print_value(child, w)?;
            }
            write!(w, "]")
        }
        ValueKind::Map => {
            let elements = value.as_map_entries().expect("Map has elements");
            write!(w, "{{")?;
            for (i, &elem) in elements.iter().enumerate() {
                if i > 0 {
                    write!(w, ", ")?;
                }
                print_value(elem, w)?;
            }
            write!(w, "}}")
        }
        ValueKind::MapElement => {
            let (k, v) = value
                .as_map_element()
                .expect("MapElement has a key/value pair");
            print_value(k, w)?;
            write!(w, ": ")?;
            print_value(v, w)
        }
        ValueKind::Tag => {
            let (tag, item) = value.as_tag().expect("Tag has a tag number and item");
            write!(w, "{tag}(")?;
            print_value(item, w)?;
            write!(w, ")")
        }
        ValueKind::Null => write!(w, "null"),
        ValueKind::Float32 => write!(w, "{:?}", value.as_f32().expect("Float32 has a payload")),
        ValueKind::Float64 => write!(w, "{:?}", value.as_f64().expect("Float64 has a payload")),
    }
}

/// Render `value` as a human-readable diagnostic string into `buf`, returning
/// the number of bytes written.
///
/// Output is truncated silently (not an error) if `buf` is too small. This
/// is a best-effort diagnostic aid, not a wire format: it is not intended to
/// be parsed back.
#[must_use]
pub fn print(value: Value, buf: &mut [u8]) -> usize {
    let mut w = BoundedWriter { buf, pos: 0 };
    let _ = print_value(value, &mut w);
    w.pos
}
