//! Format-string–driven destructurer: walks a value tree and writes into
//! caller-provided out-variables, including map-by-key lookup.
//!
//! Grounded on `original_source/unpack.c`'s `cbor_vunpack`/`cbor_unpack` and
//! its `map_find` helper. As with [`crate::pack`], the C `va_list` of
//! pointer-typed out-arguments is replaced by a slice of [`UnpackArg`] — each
//! variant wraps the `&mut` slot a token writes into — walked the same way
//! the source walks `va_list` one `va_arg` at a time.
//!
//! `map_find` here uses exact equality of length and bytes, not the
//! source's `strncmp` over `min(search_len, stored_len)` (`spec.md` §9's
//! "Map lookup semantics" note: the loose match is "almost certainly a
//! bug").

use core::iter::Peekable;
use core::str::Bytes;

use crate::allocator::CborAllocator;
use crate::error::{CborError, ErrorCode};
use crate::value::Value;

/// A heap buffer allocated by [`unpack`] for a `b` or `s` token, owned by
/// the caller and freed with [`free_owned_buf`].
///
/// For a `s` token the buffer is null-terminated: `alloc_len` is
/// `len + 1`, with a trailing `0` byte the caller may rely on for C
/// interop, while [`OwnedBuf::as_slice`] returns only the `len` data
/// bytes.
pub struct OwnedBuf {
    ptr: core::ptr::NonNull<u8>,
    len: usize,
    alloc_len: usize,
}

impl OwnedBuf {
    /// The copied-out payload, excluding any trailing nul.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: `ptr` is valid for `len` initialized bytes; see
        // `copy_owned`, the sole constructor.
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

/// Free a buffer previously produced by [`unpack`]'s `b`/`s` tokens. Must be
/// called with the same allocator `unpack` used.
pub fn free_owned_buf(alloc: &dyn CborAllocator, buf: OwnedBuf) {
    alloc.deallocate(buf.ptr, buf.alloc_len);
}

fn copy_owned(alloc: &dyn CborAllocator, src: &[u8], nul_terminate: bool) -> Option<OwnedBuf> {
    let alloc_len = if nul_terminate { src.len() + 1 } else { src.len() };
    let ptr = if alloc_len == 0 {
        core::ptr::NonNull::dangling()
    } else {
        alloc.allocate(alloc_len)?
    };
    if !src.is_empty() {
        // SAFETY: `ptr` was just allocated with room for `alloc_len >=
        // src.len()` bytes and nothing else references it yet.
        unsafe { core::ptr::copy_nonoverlapping(src.as_ptr(), ptr.as_ptr(), src.len()) };
    }
    if nul_terminate {
        // SAFETY: `ptr` has room for `src.len() + 1` bytes.
        unsafe { ptr.as_ptr().add(src.len()).write(0) };
    }
    Some(OwnedBuf {
        ptr,
        len: src.len(),
        alloc_len,
    })
}

/// One out-argument slot a [`unpack`] format token writes into.
///
/// Mirrors `PackArg`'s role in `crate::pack`: the C `va_list` of output
/// pointers, replaced by a slice of tagged `&mut` slots.
pub enum UnpackArg<'a> {
    /// Slot for `u`.
    Uint(&'a mut u64),
    /// Slot for `i`.
    Sint(&'a mut i64),
    /// Slot for `b`: filled with a caller-owned, allocator-backed copy.
    Bytes(&'a mut Option<OwnedBuf>),
    /// Slot for `s`: filled with a caller-owned, null-terminated copy.
    Text(&'a mut Option<OwnedBuf>),
    /// Slot for the tag number written by a `t` token.
    Tag(&'a mut u64),
    /// A map key consumed by a preceding `S` token inside `{`...`}`.
    Key(&'a str),
    /// Slot for `c`: the matched value, exposed by reference (no copy).
    Cbor(&'a mut Option<Value>),
}

impl<'a> UnpackArg<'a> {
    /// The key string, if this is a [`UnpackArg::Key`] slot.
    fn expect_key(&self) -> &'a str {
        match self {
            Self::Key(k) => *k,
            _ => panic!("unpack: expected a Key argument for 'S'"),
        }
    }

    fn write_uint(&mut self, v: u64) {
        match self {
            Self::Uint(slot) => **slot = v,
            _ => panic!("unpack: out-argument type mismatch for 'u'"),
        }
    }

    fn write_sint(&mut self, v: i64) {
        match self {
            Self::Sint(slot) => **slot = v,
            _ => panic!("unpack: out-argument type mismatch for 'i'"),
        }
    }

    fn write_bytes(&mut self, buf: OwnedBuf) {
        match self {
            Self::Bytes(slot) => **slot = Some(buf),
            _ => panic!("unpack: out-argument type mismatch for 'b'"),
        }
    }

    fn write_text(&mut self, buf: OwnedBuf) {
        match self {
            Self::Text(slot) => **slot = Some(buf),
            _ => panic!("unpack: out-argument type mismatch for 's'"),
        }
    }

    fn write_tag(&mut self, tag: u64) {
        match self {
            Self::Tag(slot) => **slot = tag,
            _ => panic!("unpack: out-argument type mismatch for 't'"),
        }
    }

    fn write_cbor(&mut self, v: Value) {
        match self {
            Self::Cbor(slot) => **slot = Some(v),
            _ => panic!("unpack: out-argument type mismatch for 'c'"),
        }
    }
}

type FmtIter<'f> = Peekable<Bytes<'f>>;
type ArgIter<'a, 'i> = core::slice::IterMut<'i, UnpackArg<'a>>;

fn type_mismatch() -> CborError {
    CborError::without_offset(ErrorCode::UnpackTypeMismatch)
}

fn next_arg<'a, 'i>(args: &mut ArgIter<'a, 'i>) -> &'i mut UnpackArg<'a> {
    args.next().expect("unpack: not enough out-arguments for format string")
}

fn map_find(entries: &[Value], key: &str) -> Option<Value> {
    for &e in entries {
        let (k, v) = e
            .as_map_element()
            .expect("map entries are always MapElement");
        if k.as_text_bytes() == Some(key.as_bytes()) {
            return Some(v);
        }
    }
    None
}

fn vunpack<'a>(
    alloc: &dyn CborAllocator,
    value: Value,
    fmt: &mut FmtIter<'_>,
    args: &mut ArgIter<'a, '_>,
) -> Result<(), CborError> {
    match fmt.next().expect("unpack: unexpected end of format string") {
        b'u' => {
            let v = value.as_uint().ok_or_else(type_mismatch)?;
            next_arg(args).write_uint(v);
            Ok(())
        }
        b'i' => {
            let v = value.as_i64().map_err(|_| type_mismatch())?;
            next_arg(args).write_sint(v);
            Ok(())
        }
        b'b' => {
            let bytes = value.as_bytes().ok_or_else(type_mismatch)?;
            let buf = copy_owned(alloc, bytes, false)
                .ok_or_else(|| CborError::without_offset(ErrorCode::AllocationFailed))?;
            next_arg(args).write_bytes(buf);
            Ok(())
        }
        b's' => {
            let bytes = value.as_text_bytes().ok_or_else(type_mismatch)?;
            let buf = copy_owned(alloc, bytes, true)
                .ok_or_else(|| CborError::without_offset(ErrorCode::AllocationFailed))?;
            next_arg(args).write_text(buf);
            Ok(())
        }
        b'[' => {
            let children = value.as_array().ok_or_else(type_mismatch)?;
            unpack_array(alloc, children, fmt, args)
        }
        b'{' => {
            let entries = value.as_map_entries().ok_or_else(type_mismatch)?;
            unpack_map(alloc, entries, fmt, args)
        }
        b't' => {
            let (tag, item) = value.as_tag().ok_or_else(type_mismatch)?;
            next_arg(args).write_tag(tag);
            vunpack(alloc, item, fmt, args)
        }
        b'c' => {
            next_arg(args).write_cbor(value);
            Ok(())
        }
        other => panic!("unpack: malformed format string, unknown token '{}'", other as char),
    }
}

fn unpack_array<'a>(
    alloc: &dyn CborAllocator,
    children: &[Value],
    fmt: &mut FmtIter<'_>,
    args: &mut ArgIter<'a, '_>,
) -> Result<(), CborError> {
    for &child in children {
        match fmt.peek() {
            Some(b']') => {
                fmt.next();
                return Ok(());
            }
            None => panic!("unpack: malformed format string, unterminated '['"),
            Some(_) => {}
        }
        vunpack(alloc, child, fmt, args)?;
    }
    match fmt.next() {
        Some(b']') => Ok(()),
        _ => Err(type_mismatch()),
    }
}

fn unpack_map<'a>(
    alloc: &dyn CborAllocator,
    entries: &[Value],
    fmt: &mut FmtIter<'_>,
    args: &mut ArgIter<'a, '_>,
) -> Result<(), CborError> {
    loop {
        match fmt.next() {
            Some(b'}') => return Ok(()),
            Some(b'S') => {
                let key = next_arg(args).expect_key();
                let found = map_find(entries, key)
                    .ok_or_else(|| CborError::without_offset(ErrorCode::UnpackKeyNotFound))?;
                vunpack(alloc, found, fmt, args)?;
            }
            None => panic!("unpack: malformed format string, unterminated '{{'"),
            Some(other) => panic!(
                "unpack: malformed format string, expected 'S' or '}}' inside '{{', got '{}'",
                other as char
            ),
        }
    }
}

/// Destructure `value` according to `fmt`, writing into `args`, per
/// `spec.md` §4.6.
///
/// # Errors
///
/// Returns `ErrorCode::UnpackTypeMismatch` if a value's variant doesn't
/// match its format token, `ErrorCode::UnpackKeyNotFound` if a `S`-prefixed
/// map lookup misses, or `ErrorCode::AllocationFailed` if a `b`/`s` token's
/// copy-out allocation fails. Outputs already written before a failure may
/// remain populated; the caller must still free any `OwnedBuf`s among them.
///
/// # Panics
///
/// Panics if `fmt` is malformed or doesn't match the shape of `args` —
/// these are programmer errors (`spec.md` §7).
pub fn unpack(
    alloc: &dyn CborAllocator,
    value: Value,
    fmt: &str,
    args: &mut [UnpackArg<'_>],
) -> Result<(), CborError> {
    let mut fmt_iter = fmt.bytes().peekable();
    let mut args_iter = args.iter_mut();
    vunpack(alloc, value, &mut fmt_iter, &mut args_iter)
}
