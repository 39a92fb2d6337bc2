//! Format-string–driven variadic builder: a CBOR value tree from a terse
//! token grammar and a flat slice of arguments.
//!
//! Grounded on `original_source/pack.c`'s `cbor_vpack`/`cbor_pack`, which
//! drive a C `va_list` recursively through the format string. Rust has no
//! variadic functions, so the `va_list` is replaced by an ordinary slice of
//! [`PackArg`] — a tagged union of the argument shapes the format string's
//! tokens can consume — walked with an iterator the same way the source
//! walks `va_list` one `va_arg` at a time.
//!
//! The `d` token constructs a [`crate::value::Value::make_float64`], not
//! the source's `(float)va_arg(..., double)` (`spec.md` §9's noted bug,
//! which narrows a double to a `Float32`).

use core::iter::Peekable;
use core::str::Bytes;

use crate::allocator::CborAllocator;
use crate::value::{self, Value};

/// One argument consumed by a [`pack`] format token.
///
/// Each variant corresponds to exactly the tokens in `spec.md` §4.5 that
/// read a value from the caller: `u`/`i`/`b`/`s`/`t`/`f`/`d`/`c`. Container
/// tokens (`[`, `{`) and `N` read no argument of their own.
#[derive(Clone, Copy)]
pub enum PackArg<'a> {
    /// Argument for `u`: a 64-bit unsigned magnitude.
    Uint(u64),
    /// Argument for `i`: a signed 64-bit value.
    Sint(i64),
    /// Argument for `b`: a byte string to copy.
    Bytes(&'a [u8]),
    /// Argument for `s`: a text string to copy (not validated as UTF-8).
    Text(&'a [u8]),
    /// The tag number argument that precedes a `t` token's child token.
    Tag(u64),
    /// Argument for `f`: promoted to an `f32`.
    Float(f64),
    /// Argument for `d`: stored at full `f64` width.
    Double(f64),
    /// Argument for `c`: an existing subtree adopted by reference, not
    /// copied. Ownership transfers to the enclosing tree.
    Cbor(Value),
}

type FmtIter<'f> = Peekable<Bytes<'f>>;
type ArgIter<'a, 'i> = core::slice::Iter<'i, PackArg<'a>>;

fn next_arg<'a>(args: &mut ArgIter<'a, '_>) -> PackArg<'a> {
    *args.next().expect("pack: not enough arguments for format string")
}

fn expect_uint(args: &mut ArgIter<'_, '_>) -> u64 {
    match next_arg(args) {
        PackArg::Uint(v) => v,
        _ => panic!("pack: argument type mismatch for 'u'"),
    }
}

fn expect_sint(args: &mut ArgIter<'_, '_>) -> i64 {
    match next_arg(args) {
        PackArg::Sint(v) => v,
        _ => panic!("pack: argument type mismatch for 'i'"),
    }
}

fn expect_bytes<'a>(args: &mut ArgIter<'a, '_>) -> &'a [u8] {
    match next_arg(args) {
        PackArg::Bytes(b) => b,
        _ => panic!("pack: argument type mismatch for 'b'"),
    }
}

fn expect_text<'a>(args: &mut ArgIter<'a, '_>) -> &'a [u8] {
    match next_arg(args) {
        PackArg::Text(s) => s,
        _ => panic!("pack: argument type mismatch for 's'"),
    }
}

fn expect_tag(args: &mut ArgIter<'_, '_>) -> u64 {
    match next_arg(args) {
        PackArg::Tag(t) => t,
        _ => panic!("pack: argument type mismatch for 't'"),
    }
}

fn expect_float(args: &mut ArgIter<'_, '_>) -> f64 {
    match next_arg(args) {
        PackArg::Float(f) => f,
        _ => panic!("pack: argument type mismatch for 'f'"),
    }
}

fn expect_double(args: &mut ArgIter<'_, '_>) -> f64 {
    match next_arg(args) {
        PackArg::Double(d) => d,
        _ => panic!("pack: argument type mismatch for 'd'"),
    }
}

fn expect_cbor(args: &mut ArgIter<'_, '_>) -> Value {
    match next_arg(args) {
        PackArg::Cbor(v) => v,
        _ => panic!("pack: argument type mismatch for 'c'"),
    }
}

fn next_token(fmt: &mut FmtIter<'_>) -> u8 {
    fmt.next()
        .expect("pack: unexpected end of format string")
}

fn vpack<'a>(
    alloc: &dyn CborAllocator,
    fmt: &mut FmtIter<'_>,
    args: &mut ArgIter<'a, '_>,
) -> Option<Value> {
    match next_token(fmt) {
        b'u' => Value::make_uint(alloc, expect_uint(args)),
        b'i' => Value::make_sint(alloc, expect_sint(args)),
        b'b' => Value::make_bytes(alloc, expect_bytes(args)),
        b's' => Value::make_text(alloc, expect_text(args)),
        b'[' => pack_array(alloc, fmt, args),
        b'{' => pack_map(alloc, fmt, args),
        b't' => pack_tag(alloc, fmt, args),
        b'N' => Value::make_null(alloc),
        #[allow(clippy::cast_possible_truncation)]
        b'f' => Value::make_float32(alloc, expect_float(args) as f32),
        b'd' => Value::make_float64(alloc, expect_double(args)),
        b'c' => Some(expect_cbor(args)),
        other => panic!("pack: malformed format string, unknown token '{}'", other as char),
    }
}

fn pack_array<'a>(
    alloc: &dyn CborAllocator,
    fmt: &mut FmtIter<'_>,
    args: &mut ArgIter<'a, '_>,
) -> Option<Value> {
    let mut arr = Value::make_array(alloc, 0)?;
    loop {
        match fmt.peek() {
            Some(b']') => {
                fmt.next();
                return Some(arr);
            }
            None => panic!("pack: malformed format string, unterminated '['"),
            Some(_) => {}
        }
        let Some(item) = vpack(alloc, fmt, args) else {
            value::free(alloc, arr);
            return None;
        };
        arr = match Value::array_append(alloc, arr, item) {
            Ok(a) => a,
            Err(item) => {
                value::free(alloc, item);
                value::free(alloc, arr);
                return None;
            }
        };
    }
}

fn pack_map<'a>(
    alloc: &dyn CborAllocator,
    fmt: &mut FmtIter<'_>,
    args: &mut ArgIter<'a, '_>,
) -> Option<Value> {
    let mut map = Value::make_map(alloc, 0)?;
    loop {
        match fmt.peek() {
            Some(b'}') => {
                fmt.next();
                return Some(map);
            }
            None => panic!("pack: malformed format string, unterminated '{{'"),
            Some(_) => {}
        }
        let Some(key) = vpack(alloc, fmt, args) else {
            value::free(alloc, map);
            return None;
        };
        let Some(value) = vpack(alloc, fmt, args) else {
            value::free(alloc, key);
            value::free(alloc, map);
            return None;
        };
        map = match Value::map_append(alloc, map, key, value) {
            Ok(m) => m,
            Err(value::MapAppendError::ElementAllocFailed { map, key, value: val }) => {
                value::free(alloc, key);
                value::free(alloc, val);
                value::free(alloc, map);
                return None;
            }
            Err(value::MapAppendError::GrowFailed { map, elem }) => {
                value::free(alloc, elem);
                value::free(alloc, map);
                return None;
            }
        };
    }
}

fn pack_tag<'a>(
    alloc: &dyn CborAllocator,
    fmt: &mut FmtIter<'_>,
    args: &mut ArgIter<'a, '_>,
) -> Option<Value> {
    let tag = expect_tag(args);
    let item = vpack(alloc, fmt, args)?;
    match Value::make_tag(alloc, tag, item) {
        Some(v) => Some(v),
        None => {
            value::free(alloc, item);
            None
        }
    }
}

/// Build a value tree from `fmt` and `args`, per `spec.md` §4.5.
///
/// Returns `None` on allocation failure anywhere in the tree; any subtree
/// already built is freed before returning.
///
/// # Panics
///
/// Panics if `fmt` is malformed (an unknown token or an unmatched `[`/`{`)
/// or if `args` doesn't match what `fmt` consumes — these are programmer
/// errors, not runtime conditions (`spec.md` §7).
#[must_use]
pub fn pack<'a>(alloc: &dyn CborAllocator, fmt: &str, args: &[PackArg<'a>]) -> Option<Value> {
    let mut fmt_iter = fmt.bytes().peekable();
    let mut args_iter = args.iter();
    vpack(alloc, &mut fmt_iter, &mut args_iter)
}
