//! The tagged CBOR value tree and its allocator-driven lifecycle.
//!
//! Grounded on `original_source/cbor.h` (the `struct cbor` tagged union and
//! its `cbor_make_*`/`cbor_free` entry points) and `original_source/alloc.c`.
//! Rendered here as a genuine Rust `enum` rather than a tagged union with a
//! separate discriminant byte — `spec.md` §9 asks for exactly this ("Sum
//! type... implementers should render it as a discriminated sum with an
//! exhaustive match at each dispatch site and no silent fall-through"), which
//! also makes "visiting an unknown discriminant is a programmer error and
//! aborts" (§4.2) unreachable by construction instead of a runtime check.
//!
//! # Why this is `unsafe` under the hood
//!
//! Every node and every owned buffer (byte string, text string, array of
//! children, map of elements) is obtained from the [`CborAllocator`] supplied
//! by the caller, not from `Box`/`Vec`'s fixed global allocator — that is the
//! whole point of making the allocator pluggable (arena back ends, fault
//! injection, multi-tenant isolation; see `spec.md` §9). Stable Rust has no
//! safe, general way to parameterize `Box`/`Vec` over an arbitrary allocator,
//! so the tree is built from raw pointers behind [`Value`], a small `Copy`
//! handle exactly analogous to the C `cbor*` pointer.
//!
//! A [`Value`] is therefore an opaque handle, not an owning Rust value: it
//! does not implement `Drop`, and using a handle after it has been passed to
//! [`free`] is as unsound as it was in the original — the caller's contract
//! (same allocator for every operation on a tree, never touch a value after
//! freeing it) is exactly `spec.md`'s "Allocator binding" and "Lifecycle"
//! invariants (§3), just not re-checked at compile time. Accessor methods
//! that borrow into a value's storage (`as_bytes`, `as_text`, `as_array`,
//! `as_map_entries`) tie the returned slice to `&self`'s borrow so a single
//! expression can't outlive the handle it came from, but they cannot protect
//! against freeing a tree while another handle to it is still held elsewhere
//! — the same contract the C original places on its callers.

use core::ptr::{self, NonNull};
use core::slice;

use crate::allocator::CborAllocator;
use crate::error::{CborError, ErrorCode};

/// CBOR tag for a standard date/time string (tag 0).
pub const TAG_DATETIME: u64 = 0;
/// CBOR tag for an integer Unix timestamp (tag 1).
pub const TAG_UNIXTIME: u64 = 1;
/// CBOR tag that self-describes a following item as CBOR (tag 55799).
pub const TAG_CBOR: u64 = 55799;

/// A minimal, allocator-parameterized growable buffer.
///
/// Does for an arbitrary `T` what the C original's hand-rolled
/// `realloc`-based growth (`cbor_array_append`, `cbor_map_append_element`)
/// does for `cbor**`: a pointer, a length, and a capacity, grown through the
/// same [`CborAllocator`] the tree around it was built with.
struct RawBuf<T> {
    ptr: Option<NonNull<T>>,
    len: usize,
    cap: usize,
}

impl<T> RawBuf<T> {
    const fn new() -> Self {
        Self {
            ptr: None,
            len: 0,
            cap: 0,
        }
    }

    fn with_capacity(alloc: &dyn CborAllocator, cap: usize) -> Option<Self> {
        if cap == 0 {
            return Some(Self::new());
        }
        let size = cap.checked_mul(core::mem::size_of::<T>())?;
        let raw = alloc.allocate(size)?;
        Some(Self {
            ptr: Some(raw.cast()),
            len: 0,
            cap,
        })
    }

    /// Copy `src` into a freshly allocated, fully-initialized buffer. Used
    /// for byte/text string constructors, which copy their input (`spec.md`
    /// §4.2).
    fn copy_from(alloc: &dyn CborAllocator, src: &[T]) -> Option<Self>
    where
        T: Copy,
    {
        let mut buf = Self::with_capacity(alloc, src.len())?;
        if let Some(ptr) = buf.ptr {
            // SAFETY: `ptr` has capacity for `src.len()` elements of `T`,
            // `src` is a disjoint, valid slice.
            unsafe { ptr::copy_nonoverlapping(src.as_ptr(), ptr.as_ptr(), src.len()) };
        }
        buf.len = src.len();
        Some(buf)
    }

    fn as_slice(&self) -> &[T] {
        match self.ptr {
            // SAFETY: `ptr` is valid for `len` initialized elements of `T`.
            Some(ptr) => unsafe { slice::from_raw_parts(ptr.as_ptr(), self.len) },
            None => &[],
        }
    }

    fn grow(&mut self, alloc: &dyn CborAllocator) -> Option<()> {
        let new_cap = if self.cap == 0 { 4 } else { self.cap.checked_mul(2)? };
        let elem = core::mem::size_of::<T>();
        let old_size = self.cap.checked_mul(elem)?;
        let new_size = new_cap.checked_mul(elem)?;
        let new_ptr = match self.ptr {
            Some(p) => alloc.reallocate(p.cast(), old_size, new_size)?,
            None => alloc.allocate(new_size)?,
        };
        self.ptr = Some(new_ptr.cast());
        self.cap = new_cap;
        Some(())
    }

    /// Append one element, growing (geometrically, like `Vec`) if needed.
    ///
    /// On failure the buffer is left unchanged and `value` is handed back to
    /// the caller, matching `spec.md` §4.2: "if growth fails, the container
    /// is unchanged and the new child is the caller's responsibility to
    /// free."
    fn push(&mut self, alloc: &dyn CborAllocator, value: T) -> Result<(), T> {
        if self.len == self.cap && self.grow(alloc).is_none() {
            return Err(value);
        }
        // SAFETY: `self.len < self.cap` after the check/grow above, so
        // `ptr + len` is in bounds of the allocation and not yet initialized.
        let ptr = self.ptr.expect("capacity implies an allocation");
        unsafe { ptr::write(ptr.as_ptr().add(self.len), value) };
        self.len += 1;
        Ok(())
    }

    fn free_storage(self, alloc: &dyn CborAllocator) {
        if let Some(ptr) = self.ptr {
            let size = self.cap * core::mem::size_of::<T>();
            alloc.deallocate(ptr.cast(), size);
        }
    }
}

enum Repr {
    UInt(u64),
    /// Negative form magnitude `m`; mathematical value is `-1 - m`.
    NInt(u64),
    Bytes(RawBuf<u8>),
    Text(RawBuf<u8>),
    Array(RawBuf<Value>),
    /// Children are always [`Repr::MapElement`] nodes.
    Map(RawBuf<Value>),
    MapElement(Value, Value),
    Tag(u64, Value),
    Null,
    Float32(f32),
    Float64(f64),
}

struct Node {
    repr: Repr,
}

/// The kind of a [`Value`], for introspection (mirrors `CBOR_*` in
/// `original_source/cbor.h`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Unsigned integer.
    UInt,
    /// Negative integer (negative-form magnitude).
    NInt,
    /// Byte string.
    Bytes,
    /// Text string.
    Text,
    /// Array.
    Array,
    /// Map.
    Map,
    /// A single map key/value pair; only ever a child of a [`ValueKind::Map`].
    MapElement,
    /// A tagged item.
    Tag,
    /// Null.
    Null,
    /// IEEE-754 single precision float.
    Float32,
    /// IEEE-754 double precision float.
    Float64,
}

/// A handle to a node in a CBOR value tree.
///
/// See the module documentation for the lifecycle contract this handle
/// carries: it is `Copy`, it is not itself owning in the Rust `Drop` sense,
/// and it must be passed to [`free`] (with the same allocator used to build
/// it) exactly once, after which no copy of it may be dereferenced again.
#[derive(Debug, Clone, Copy)]
pub struct Value(NonNull<Node>);

/// What [`Value::map_append`] still holds when it fails partway through
/// building `{key: value}` and appending it to a map.
///
/// `map` is unchanged in both variants — it is still a live handle the
/// caller already has a [`Copy`] of — but it is included here too so a
/// call site can free everything this call orphaned from a single match,
/// the same way [`free`] frees a whole tree from a single handle.
pub enum MapAppendError {
    /// [`Value::make_map_element`] itself failed to allocate: `key` and
    /// `value` were never adopted into an element and are each a separate
    /// orphaned handle the caller must free individually.
    ElementAllocFailed {
        /// The map, unchanged.
        map: Value,
        /// The key that was about to be inserted.
        key: Value,
        /// The value that was about to be inserted.
        value: Value,
    },
    /// The element was built but the map's backing buffer failed to grow
    /// to hold it: `elem` (a [`ValueKind::MapElement`] still owning `key`
    /// and `value`) is the single orphaned handle the caller must free.
    GrowFailed {
        /// The map, unchanged.
        map: Value,
        /// The orphaned element, still owning its key/value pair.
        elem: Value,
    },
}

fn alloc_node(alloc: &dyn CborAllocator, repr: Repr) -> Option<Value> {
    let raw = alloc.allocate(core::mem::size_of::<Node>())?;
    let ptr = raw.cast::<Node>();
    // SAFETY: `raw` is freshly allocated with room for a `Node` and is
    // suitably aligned per `CborAllocator`'s contract; nothing else
    // references it yet.
    unsafe { ptr::write(ptr.as_ptr(), Node { repr }) };
    Some(Value(ptr))
}

impl Value {
    /// Construct an unsigned-integer value.
    #[must_use]
    pub fn make_uint(alloc: &dyn CborAllocator, v: u64) -> Option<Self> {
        alloc_node(alloc, Repr::UInt(v))
    }

    /// Construct a negative-integer value from its wire-form magnitude `m`
    /// (mathematical value `-1 - m`).
    #[must_use]
    pub fn make_nint(alloc: &dyn CborAllocator, m: u64) -> Option<Self> {
        alloc_node(alloc, Repr::NInt(m))
    }

    /// Construct a signed-integer value, choosing [`ValueKind::UInt`] or
    /// [`ValueKind::NInt`] as appropriate. This is the constructor side of
    /// the signed-integer accessor (`spec.md` §4.2), and the one `pack`'s
    /// `i` token and the integer-sweep property (`spec.md` §8) use.
    #[must_use]
    pub fn make_sint(alloc: &dyn CborAllocator, v: i64) -> Option<Self> {
        if v >= 0 {
            Self::make_uint(alloc, v as u64)
        } else {
            // v < 0: magnitude m satisfies v == -1 - m, i.e. m == -1 - v.
            // Computed via wrapping ops to cover i64::MIN (`m == i64::MAX as u64 + 1`).
            let m = (-1i64).wrapping_sub(v) as u64;
            Self::make_nint(alloc, m)
        }
    }

    /// Construct a byte-string value, copying `bytes`.
    #[must_use]
    pub fn make_bytes(alloc: &dyn CborAllocator, bytes: &[u8]) -> Option<Self> {
        let buf = RawBuf::copy_from(alloc, bytes)?;
        alloc_node(alloc, Repr::Bytes(buf))
    }

    /// Construct a text-string value, copying `bytes` verbatim. No UTF-8
    /// validation is performed, per `spec.md` §3: "a decoded text string is
    /// whatever bytes were on the wire."
    #[must_use]
    pub fn make_text(alloc: &dyn CborAllocator, bytes: &[u8]) -> Option<Self> {
        let buf = RawBuf::copy_from(alloc, bytes)?;
        alloc_node(alloc, Repr::Text(buf))
    }

    /// Construct an empty array with room for `cap` children reserved
    /// up-front. Fill it with [`Value::array_append`].
    #[must_use]
    pub fn make_array(alloc: &dyn CborAllocator, cap: usize) -> Option<Self> {
        let buf = RawBuf::with_capacity(alloc, cap)?;
        alloc_node(alloc, Repr::Array(buf))
    }

    /// Append `item` to `array`, returning `array` again on success.
    ///
    /// On failure `array` is unchanged and `item` is returned to the caller
    /// for disposal (`spec.md` §4.2).
    ///
    /// # Panics
    ///
    /// Panics if `array` is not a [`ValueKind::Array`] — passing the wrong
    /// variant to a container mutator is a programmer error (`spec.md` §7).
    pub fn array_append(alloc: &dyn CborAllocator, array: Self, item: Self) -> Result<Self, Self> {
        // SAFETY: `array` is a live handle per the module's lifecycle
        // contract.
        let node = unsafe { array.0.as_ptr().as_mut() }.expect("non-null");
        let Repr::Array(buf) = &mut node.repr else {
            panic!("array_append: value is not an array");
        };
        buf.push(alloc, item).map(|()| array)
    }

    /// Construct an empty map with room for `cap` elements reserved
    /// up-front. Fill it with [`Value::map_append_element`] or
    /// [`Value::map_append`].
    #[must_use]
    pub fn make_map(alloc: &dyn CborAllocator, cap: usize) -> Option<Self> {
        let buf = RawBuf::with_capacity(alloc, cap)?;
        alloc_node(alloc, Repr::Map(buf))
    }

    /// Construct a single map key/value pair.
    #[must_use]
    pub fn make_map_element(alloc: &dyn CborAllocator, key: Self, value: Self) -> Option<Self> {
        alloc_node(alloc, Repr::MapElement(key, value))
    }

    /// Append a pre-built [`ValueKind::MapElement`] to `map`.
    ///
    /// # Panics
    ///
    /// Panics if `map` is not a [`ValueKind::Map`] or `elem` is not a
    /// [`ValueKind::MapElement`].
    pub fn map_append_element(alloc: &dyn CborAllocator, map: Self, elem: Self) -> Result<Self, Self> {
        assert!(
            matches!(elem.kind(), ValueKind::MapElement),
            "map_append_element: elem is not a map element"
        );
        // SAFETY: `map` is a live handle per the module's lifecycle contract.
        let node = unsafe { map.0.as_ptr().as_mut() }.expect("non-null");
        let Repr::Map(buf) = &mut node.repr else {
            panic!("map_append_element: value is not a map");
        };
        buf.push(alloc, elem).map(|()| map)
    }

    /// Build a map element from `key`/`value` and append it to `map` in one
    /// step.
    ///
    /// On failure, nothing is freed on the caller's behalf: `map` is
    /// unchanged but still a live handle, and [`MapAppendError`] carries
    /// back exactly the pieces this call itself allocated and did not
    /// adopt, so the caller can free all of it. See [`MapAppendError`]'s
    /// variants for which handles are orphaned in each failure case.
    pub fn map_append(
        alloc: &dyn CborAllocator,
        map: Self,
        key: Self,
        value: Self,
    ) -> Result<Self, MapAppendError> {
        let Some(elem) = Self::make_map_element(alloc, key, value) else {
            return Err(MapAppendError::ElementAllocFailed { map, key, value });
        };
        Self::map_append_element(alloc, map, elem).map_err(|elem| MapAppendError::GrowFailed { map, elem })
    }

    /// Construct a tagged value.
    #[must_use]
    pub fn make_tag(alloc: &dyn CborAllocator, tag: u64, item: Self) -> Option<Self> {
        alloc_node(alloc, Repr::Tag(tag, item))
    }

    /// Construct a null value.
    #[must_use]
    pub fn make_null(alloc: &dyn CborAllocator) -> Option<Self> {
        alloc_node(alloc, Repr::Null)
    }

    /// Construct a single-precision float value.
    #[must_use]
    pub fn make_float32(alloc: &dyn CborAllocator, f: f32) -> Option<Self> {
        alloc_node(alloc, Repr::Float32(f))
    }

    /// Construct a double-precision float value.
    #[must_use]
    pub fn make_float64(alloc: &dyn CborAllocator, d: f64) -> Option<Self> {
        alloc_node(alloc, Repr::Float64(d))
    }

    fn repr(&self) -> &Repr {
        // SAFETY: `self` is a live handle per the module's lifecycle
        // contract, valid for the duration of this borrow.
        unsafe { &self.0.as_ref().repr }
    }

    /// This value's variant.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self.repr() {
            Repr::UInt(_) => ValueKind::UInt,
            Repr::NInt(_) => ValueKind::NInt,
            Repr::Bytes(_) => ValueKind::Bytes,
            Repr::Text(_) => ValueKind::Text,
            Repr::Array(_) => ValueKind::Array,
            Repr::Map(_) => ValueKind::Map,
            Repr::MapElement(..) => ValueKind::MapElement,
            Repr::Tag(..) => ValueKind::Tag,
            Repr::Null => ValueKind::Null,
            Repr::Float32(_) => ValueKind::Float32,
            Repr::Float64(_) => ValueKind::Float64,
        }
    }

    /// The raw unsigned magnitude, if this is [`ValueKind::UInt`].
    #[must_use]
    pub fn as_uint(&self) -> Option<u64> {
        match self.repr() {
            Repr::UInt(v) => Some(*v),
            _ => None,
        }
    }

    /// The negative-form magnitude `m`, if this is [`ValueKind::NInt`].
    #[must_use]
    pub fn as_nint_magnitude(&self) -> Option<u64> {
        match self.repr() {
            Repr::NInt(m) => Some(*m),
            _ => None,
        }
    }

    /// The signed-integer accessor (`spec.md` §4.2): extracts a signed `i64`
    /// from either integer variant, the sole bridge between the two wire
    /// forms and normal signed arithmetic.
    ///
    /// # Errors
    ///
    /// Returns `ErrorCode::IntegerOutOfRange` if the magnitude does not fit:
    /// a `UInt` greater than `i64::MAX`, or an `NInt` whose magnitude `m`
    /// exceeds `i64::MAX` (which would make `-1 - m` underflow `i64::MIN`).
    pub fn as_i64(&self) -> Result<i64, CborError> {
        match self.repr() {
            Repr::UInt(u) if *u <= i64::MAX as u64 => Ok(*u as i64),
            Repr::NInt(m) if *m <= i64::MAX as u64 => Ok(-1i64 - (*m as i64)),
            _ => Err(CborError::without_offset(ErrorCode::IntegerOutOfRange)),
        }
    }

    /// This value's byte-string payload, if it is [`ValueKind::Bytes`].
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self.repr() {
            Repr::Bytes(buf) => Some(buf.as_slice()),
            _ => None,
        }
    }

    /// This value's text-string payload (raw, unvalidated bytes), if it is
    /// [`ValueKind::Text`].
    #[must_use]
    pub fn as_text_bytes(&self) -> Option<&[u8]> {
        match self.repr() {
            Repr::Text(buf) => Some(buf.as_slice()),
            _ => None,
        }
    }

    /// This value's children, if it is [`ValueKind::Array`].
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self.repr() {
            Repr::Array(buf) => Some(buf.as_slice()),
            _ => None,
        }
    }

    /// This value's map elements, if it is [`ValueKind::Map`]. Each element
    /// of the returned slice is a [`ValueKind::MapElement`].
    #[must_use]
    pub fn as_map_entries(&self) -> Option<&[Value]> {
        match self.repr() {
            Repr::Map(buf) => Some(buf.as_slice()),
            _ => None,
        }
    }

    /// The key/value pair, if this is a [`ValueKind::MapElement`].
    #[must_use]
    pub fn as_map_element(&self) -> Option<(Value, Value)> {
        match self.repr() {
            Repr::MapElement(k, v) => Some((*k, *v)),
            _ => None,
        }
    }

    /// The tag number and tagged item, if this is [`ValueKind::Tag`].
    #[must_use]
    pub fn as_tag(&self) -> Option<(u64, Value)> {
        match self.repr() {
            Repr::Tag(tag, item) => Some((*tag, *item)),
            _ => None,
        }
    }

    /// The payload, if this is [`ValueKind::Float32`].
    #[must_use]
    pub fn as_f32(&self) -> Option<f32> {
        match self.repr() {
            Repr::Float32(f) => Some(*f),
            _ => None,
        }
    }

    /// The payload, if this is [`ValueKind::Float64`].
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self.repr() {
            Repr::Float64(d) => Some(*d),
            _ => None,
        }
    }
}

/// Recursively free `value` and everything it owns, using `alloc` — which
/// must be the same allocator used to build every node in the tree
/// (`spec.md` §3, "Allocator binding").
///
/// Matches `original_source/alloc.c`'s `cbor_free`, rendered as an exhaustive
/// match over a real enum rather than a `switch` with an `abort()` default
/// case (`spec.md` §9, "Sum type").
pub fn free(alloc: &dyn CborAllocator, value: Value) {
    let ptr = value.0;
    // SAFETY: `value` is a live handle owning this node and everything
    // reachable from it, allocated by `alloc`; nothing else may reference it
    // afterward per the module's lifecycle contract.
    let node = unsafe { ptr::read(ptr.as_ptr()) };
    match node.repr {
        Repr::UInt(_) | Repr::NInt(_) | Repr::Null | Repr::Float32(_) | Repr::Float64(_) => {}
        Repr::Bytes(buf) | Repr::Text(buf) => buf.free_storage(alloc),
        Repr::Array(buf) | Repr::Map(buf) => {
            for &child in buf.as_slice() {
                free(alloc, child);
            }
            buf.free_storage(alloc);
        }
        Repr::MapElement(k, v) => {
            free(alloc, k);
            free(alloc, v);
        }
        Repr::Tag(_, item) => free(alloc, item),
    }
    alloc.deallocate(ptr.cast(), core::mem::size_of::<Node>());
}

/// Structural equality honoring `spec.md` §8's encode-then-decode law: the
/// two integer variants compare via their own magnitude (never across
/// variants, since a `UInt` and an `NInt` can never denote the same
/// mathematical value), floats compare bitwise, and containers compare
/// element-wise in order.
#[must_use]
pub fn value_eq(a: &Value, b: &Value) -> bool {
    match (a.repr(), b.repr()) {
        (Repr::UInt(x), Repr::UInt(y)) => x == y,
        (Repr::NInt(x), Repr::NInt(y)) => x == y,
        (Repr::Bytes(x), Repr::Bytes(y)) => x.as_slice() == y.as_slice(),
        (Repr::Text(x), Repr::Text(y)) => x.as_slice() == y.as_slice(),
        (Repr::Array(x), Repr::Array(y)) | (Repr::Map(x), Repr::Map(y)) => {
            let (xs, ys) = (x.as_slice(), y.as_slice());
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(a, b)| value_eq(a, b))
        }
        (Repr::MapElement(ka, va), Repr::MapElement(kb, vb)) => {
            value_eq(ka, kb) && value_eq(va, vb)
        }
        (Repr::Tag(ta, ia), Repr::Tag(tb, ib)) => ta == tb && value_eq(ia, ib),
        (Repr::Null, Repr::Null) => true,
        (Repr::Float32(x), Repr::Float32(y)) => x.to_bits() == y.to_bits(),
        (Repr::Float64(x), Repr::Float64(y)) => x.to_bits() == y.to_bits(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::SystemAllocator;

    #[test]
    fn uint_roundtrips_through_accessor() {
        let a = SystemAllocator;
        let v = Value::make_uint(&a, 42).unwrap();
        assert_eq!(v.kind(), ValueKind::UInt);
        assert_eq!(v.as_uint(), Some(42));
        assert_eq!(v.as_i64().unwrap(), 42);
        free(&a, v);
    }

    #[test]
    fn sint_negative_round_trips() {
        let a = SystemAllocator;
        for v in [-1i64, -24, -25, -256, i64::MIN, i64::MAX, 0] {
            let value = Value::make_sint(&a, v).unwrap();
            assert_eq!(value.as_i64().unwrap(), v);
            free(&a, value);
        }
    }

    #[test]
    fn array_append_builds_ordered_children() {
        let a = SystemAllocator;
        let arr = Value::make_array(&a, 0).unwrap();
        let mut arr = arr;
        for i in 0..5u64 {
            let item = Value::make_uint(&a, i).unwrap();
            arr = Value::array_append(&a, arr, item).unwrap();
        }
        let children: Vec<u64> = arr.as_array().unwrap().iter().map(|c| c.as_uint().unwrap()).collect();
        assert_eq!(children, vec![0, 1, 2, 3, 4]);
        free(&a, arr);
    }

    #[test]
    fn map_append_builds_elements() {
        let a = SystemAllocator;
        let map = Value::make_map(&a, 0).unwrap();
        let k = Value::make_text(&a, b"a").unwrap();
        let v = Value::make_uint(&a, 1).unwrap();
        let map = Value::map_append(&a, map, k, v).unwrap();
        assert_eq!(map.as_map_entries().unwrap().len(), 1);
        let (k, v) = map.as_map_entries().unwrap()[0].as_map_element().unwrap();
        assert_eq!(k.as_text_bytes(), Some(&b"a"[..]));
        assert_eq!(v.as_uint(), Some(1));
        free(&a, map);
    }

    /// Fails the `fail_at`-th allocation (1-indexed) and every one after;
    /// everything else forwards to [`SystemAllocator`]. Used to exercise
    /// `map_append`'s two distinct failure paths without needing the
    /// allocator-fault-injection machinery in `tests/`.
    struct FailAfter {
        calls: core::cell::Cell<usize>,
        fail_at: usize,
        inner: SystemAllocator,
    }

    impl CborAllocator for FailAfter {
        fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
            self.calls.set(self.calls.get() + 1);
            if self.calls.get() >= self.fail_at {
                return None;
            }
            self.inner.allocate(size)
        }

        fn reallocate(&self, ptr: NonNull<u8>, old_size: usize, new_size: usize) -> Option<NonNull<u8>> {
            self.calls.set(self.calls.get() + 1);
            if self.calls.get() >= self.fail_at {
                return None;
            }
            self.inner.reallocate(ptr, old_size, new_size)
        }

        fn deallocate(&self, ptr: NonNull<u8>, size: usize) {
            self.inner.deallocate(ptr, size);
        }
    }

    #[test]
    fn map_append_element_alloc_failure_returns_map_key_and_value_for_freeing() {
        let a = SystemAllocator;
        let map = Value::make_map(&a, 0).unwrap();
        let key = Value::make_uint(&a, 1).unwrap();
        let val = Value::make_uint(&a, 2).unwrap();

        // `map_append`'s first allocation is `make_map_element`'s node; fail
        // exactly that one.
        let fail_after = FailAfter {
            calls: core::cell::Cell::new(0),
            fail_at: 1,
            inner: SystemAllocator,
        };
        match Value::map_append(&fail_after, map, key, val) {
            Err(MapAppendError::ElementAllocFailed { map, key, value }) => {
                free(&a, key);
                free(&a, value);
                free(&a, map);
            }
            _ => panic!("expected ElementAllocFailed"),
        }
    }

    #[test]
    fn map_append_grow_failure_returns_map_and_element_for_freeing() {
        let a = SystemAllocator;
        let map = Value::make_map(&a, 0).unwrap();
        let key = Value::make_uint(&a, 1).unwrap();
        let val = Value::make_uint(&a, 2).unwrap();

        // Let the element's own node allocate (call #1), then fail the
        // map's backing-buffer growth (call #2).
        let fail_after = FailAfter {
            calls: core::cell::Cell::new(0),
            fail_at: 2,
            inner: SystemAllocator,
        };
        match Value::map_append(&fail_after, map, key, val) {
            Err(MapAppendError::GrowFailed { map, elem }) => {
                free(&a, elem);
                free(&a, map);
            }
            _ => panic!("expected GrowFailed"),
        }
    }

    #[test]
    fn value_eq_compares_structurally() {
        let a = SystemAllocator;
        let x = Value::make_sint(&a, -5).unwrap();
        let y = Value::make_sint(&a, -5).unwrap();
        assert!(value_eq(&x, &y));
        free(&a, x);
        free(&a, y);
    }
}
