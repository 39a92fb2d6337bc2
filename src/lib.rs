//! # packcbor
//!
//! An allocator-parameterized CBOR (RFC 8949) value tree, codec, and
//! format-string pack/unpack mini-language.
//!
//! ## Design principles
//!
//! - **The allocator is a capability, not a global.** Every operation that
//!   builds or frees a [`Value`] takes a [`CborAllocator`] explicitly — the
//!   same tree must be built, read, and freed with the same allocator. This
//!   enables arena back ends, fault-injection testing, and multi-tenant
//!   isolation without depending on `#[global_allocator]`.
//! - **The value tree is a real sum type.** [`Value`] is an opaque handle
//!   into a [`ValueKind`]-discriminated tree; dispatch on it is an exhaustive
//!   match, never a runtime tag check with a fallback panic.
//! - **Decode and encode are definite-length only.** This crate implements
//!   the definite-length subset of RFC 8949: no indefinite-length strings,
//!   arrays, or maps, and no "break" byte.
//!
//! ## Feature flags
//!
//! - `std` *(default)*: implements `std::error::Error` for [`CborError`].
//! - `alloc` *(default)*: enables the allocation-backed API surface — the
//!   value tree, decoder, encoder, pack/unpack, and the pretty-printer.
//!
//! ## `no_std`
//!
//! The crate is `no_std` compatible with the `alloc` feature enabled,
//! requiring a `#[global_allocator]` from the embedding binary only insofar
//! as [`SystemAllocator`] is used; a custom [`CborAllocator`] impl needs no
//! global allocator at all.

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
#[path = "alloc.rs"]
mod allocator;
mod error;
mod limits;

#[cfg(feature = "alloc")]
mod decode;
#[cfg(feature = "alloc")]
mod encode;
#[cfg(feature = "alloc")]
mod pack;
#[cfg(feature = "alloc")]
mod print;
#[cfg(feature = "alloc")]
mod unpack;
#[cfg(feature = "alloc")]
mod value;

pub use crate::error::{CborError, ErrorCode};
pub use crate::limits::{DecodeLimits, DEFAULT_MAX_DEPTH};

#[cfg(feature = "alloc")]
pub use crate::allocator::{CborAllocator, SystemAllocator};
#[cfg(feature = "alloc")]
pub use crate::decode::{decode, decode_with_limits};
#[cfg(feature = "alloc")]
pub use crate::encode::{encode, encode_size};
#[cfg(feature = "alloc")]
pub use crate::pack::{pack, PackArg};
#[cfg(feature = "alloc")]
pub use crate::print::print;
#[cfg(feature = "alloc")]
pub use crate::unpack::{free_owned_buf, unpack, OwnedBuf, UnpackArg};
#[cfg(feature = "alloc")]
pub use crate::value::{
    free, value_eq, MapAppendError, Value, ValueKind, TAG_CBOR, TAG_DATETIME, TAG_UNIXTIME,
};
