//! Structured decode/encode errors.
//!
//! A stable, string-free `ErrorCode` plus a `CborError{code, offset}` wrapper
//! with `Display` and (under `std`) `std::error::Error`. Programmer errors
//! (malformed pack/unpack format strings, an unreachable variant dispatch) are
//! not represented here; per `spec.md` §7 they `panic!` rather than returning
//! a value, since they are bugs rather than runtime conditions.

use core::fmt;

/// A structured error code identifying why a decode, encode, or unpack call
/// failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCode {
    /// Unexpected end of input while decoding.
    UnexpectedEof,
    /// A decoded length would overflow the platform's `usize`.
    LengthOverflow,
    /// The initial byte did not match any CBOR major type this codec
    /// understands (no indefinite-length items, no simple values other than
    /// null and the three float widths).
    UnsupportedInitialByte,
    /// Memory allocation failed.
    AllocationFailed,
    /// Nesting depth limit exceeded while decoding.
    DepthLimitExceeded,
    /// A declared array/map/byte-string/text-string length exceeded
    /// [`crate::DecodeLimits::max_container_len`].
    ContainerTooLarge,

    /// The destination buffer passed to `encode` was too small.
    BufferTooSmall,

    /// An integer variant's magnitude does not fit in a signed 64-bit value.
    IntegerOutOfRange,

    /// `unpack` encountered a value whose variant did not match the format
    /// token (`u`, `i`, `b`, `s`, `[`, `{`, `t`).
    UnpackTypeMismatch,
    /// `unpack` looked up a map key (`S`) that is not present.
    UnpackKeyNotFound,
}

impl ErrorCode {
    const fn message(self) -> &'static str {
        match self {
            Self::UnexpectedEof => "unexpected end of input",
            Self::LengthOverflow => "length overflow",
            Self::UnsupportedInitialByte => "unsupported CBOR initial byte",
            Self::AllocationFailed => "allocation failed",
            Self::DepthLimitExceeded => "nesting depth limit exceeded",
            Self::ContainerTooLarge => "declared length exceeds the configured container length limit",
            Self::BufferTooSmall => "destination buffer too small",
            Self::IntegerOutOfRange => "integer does not fit in a signed 64-bit value",
            Self::UnpackTypeMismatch => "unpack: value does not match format token",
            Self::UnpackKeyNotFound => "unpack: map key not found",
        }
    }
}

/// An error with a stable [`ErrorCode`] and the byte offset at which it was
/// detected (`0` when the offset is not meaningful, e.g. encode-side errors).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CborError {
    /// The error code.
    pub code: ErrorCode,
    /// Byte offset into the input where the error was detected.
    pub offset: usize,
}

impl CborError {
    /// Construct an error at `offset`.
    #[must_use]
    pub const fn new(code: ErrorCode, offset: usize) -> Self {
        Self { code, offset }
    }

    /// Construct an error with no meaningful offset (e.g. on the encode
    /// side, or for allocation failures not tied to an input position).
    #[must_use]
    pub const fn without_offset(code: ErrorCode) -> Self {
        Self { code, offset: 0 }
    }
}

impl fmt::Display for CborError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cbor error at byte {}: {}", self.offset, self.code.message())
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CborError {}
