//! Text aliasing and NUL-terminated string scanning.
//!
//! `of_str` and `as_str` flip between text and bytes without copying. The
//! aliased range is handed to the [`MonitorContext`], which checksums it and
//! reports a fatal violation if the bytes are later found to have changed.
//! C strings are foreign memory and are never monitored.

use slicealias_membrane::{ByteRange, MonitorContext};

use crate::error::ViewError;

/// Alias text as its bytes.
pub fn of_str(ctx: &MonitorContext, s: &'static str) -> &'static [u8] {
    let bytes = s.as_bytes();
    ctx.monitor_static(bytes);
    bytes
}

/// Alias borrowed text as its bytes.
///
/// # Safety
///
/// The bytes must never be written again and must stay readable, even after
/// `'a` ends, until a later `flush_pending` on `ctx` has returned or `ctx`
/// and every clone of it have been dropped.
pub unsafe fn of_str_unchecked<'a>(ctx: &MonitorContext, s: &'a str) -> &'a [u8] {
    let bytes = s.as_bytes();
    // SAFETY: forwarded to the caller.
    unsafe { ctx.monitor(ByteRange::from_slice(bytes)) };
    bytes
}

fn validate<'a>(op: &'static str, bytes: &'a [u8]) -> Result<&'a str, ViewError> {
    std::str::from_utf8(bytes).map_err(|err| ViewError::InvalidUtf8 {
        op,
        valid_up_to: err.valid_up_to(),
    })
}

/// Alias bytes as text, validating UTF-8 in place.
///
/// # Errors
///
/// [`ViewError::InvalidUtf8`] if `bytes` is not UTF-8. Nothing is monitored
/// in that case.
pub fn as_str(ctx: &MonitorContext, bytes: &'static [u8]) -> Result<&'static str, ViewError> {
    let text = validate("as_str", bytes)?;
    ctx.monitor_static(bytes);
    Ok(text)
}

/// Alias borrowed bytes as text, validating UTF-8 in place.
///
/// # Errors
///
/// As [`as_str`].
///
/// # Safety
///
/// As [`of_str_unchecked`].
pub unsafe fn as_str_unchecked<'a>(
    ctx: &MonitorContext,
    bytes: &'a [u8],
) -> Result<&'a str, ViewError> {
    let text = validate("as_str_unchecked", bytes)?;
    // SAFETY: forwarded to the caller.
    unsafe { ctx.monitor(ByteRange::from_slice(bytes)) };
    Ok(text)
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for i8 {}
    impl Sealed for u8 {}
}

/// A byte-wide C character type.
pub trait CChar: sealed::Sealed + Copy + PartialEq + Default {}

impl CChar for i8 {}
impl CChar for u8 {}

/// Number of elements before the first zero (`T::default()`) element.
///
/// # Errors
///
/// [`ViewError::CountOverflow`] if no terminator is found within
/// `isize::MAX` bytes.
///
/// # Safety
///
/// `p` must be non-null, aligned, and point to readable elements up to and
/// including a terminator.
pub unsafe fn str_len<T: PartialEq + Default>(p: *const T) -> Result<usize, ViewError> {
    let zero = T::default();
    let limit = isize::MAX as usize / size_of::<T>().max(1);
    let mut n = 0usize;
    // SAFETY: every element up to the terminator is readable.
    while unsafe { &*p.add(n) } != &zero {
        n += 1;
        if n > limit {
            return Err(ViewError::CountOverflow {
                op: "str_len",
                what: "string length",
                count: n as u128,
            });
        }
    }
    Ok(n)
}

/// Alias a NUL-terminated C string as bytes, excluding the terminator.
///
/// A null pointer yields an empty slice.
///
/// # Errors
///
/// As [`str_len`].
///
/// # Safety
///
/// Non-null `p` must satisfy [`str_len`], and the bytes must stay readable
/// and unmodified for `'a`.
pub unsafe fn of_c_string<'a, T: CChar>(p: *const T) -> Result<&'a [u8], ViewError> {
    if p.is_null() {
        return Ok(&[]);
    }
    // SAFETY: forwarded to the caller.
    let n = unsafe { str_len(p) }?;
    // SAFETY: `T` is byte-sized and `n` elements precede the terminator.
    Ok(unsafe { std::slice::from_raw_parts(p.cast::<u8>(), n) })
}
