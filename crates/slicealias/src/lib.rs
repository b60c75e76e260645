//! slicealias core crate.
//!
//! Zero-copy reinterpretation of contiguous memory: install raw views at an
//! address, rescale a view to another element type, alias text as bytes and
//! back, and scan NUL-terminated strings. String aliasing is watched by the
//! mutation membrane in `slicealias-membrane`, which reports bytes that
//! change after they were promised immutable.

pub mod convert;
pub mod error;
pub mod strings;
pub mod view;

use std::ffi::c_char;

pub use convert::{convert_at, convert_to, convert_to_mut, convert_view, set_at, set_at_typed};
pub use error::{Extent, ShapeError, ViewError};
pub use slicealias_membrane::{
    MonitorConfig, MonitorContext, MutationViolation, SafetyMode, global_context,
};
pub use strings::{
    CChar, as_str, as_str_unchecked, of_c_string, of_str, of_str_unchecked, str_len,
};
pub use view::{ElemLayout, ErasedView, RawView, SlotKind, SlotRef};

/// C entrypoint for NUL-terminated length scanning.
///
/// Returns 0 for a null pointer. Also returns 0, with a warning logged, when
/// no terminator is found within `isize::MAX` bytes; C callers cannot tell
/// that case from an empty string by the return value alone.
///
/// # Safety
///
/// Non-null `s` must point to a readable NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn slicealias_strlen(s: *const c_char) -> usize {
    // SAFETY: forwarded to the caller.
    length_or_zero(unsafe { of_c_string(s) }.map(<[u8]>::len))
}

fn length_or_zero(scanned: Result<usize, ViewError>) -> usize {
    scanned.unwrap_or_else(|err| {
        tracing::warn!(%err, "slicealias_strlen found no terminator; returning 0");
        0
    })
}
