//! Installing and reinterpreting views.
//!
//! Every operation here checks the same contract before touching the
//! destination: the slot must be a view slot, byte extents must divide evenly
//! into destination elements, counts must fit in `isize`, and a non-empty
//! target address must be aligned for the destination element. Violations
//! are returned as [`ViewError`] and the destination is left untouched.

use bytemuck::Pod;
use tracing::trace;

use crate::error::{Extent, ShapeError, ViewError};
use crate::view::{ElemLayout, ErasedView, RawView, SlotRef};

/// Largest element count (and byte count) a view may describe.
const MAX_EXTENT: usize = isize::MAX as usize;

fn view_elem(op: &'static str, dst: &SlotRef<'_>) -> Result<ElemLayout, ViewError> {
    dst.elem()
        .map_err(|found| ViewError::InvalidDestinationType { op, found })
}

fn check_align(
    op: &'static str,
    addr: usize,
    count: usize,
    elem: ElemLayout,
) -> Result<(), ViewError> {
    if count > 0 && addr % elem.align != 0 {
        return Err(ViewError::ShapeMismatch {
            op,
            shape: ShapeError::Misaligned {
                addr,
                dst_type: elem.name,
                align: elem.align,
            },
        });
    }
    Ok(())
}

/// Byte size of `count` elements of `elem`, bounded by `isize::MAX`.
fn byte_extent(
    op: &'static str,
    what: &'static str,
    count: usize,
    elem: ElemLayout,
) -> Result<usize, ViewError> {
    match count.checked_mul(elem.size) {
        Some(bytes) if bytes <= MAX_EXTENT => Ok(bytes),
        _ => Err(ViewError::CountOverflow {
            op,
            what,
            count: count as u128 * elem.size as u128,
        }),
    }
}

/// Number of `dst` elements that exactly cover `bytes`.
fn element_count(
    op: &'static str,
    extent: Extent,
    bytes: usize,
    dst: ElemLayout,
) -> Result<usize, ViewError> {
    if bytes % dst.size != 0 {
        return Err(ViewError::ShapeMismatch {
            op,
            shape: ShapeError::NotMultiple {
                extent,
                bytes,
                dst_type: dst.name,
                dst_elem_size: dst.size,
            },
        });
    }
    let count = bytes / dst.size;
    if count > MAX_EXTENT {
        return Err(ViewError::CountOverflow {
            op,
            what: match extent {
                Extent::Length => "dst length",
                Extent::Capacity => "dst capacity",
            },
            count: count as u128,
        });
    }
    Ok(count)
}

fn check_dst_size(op: &'static str, dst: ElemLayout) -> Result<(), ViewError> {
    if dst.size == 0 {
        return Err(ViewError::ShapeMismatch {
            op,
            shape: ShapeError::ZeroSizedElement { dst_type: dst.name },
        });
    }
    Ok(())
}

/// Rescale one extent of `src` to a count of `dst` elements.
fn rescale(
    op: &'static str,
    extent: Extent,
    count: usize,
    src: ElemLayout,
    dst: ElemLayout,
) -> Result<usize, ViewError> {
    let bytes = count.checked_mul(src.size).ok_or(ViewError::CountOverflow {
        op,
        what: match extent {
            Extent::Length => "src length in bytes",
            Extent::Capacity => "src capacity in bytes",
        },
        count: count as u128 * src.size as u128,
    })?;
    element_count(op, extent, bytes, dst)
}

/// Destination (len, cap) for reinterpreting `src` as `dst` elements.
fn reshape(op: &'static str, src: &ErasedView, dst: ElemLayout) -> Result<(usize, usize), ViewError> {
    check_dst_size(op, dst)?;
    let cap = rescale(op, Extent::Capacity, src.cap, src.elem, dst)?;
    let len = rescale(op, Extent::Length, src.len, src.elem, dst)?;
    check_align(op, src.addr as usize, cap, dst)?;
    Ok((len, cap))
}

/// Point the view in `dst` at `n` elements starting at `p`.
///
/// The slot ends up with length and capacity `n`. It is cleared before the
/// new header is written.
///
/// # Errors
///
/// [`ViewError::InvalidDestinationType`] for a value slot,
/// [`ViewError::CountOverflow`] if `n` elements span more than `isize::MAX`
/// bytes, [`ViewError::ShapeMismatch`] if `p` is misaligned for the element.
///
/// # Safety
///
/// `p` must address `n` contiguous initialized elements of the slot's element
/// type for as long as the installed view is read.
pub unsafe fn set_at(dst: SlotRef<'_>, p: *mut u8, n: usize) -> Result<(), ViewError> {
    const OP: &str = "set_at";
    let elem = view_elem(OP, &dst)?;
    byte_extent(OP, "element count in bytes", n, elem)?;
    check_align(OP, p as usize, n, elem)?;
    trace!(addr = p as usize, n, elem = elem.name, "set_at");
    dst.install(p, n, n);
    Ok(())
}

/// Typed form of [`set_at`].
///
/// # Errors
///
/// As [`set_at`], minus the destination type check.
///
/// # Safety
///
/// As [`set_at`].
pub unsafe fn set_at_typed<T>(dst: &mut RawView<T>, p: *mut T, n: usize) -> Result<(), ViewError> {
    // SAFETY: forwarded to the caller.
    unsafe { set_at(SlotRef::view(dst), p.cast(), n) }
}

/// Reinterpret `src` in place as the element type of the view in `dst`.
///
/// The address is shared. Length and capacity are rescaled so that
/// `dst.len * size_of::<D>() == src.len * size_of::<S>()`, and likewise for
/// capacity.
///
/// # Errors
///
/// [`ViewError::InvalidDestinationType`] for a value slot. A
/// [`ViewError::ShapeMismatch`] when either byte extent is not a multiple of
/// the destination element size, the destination element is zero-sized, or
/// the address is misaligned for it. [`ViewError::CountOverflow`] when an
/// extent does not fit in `isize`.
///
/// # Safety
///
/// Every bit pattern of the source bytes must be a valid destination
/// element for as long as the installed view is read.
pub unsafe fn convert_at(dst: SlotRef<'_>, src: &ErasedView) -> Result<(), ViewError> {
    const OP: &str = "convert_at";
    let elem = view_elem(OP, &dst)?;
    let (len, cap) = reshape(OP, src, elem)?;
    trace!(
        addr = src.addr as usize,
        from = src.elem.name,
        to = elem.name,
        len,
        cap,
        "convert_at"
    );
    dst.install(src.addr, len, cap);
    Ok(())
}

/// Reinterpret a typed view, returning the new header.
///
/// Building the header is safe; reading through it carries the obligations
/// of [`RawView::as_slice`] plus bit validity of `D`.
///
/// # Errors
///
/// As [`convert_at`], minus the destination type check.
pub fn convert_view<D, S>(src: &RawView<S>) -> Result<RawView<D>, ViewError> {
    let (len, cap) = reshape("convert_view", &src.erase(), ElemLayout::of::<D>())?;
    // SAFETY: `reshape` returns len <= cap whenever src.len <= src.cap.
    Ok(unsafe { RawView::from_raw_parts(src.as_ptr().cast(), len, cap) })
}

/// Destination length for a slice, which has no spare capacity.
fn slice_len<S>(op: &'static str, ptr: *const S, len: usize, dst: ElemLayout) -> Result<usize, ViewError> {
    check_dst_size(op, dst)?;
    let len = rescale(op, Extent::Length, len, ElemLayout::of::<S>(), dst)?;
    check_align(op, ptr as usize, len, dst)?;
    Ok(len)
}

/// Reinterpret a slice of plain-old-data as another plain-old-data type.
///
/// # Errors
///
/// As [`convert_at`], with only the length extent involved.
pub fn convert_to<D: Pod, S: Pod>(src: &[S]) -> Result<&[D], ViewError> {
    let len = slice_len("convert_to", src.as_ptr(), src.len(), ElemLayout::of::<D>())?;
    if len == 0 {
        return Ok(&[]);
    }
    // SAFETY: the byte extent is unchanged, alignment was checked, and any
    // bit pattern is a valid `D`.
    Ok(unsafe { std::slice::from_raw_parts(src.as_ptr().cast::<D>(), len) })
}

/// Mutable form of [`convert_to`].
///
/// # Errors
///
/// As [`convert_to`].
pub fn convert_to_mut<D: Pod, S: Pod>(src: &mut [S]) -> Result<&mut [D], ViewError> {
    let len = slice_len("convert_to_mut", src.as_ptr(), src.len(), ElemLayout::of::<D>())?;
    if len == 0 {
        return Ok(&mut []);
    }
    // SAFETY: as `convert_to`; the unique borrow of `src` moves to the result.
    Ok(unsafe { std::slice::from_raw_parts_mut(src.as_mut_ptr().cast::<D>(), len) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_at_installs_header() {
        let mut buf = [1u32, 2, 3, 4];
        let mut view = RawView::<u32>::empty();
        // SAFETY: `buf` outlives `view`'s reads.
        unsafe { set_at_typed(&mut view, buf.as_mut_ptr(), 3) }.unwrap();
        assert_eq!(view.len(), 3);
        assert_eq!(view.capacity(), 3);
        assert_eq!(unsafe { view.as_slice() }, &[1, 2, 3]);
    }

    #[test]
    fn set_at_rejects_value_slot() {
        let mut not_a_view = 0u64;
        let err = unsafe { set_at(SlotRef::value(&mut not_a_view), std::ptr::null_mut(), 0) }
            .unwrap_err();
        assert_eq!(
            err,
            ViewError::InvalidDestinationType {
                op: "set_at",
                found: "u64"
            }
        );
        assert_eq!(not_a_view, 0);
    }

    #[test]
    fn set_at_rejects_byte_overflow() {
        let mut view = RawView::<u64>::empty();
        let err = unsafe { set_at_typed(&mut view, std::ptr::dangling_mut(), usize::MAX / 4) }
            .unwrap_err();
        assert!(matches!(err, ViewError::CountOverflow { op: "set_at", .. }));
        assert_eq!(view, RawView::empty());
    }

    #[test]
    fn set_at_rejects_misaligned() {
        let mut buf = [0u64; 2];
        let odd = buf.as_mut_ptr().cast::<u8>().wrapping_add(1);
        let mut view = RawView::<u64>::empty();
        let err = unsafe { set_at(SlotRef::view(&mut view), odd, 1) }.unwrap_err();
        assert!(matches!(
            err,
            ViewError::ShapeMismatch {
                shape: ShapeError::Misaligned { align: 8, .. },
                ..
            }
        ));
    }

    #[test]
    fn set_at_zero_count_ignores_alignment() {
        let mut view = RawView::<u64>::empty();
        unsafe { set_at(SlotRef::view(&mut view), std::ptr::without_provenance_mut(1), 0) }.unwrap();
        assert!(view.is_empty());
    }

    #[test]
    fn convert_view_rescales_both_extents() {
        let mut words = Vec::<u32>::with_capacity(8);
        words.extend_from_slice(&[0x0102_0304, 0x0506_0708]);
        let src = unsafe { RawView::from_raw_parts(words.as_mut_ptr(), 2, 8) };
        let bytes: RawView<u8> = convert_view(&src).unwrap();
        assert_eq!(bytes.len(), 8);
        assert_eq!(bytes.capacity(), 32);
        assert_eq!(bytes.as_ptr().cast::<u32>(), words.as_mut_ptr());
    }

    #[test]
    fn convert_view_names_capacity_first() {
        let mut raw = [0u8; 6];
        let src = unsafe { RawView::from_raw_parts(raw.as_mut_ptr(), 4, 6) };
        let err = convert_view::<u32, u8>(&src).unwrap_err();
        assert_eq!(
            err,
            ViewError::ShapeMismatch {
                op: "convert_view",
                shape: ShapeError::NotMultiple {
                    extent: Extent::Capacity,
                    bytes: 6,
                    dst_type: "u32",
                    dst_elem_size: 4,
                },
            }
        );
    }

    #[test]
    fn convert_view_rejects_zero_sized_dst() {
        let data = [1u8];
        let err = convert_view::<(), u8>(&RawView::from_slice(&data)).unwrap_err();
        assert!(matches!(
            err,
            ViewError::ShapeMismatch {
                shape: ShapeError::ZeroSizedElement { dst_type: "()" },
                ..
            }
        ));
    }

    #[test]
    fn convert_view_rejects_dst_count_overflow() {
        let src = unsafe { RawView::<u64>::from_raw_parts(std::ptr::dangling_mut(), 0, usize::MAX / 8) };
        let err = convert_view::<u8, u64>(&src).unwrap_err();
        assert!(matches!(
            err,
            ViewError::CountOverflow {
                what: "dst capacity",
                ..
            }
        ));
    }

    #[test]
    fn convert_view_rejects_src_byte_overflow() {
        let src = unsafe { RawView::<u64>::from_raw_parts(std::ptr::dangling_mut(), 0, usize::MAX) };
        let err = convert_view::<u8, u64>(&src).unwrap_err();
        assert!(matches!(
            err,
            ViewError::CountOverflow {
                what: "src capacity in bytes",
                ..
            }
        ));
    }

    #[test]
    fn convert_to_slices() {
        let words = [0x1122_3344u32, 0x5566_7788];
        let bytes: &[u8] = convert_to(&words).unwrap();
        assert_eq!(bytes.len(), 8);
        assert_eq!(bytes.as_ptr(), words.as_ptr().cast());
        let back: &[u32] = convert_to(bytes).unwrap();
        assert_eq!(back, &words);
    }

    #[test]
    fn convert_to_mut_writes_through() {
        let mut words = [0u32; 2];
        let bytes: &mut [u8] = convert_to_mut(&mut words).unwrap();
        bytes.fill(0xff);
        assert_eq!(words, [u32::MAX; 2]);
    }

    #[test]
    fn convert_to_rejects_odd_length() {
        let bytes = [0u8; 5];
        let err = convert_to::<u16, u8>(&bytes).unwrap_err();
        assert!(matches!(
            err,
            ViewError::ShapeMismatch {
                op: "convert_to",
                shape: ShapeError::NotMultiple {
                    extent: Extent::Length,
                    bytes: 5,
                    ..
                },
            }
        ));
    }
}
