//! Integration test: installing and reinterpreting views.
//!
//! Validates that:
//! 1. A view installed with `set_at` aliases the caller's buffer.
//! 2. `convert_at` rescales both extents and shares the address.
//! 3. Shape, overflow and destination errors leave the slot untouched.
//!
//! Run: cargo test -p slicealias --test conversion_test

use slicealias::{
    Extent, RawView, ShapeError, SlotRef, ViewError, convert_at, convert_to, convert_view, set_at,
    set_at_typed,
};

#[test]
fn set_at_aliases_buffer() {
    let mut original = b"Hello, world!".to_vec();
    let (p, n) = (original.as_mut_ptr(), original.len());

    let mut alias = RawView::<u8>::empty();
    // SAFETY: `original` is live and unmoved for the rest of the test.
    unsafe { set_at(SlotRef::view(&mut alias), p, n) }.expect("byte view");
    assert_eq!(unsafe { alias.as_slice() }, b"Hello, world!");

    // SAFETY: no other reference to `original` is live.
    (unsafe { alias.as_mut_slice() })[..5].copy_from_slice(b"Adios");
    assert_eq!(original, b"Adios, world!");
}

#[test]
fn set_at_accepts_very_large_element_type() {
    type Big = [u8; 1 << 20];
    let mut x: Box<Big> = vec![0u8; 1 << 20]
        .into_boxed_slice()
        .try_into()
        .expect("exact length");
    let mut s = RawView::<Big>::empty();
    // SAFETY: `x` holds one `Big`.
    unsafe { set_at_typed(&mut s, std::ptr::from_mut(&mut *x), 1) }.expect("one element fits");
    assert_eq!(s.len(), 1);
    assert_eq!(s.as_ptr().cast::<u8>(), x.as_mut_ptr());
}

#[test]
fn word_at_a_time_lowercase() {
    const INPUT: &str = "HELLO, WORLD!";

    // Aligned backing buffer.
    let mut buf = vec![0u32; INPUT.len().div_ceil(4)];
    let src = RawView::from_vec(&mut buf).erase();

    let mut alias = RawView::<u8>::empty();
    // SAFETY: every byte pattern is a valid u8.
    unsafe { convert_at(SlotRef::view(&mut alias), &src) }.expect("u32 to u8 divides");
    assert_eq!(alias.len(), 16);
    // SAFETY: `buf` is not borrowed while the alias is written.
    (unsafe { alias.as_mut_slice() })[..INPUT.len()].copy_from_slice(INPUT.as_bytes());

    for word in &mut buf {
        *word |= 0x2020_2020;
    }

    // SAFETY: the words above are no longer borrowed.
    let out = unsafe { alias.as_slice() };
    assert_eq!(&out[..INPUT.len()], b"hello, world!");
}

#[test]
fn convert_at_names_offending_extent() {
    let mut foobar = *b"foobar\0\0";

    // Capacity 6 does not divide into u32.
    let src = unsafe { RawView::from_raw_parts(foobar.as_mut_ptr(), 4, 6) }.erase();
    let mut dst = RawView::<u32>::empty();
    let err = unsafe { convert_at(SlotRef::view(&mut dst), &src) }.unwrap_err();
    assert!(matches!(
        err,
        ViewError::ShapeMismatch {
            shape: ShapeError::NotMultiple {
                extent: Extent::Capacity,
                bytes: 6,
                ..
            },
            ..
        }
    ));
    assert!(err.to_string().contains("capacity"));
    assert_eq!(dst, RawView::empty());

    // Length 6 does not, capacity 8 does.
    let src = unsafe { RawView::from_raw_parts(foobar.as_mut_ptr(), 6, 8) }.erase();
    let err = unsafe { convert_at(SlotRef::view(&mut dst), &src) }.unwrap_err();
    assert!(matches!(
        err,
        ViewError::ShapeMismatch {
            shape: ShapeError::NotMultiple {
                extent: Extent::Length,
                bytes: 6,
                ..
            },
            ..
        }
    ));
    assert!(err.to_string().contains("u32"));
    assert_eq!(dst, RawView::empty());
}

#[test]
fn convert_at_rejects_value_slot() {
    let data = [1u16, 2, 3];
    let src = RawView::from_slice(&data).erase();
    let mut not_a_view = vec![0u8];
    let err = unsafe { convert_at(SlotRef::value(&mut not_a_view), &src) }.unwrap_err();
    assert!(matches!(
        err,
        ViewError::InvalidDestinationType {
            op: "convert_at",
            ..
        }
    ));
    assert_eq!(not_a_view, [0]);
}

#[test]
fn failed_convert_keeps_previous_view() {
    let mut good = [0u32; 2];
    let mut dst = RawView::<u32>::empty();
    unsafe { set_at_typed(&mut dst, good.as_mut_ptr(), 2) }.expect("aligned");
    let before = dst;

    let odd = [0u8; 3];
    let src = RawView::from_slice(&odd).erase();
    assert!(unsafe { convert_at(SlotRef::view(&mut dst), &src) }.is_err());
    assert_eq!(dst, before);
}

#[test]
fn extent_laws_hold_across_types() {
    let mut backing = vec![0u64; 32];
    let words = unsafe { RawView::from_raw_parts(backing.as_mut_ptr(), 24, 32) };

    let bytes: RawView<u8> = convert_view(&words).expect("to bytes");
    assert_eq!(bytes.len(), words.len() * 8);
    assert_eq!(bytes.capacity(), words.capacity() * 8);

    let halves: RawView<u32> = convert_view(&words).expect("to u32");
    assert_eq!(halves.len() * 4, words.len() * 8);
    assert_eq!(halves.capacity() * 4, words.capacity() * 8);

    let triples: Result<RawView<[u8; 3]>, _> = convert_view(&words);
    assert!(triples.is_err(), "256 bytes do not divide into 3-byte elements");

    let pairs: RawView<[u64; 2]> = convert_view(&words).expect("to pairs");
    assert_eq!(pairs.len(), 12);
    assert_eq!(pairs.capacity(), 16);
    assert_eq!(pairs.as_ptr().cast::<u64>(), backing.as_mut_ptr());
}

#[test]
fn empty_source_converts_to_empty() {
    let src = RawView::<u16>::empty();
    let dst: RawView<u64> = convert_view(&src).expect("zero bytes divide");
    assert!(dst.is_empty());
    assert_eq!(dst.capacity(), 0);

    let none: &[u32] = convert_to::<u32, u8>(&[]).expect("empty slice");
    assert!(none.is_empty());
}

#[test]
fn misaligned_source_is_rejected() {
    let backing = [0u64; 2];
    let bytes: &[u8] = convert_to(&backing).expect("to bytes");
    let err = convert_to::<u32, u8>(&bytes[1..5]).unwrap_err();
    assert!(matches!(
        err,
        ViewError::ShapeMismatch {
            shape: ShapeError::Misaligned { align: 4, .. },
            ..
        }
    ));
    assert!(convert_to::<u32, u8>(&bytes[4..8]).is_ok());
}
