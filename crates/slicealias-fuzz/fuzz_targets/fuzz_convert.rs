#![no_main]
use libfuzzer_sys::fuzz_target;
use slicealias::{RawView, ViewError, convert_view};

fuzz_target!(|data: &[u8]| {
    // First 16 bytes pick a header; the extents are never dereferenced.
    if data.len() < 16 {
        return;
    }
    let word = |at: usize| {
        u64::from_le_bytes(data[at..at + 8].try_into().unwrap_or([0; 8])) as usize
    };
    let cap = word(0);
    let len = word(8).min(cap);
    // SAFETY: len <= cap, and the view is only reshaped, never read.
    let src = unsafe { RawView::<[u8; 3]>::from_raw_parts(std::ptr::dangling_mut::<u32>().cast(), len, cap) };

    match convert_view::<u32, [u8; 3]>(&src) {
        Ok(dst) => {
            assert_eq!(dst.len() as u128 * 4, len as u128 * 3);
            assert_eq!(dst.capacity() as u128 * 4, cap as u128 * 3);
            assert!(dst.capacity() <= isize::MAX as usize);
        }
        Err(ViewError::ShapeMismatch { .. } | ViewError::CountOverflow { .. }) => {}
        Err(other) => panic!("unexpected error {other}"),
    }
});
