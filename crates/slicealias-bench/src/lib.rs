//! Shared inputs for the slicealias benchmarks.

/// Payload sizes swept by every benchmark group.
pub const SIZES: &[usize] = &[16, 64, 256, 1024, 4096, 65536];

/// `size` bytes of printable ASCII, leaked so it can be aliased as `'static`.
#[must_use]
pub fn leaked_text(size: usize) -> &'static str {
    let text: String = (0..size).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
    Box::leak(text.into_boxed_str())
}

/// `size` non-zero bytes followed by a NUL terminator.
#[must_use]
pub fn c_string(size: usize) -> Vec<u8> {
    let mut s = vec![b'A'; size];
    s.push(0);
    s
}
