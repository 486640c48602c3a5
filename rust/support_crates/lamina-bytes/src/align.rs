//! Alignment arithmetic helpers.

/// Rounds `n` up to the next multiple of `alignment`.
///
/// `alignment` must be a nonzero power of two. Panics if the rounded value
/// does not fit in `usize`.
///
/// ```
/// use lamina_bytes::align::round_up;
///
/// assert_eq!(round_up(0, 64), 0);
/// assert_eq!(round_up(1, 64), 64);
/// assert_eq!(round_up(64, 64), 64);
/// assert_eq!(round_up(65, 64), 128);
/// ```
#[inline]
pub fn round_up(n: usize, alignment: usize) -> usize {
    debug_assert!(alignment != 0 && alignment.is_power_of_two());
    n.checked_add(alignment - 1).expect("add") & !(alignment - 1)
}

/// Rounds `n` down to the previous multiple of `alignment`.
///
/// `alignment` must be a nonzero power of two.
#[inline]
pub fn round_down(n: usize, alignment: usize) -> usize {
    debug_assert!(alignment != 0 && alignment.is_power_of_two());
    n & !(alignment - 1)
}

/// Returns `true` if `ptr` is aligned to `alignment` bytes.
#[inline]
pub fn is_aligned(ptr: *const u8, alignment: usize) -> bool {
    debug_assert!(alignment != 0 && alignment.is_power_of_two());
    ptr as usize & (alignment - 1) == 0
}
