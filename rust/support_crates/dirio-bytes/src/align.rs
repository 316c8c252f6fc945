//! Alignment and block-rounding arithmetic.
//!
//! `is_aligned_u64` requires a power-of-two alignment and is used for memory
//! addresses. Transfer sizes reported by storage devices are not guaranteed to be
//! powers of two (striped volumes report e.g. 3 * 64 KiB), so block arithmetic over
//! file offsets goes through `split_at_block` and `round_up_to_multiple`, which
//! accept any non-zero block.

/// Checks if a number is aligned to the specified alignment boundary.
///
/// # Examples
///
/// ```
/// use dirio_bytes::align::is_aligned_u64;
///
/// assert!(is_aligned_u64(0, 8));
/// assert!(!is_aligned_u64(7, 8));
/// assert!(is_aligned_u64(16, 8));
/// ```
///
/// # Panics
///
/// This function will panic in debug builds if `alignment` is 0 or is not a power of 2.
#[inline]
pub fn is_aligned_u64(n: u64, alignment: u64) -> bool {
    debug_assert_ne!(alignment, 0);
    debug_assert!(alignment.is_power_of_two());
    (n & (alignment - 1)) == 0
}

/// Splits `offset` into the start of its containing block and its distance into
/// that block.
///
/// # Examples
///
/// ```
/// use dirio_bytes::align::split_at_block;
///
/// assert_eq!(split_at_block(4090, 4096), (0, 4090));
/// assert_eq!(split_at_block(8192, 4096), (8192, 0));
/// assert_eq!(split_at_block(1000, 384), (768, 232));
/// ```
///
/// # Panics
///
/// Panics if `block` is 0.
#[inline]
pub fn split_at_block(offset: u64, block: u64) -> (u64, u64) {
    let within = offset % block;
    (offset - within, within)
}

/// Rounds `n` up to the next multiple of `block`, returning `None` on overflow.
///
/// # Examples
///
/// ```
/// use dirio_bytes::align::round_up_to_multiple;
///
/// assert_eq!(round_up_to_multiple(0, 512), Some(0));
/// assert_eq!(round_up_to_multiple(4100, 4096), Some(8192));
/// assert_eq!(round_up_to_multiple(4096, 4096), Some(4096));
/// assert_eq!(round_up_to_multiple(700, 384), Some(768));
/// assert_eq!(round_up_to_multiple(u64::MAX, 4096), None);
/// ```
///
/// # Panics
///
/// Panics if `block` is 0.
#[inline]
pub fn round_up_to_multiple(n: u64, block: u64) -> Option<u64> {
    n.div_ceil(block).checked_mul(block)
}

/// Returns `true` if `alignment` can be used as the address alignment of an
/// [`AlignedBuffer`](crate::AlignedBuffer): a non-zero power of two that is also a
/// multiple of the pointer width.
#[inline]
pub fn is_valid_memory_alignment(alignment: usize) -> bool {
    alignment.is_power_of_two() && alignment % std::mem::size_of::<*const u8>() == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_at_block_covers_every_remainder() {
        let block = 512;
        for within in 0..block {
            let offset = 3 * block + within;
            assert_eq!(split_at_block(offset, block), (3 * block, within));
        }
    }

    #[test]
    fn test_round_up_non_power_of_two() {
        let block = 3 * 64 * 1024;
        assert_eq!(round_up_to_multiple(1, block), Some(block));
        assert_eq!(round_up_to_multiple(block + 1, block), Some(2 * block));
    }

    #[test]
    fn test_memory_alignment_validity() {
        assert!(is_valid_memory_alignment(4096));
        assert!(is_valid_memory_alignment(std::mem::size_of::<usize>()));
        assert!(!is_valid_memory_alignment(0));
        assert!(!is_valid_memory_alignment(3584));
        assert!(!is_valid_memory_alignment(2));
    }
}
