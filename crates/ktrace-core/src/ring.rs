//! Ring arithmetic.
//!
//! head = producer write offset, tail = consumer read offset, both in
//! `[0, capacity)`. One byte is always kept free so that `head == tail`
//! unambiguously means "empty".

use crate::constants::CUSHION_PAGES;
use crate::error::ConfigError;

/// Bytes the producer may write before catching up with the consumer.
#[inline]
pub const fn free_space(head: u32, tail: u32, capacity: u32) -> u32 {
    if tail > head {
        tail - head - 1
    } else {
        // Subtract first: capacity may be close to u32::MAX.
        capacity - 1 - (head - tail)
    }
}

/// Bytes committed but not yet consumed.
#[inline]
pub const fn used_space(head: u32, tail: u32, capacity: u32) -> u32 {
    capacity - free_space(head, tail, capacity) - 1
}

/// Bytes of physical storage backing a ring: capacity plus cushion.
#[inline]
pub const fn storage_size(capacity: usize, page_size: usize) -> usize {
    capacity + CUSHION_PAGES * page_size
}

/// Check a ring capacity against the page size.
///
/// The capacity must hold at least two pages, be an exact page multiple
/// (so it can be mapped page by page), and fit the u32 offsets of the
/// control block.
pub fn validate_ring_size(size: usize, page_size: usize) -> Result<(), ConfigError> {
    if size < 2 * page_size {
        return Err(ConfigError::RingTooSmall {
            size,
            min: 2 * page_size,
        });
    }
    if size % page_size != 0 {
        return Err(ConfigError::NotPageMultiple { size, page_size });
    }
    if size > u32::MAX as usize {
        return Err(ConfigError::TooLarge { size });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_ring() {
        assert_eq!(free_space(0, 0, 8192), 8191);
        assert_eq!(used_space(0, 0, 8192), 0);
        assert_eq!(free_space(5000, 5000, 8192), 8191);
    }

    #[test]
    fn test_wrapped_tail_ahead_of_head() {
        // Producer wrapped, consumer still near the end.
        assert_eq!(free_space(100, 8000, 8192), 7899);
        assert_eq!(used_space(100, 8000, 8192), 292);
    }

    #[test]
    fn test_full_ring() {
        assert_eq!(free_space(8191, 0, 8192), 0);
        assert_eq!(free_space(41, 42, 8192), 0);
        assert_eq!(used_space(41, 42, 8192), 8191);
    }

    #[test]
    fn test_used_plus_free_is_capacity_minus_one() {
        let cap = 64u32;
        for head in 0..cap {
            for tail in 0..cap {
                let free = free_space(head, tail, cap);
                let used = used_space(head, tail, cap);
                assert_eq!(free + used, cap - 1, "head={} tail={}", head, tail);
                assert!(used <= cap - 1);
            }
        }
    }

    #[test]
    fn test_capacity_near_u32_max() {
        let cap = 0xFFFF_F000;
        assert!(validate_ring_size(cap as usize, 4096).is_ok());
        assert_eq!(free_space(0x2000, 0x2000, cap), cap - 1);
        assert_eq!(used_space(0x2000, 0x2000, cap), 0);
        assert_eq!(free_space(cap - 1, 0, cap), 0);
        assert_eq!(used_space(cap - 1, 0, cap), cap - 1);
        assert_eq!(free_space(0x1000, cap - 0x1000, cap), cap - 0x2001);
        for (head, tail) in [(cap - 1, cap - 1), (cap - 0x10, 0x10), (7, cap - 3)] {
            let free = free_space(head, tail, cap);
            assert_eq!(free + used_space(head, tail, cap), cap - 1);
        }
    }

    #[test]
    fn test_validate_ring_size() {
        assert!(validate_ring_size(8192, 4096).is_ok());
        assert!(validate_ring_size(8 * 1024 * 1024, 4096).is_ok());
        assert_eq!(
            validate_ring_size(4096, 4096),
            Err(ConfigError::RingTooSmall { size: 4096, min: 8192 })
        );
        assert_eq!(
            validate_ring_size(10_000, 4096),
            Err(ConfigError::NotPageMultiple { size: 10_000, page_size: 4096 })
        );
    }

    #[test]
    fn test_storage_size_includes_cushion() {
        assert_eq!(storage_size(8192, 4096), 8192 + 2 * 4096);
    }
}
