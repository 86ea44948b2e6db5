//! Fixed-capacity minor number allocator.

use core::fmt;

use spin::Mutex;

use crate::error::{LightsError, LightsResult};

/// Number of minor numbers available to attribute nodes.
pub const MAX_MINORS: usize = 512;

const WORD_BITS: usize = u64::BITS as usize;
const WORDS: usize = MAX_MINORS / WORD_BITS;

/// Identity of one attribute device node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Minor(pub u16);

impl fmt::Display for Minor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Bitmap of issued minor numbers.
///
/// `allocate` always hands out the lowest free minor.
pub struct MinorAllocator {
    bits: Mutex<[u64; WORDS]>,
}

impl MinorAllocator {
    /// Creates an allocator with every minor free.
    pub const fn new() -> Self {
        Self {
            bits: Mutex::new([0; WORDS]),
        }
    }

    /// Issues the lowest free minor, or fails with `Busy` when exhausted.
    pub fn allocate(&self) -> LightsResult<Minor> {
        let mut bits = self.bits.lock();
        for (i, word) in bits.iter_mut().enumerate() {
            if *word != u64::MAX {
                let bit = word.trailing_ones() as usize;
                *word |= 1 << bit;
                return Ok(Minor((i * WORD_BITS + bit) as u16));
            }
        }
        Err(LightsError::Busy)
    }

    /// Returns `minor` to the pool.
    ///
    /// Releasing an out-of-range or free minor fails with `InvalidArgument`.
    pub fn release(&self, minor: Minor) -> LightsResult {
        let index = minor.0 as usize;
        if index >= MAX_MINORS {
            return Err(LightsError::InvalidArgument);
        }
        let mask = 1u64 << (index % WORD_BITS);
        let mut bits = self.bits.lock();
        let word = &mut bits[index / WORD_BITS];
        if *word & mask == 0 {
            return Err(LightsError::InvalidArgument);
        }
        *word &= !mask;
        Ok(())
    }

    /// Whether `minor` is currently issued.
    pub fn is_allocated(&self, minor: Minor) -> bool {
        let index = minor.0 as usize;
        index < MAX_MINORS && self.bits.lock()[index / WORD_BITS] & (1 << (index % WORD_BITS)) != 0
    }

    /// Number of issued minors.
    pub fn in_use(&self) -> usize {
        self.bits.lock().iter().map(|w| w.count_ones() as usize).sum()
    }
}

impl Default for MinorAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_lowest_first() {
        let minors = MinorAllocator::new();
        assert_eq!(minors.allocate().unwrap(), Minor(0));
        assert_eq!(minors.allocate().unwrap(), Minor(1));
        assert_eq!(minors.allocate().unwrap(), Minor(2));
        minors.release(Minor(1)).unwrap();
        assert_eq!(minors.allocate().unwrap(), Minor(1));
        assert_eq!(minors.in_use(), 3);
    }

    #[test]
    fn test_exhaustion() {
        let minors = MinorAllocator::new();
        for i in 0..MAX_MINORS {
            assert_eq!(minors.allocate().unwrap(), Minor(i as u16));
        }
        assert_eq!(minors.allocate(), Err(LightsError::Busy));
        minors.release(Minor(300)).unwrap();
        assert_eq!(minors.allocate().unwrap(), Minor(300));
    }

    #[test]
    fn test_bad_release() {
        let minors = MinorAllocator::new();
        assert_eq!(minors.release(Minor(3)), Err(LightsError::InvalidArgument));
        assert_eq!(
            minors.release(Minor(MAX_MINORS as u16)),
            Err(LightsError::InvalidArgument)
        );
        let m = minors.allocate().unwrap();
        minors.release(m).unwrap();
        assert_eq!(minors.release(m), Err(LightsError::InvalidArgument));
        assert!(!minors.is_allocated(m));
    }
}
