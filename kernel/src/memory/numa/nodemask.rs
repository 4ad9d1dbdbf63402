//! Fixed-size node and CPU bitmaps (nodemask_t / cpumask_t)

use core::fmt;

use super::{MAX_CPUS, MAX_NUMNODES};

/// Bitmap de `WORDS * 64` bits, sans allocation
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bitmap<const WORDS: usize> {
    words: [u64; WORDS],
}

/// Ensemble de nœuds NUMA
pub type NodeMask = Bitmap<{ MAX_NUMNODES / 64 }>;

/// Ensemble de CPUs
pub type CpuMask = Bitmap<{ MAX_CPUS / 64 }>;

impl<const WORDS: usize> Bitmap<WORDS> {
    /// Number of addressable bits
    pub const BITS: usize = WORDS * 64;

    pub const fn new() -> Self {
        Self { words: [0; WORDS] }
    }

    /// Bits `0..count` set (clamped to capacity)
    pub fn first_n(count: usize) -> Self {
        let mut map = Self::new();
        for bit in 0..count.min(Self::BITS) {
            map.set(bit);
        }
        map
    }

    /// Sets `bit`; returns false when it is outside the bitmap
    pub fn set(&mut self, bit: usize) -> bool {
        if bit >= Self::BITS {
            return false;
        }
        self.words[bit / 64] |= 1u64 << (bit % 64);
        true
    }

    pub fn clear(&mut self, bit: usize) {
        if bit < Self::BITS {
            self.words[bit / 64] &= !(1u64 << (bit % 64));
        }
    }

    pub fn test(&self, bit: usize) -> bool {
        bit < Self::BITS && self.words[bit / 64] & (1u64 << (bit % 64)) != 0
    }

    pub fn clear_all(&mut self) {
        self.words = [0; WORDS];
    }

    /// Nombre de bits positionnés
    pub fn weight(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    pub fn first(&self) -> Option<usize> {
        self.iter().next()
    }

    pub fn last(&self) -> Option<usize> {
        self.words
            .iter()
            .enumerate()
            .rev()
            .find(|(_, w)| **w != 0)
            .map(|(i, w)| i * 64 + 63 - w.leading_zeros() as usize)
    }

    /// Set bits in ascending order
    pub fn iter(&self) -> BitmapIter<'_, WORDS> {
        BitmapIter { map: self, next: 0 }
    }
}

impl<const WORDS: usize> Default for Bitmap<WORDS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const WORDS: usize> fmt::Debug for Bitmap<WORDS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<'a, const WORDS: usize> IntoIterator for &'a Bitmap<WORDS> {
    type Item = usize;
    type IntoIter = BitmapIter<'a, WORDS>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct BitmapIter<'a, const WORDS: usize> {
    map: &'a Bitmap<WORDS>,
    next: usize,
}

impl<const WORDS: usize> Iterator for BitmapIter<'_, WORDS> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.next < Bitmap::<WORDS>::BITS {
            let word = self.map.words[self.next / 64] >> (self.next % 64);
            if word == 0 {
                // Sauter au mot suivant
                self.next = (self.next / 64 + 1) * 64;
                continue;
            }
            let bit = self.next + word.trailing_zeros() as usize;
            self.next = bit + 1;
            return Some(bit);
        }
        None
    }
}
