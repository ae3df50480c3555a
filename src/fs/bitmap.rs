//! The bitmap block heading every segment.
//!
//! The first 4 KiB of a segment form a bit vector over that segment's
//! records, byte `i / 8`, bit `i % 8`, least significant bit first. A set
//! bit means "allocated". Only the low `n_bits` bits are meaningful for a
//! given segment kind; the rest stay zero.

use bitvec::prelude::*;

use super::BLOCK_SIZE;

#[derive(Debug, Clone)]
pub struct Bitmap {
    bits: BitVec<u8, Lsb0>,
}

impl Bitmap {
    /// An all-free bitmap for a freshly created segment.
    pub fn new() -> Self {
        Bitmap {
            bits: bitvec![u8, Lsb0; 0; BLOCK_SIZE * 8],
        }
    }

    pub fn from_block(buf: &[u8; BLOCK_SIZE]) -> Self {
        Bitmap {
            bits: BitVec::from_slice(buf),
        }
    }

    pub fn as_block(&self) -> &[u8] {
        self.bits.as_raw_slice()
    }

    /// Lowest-indexed clear bit in `[0, n_bits)`, if any.
    pub fn first_free(&self, n_bits: usize) -> Option<usize> {
        self.bits[..n_bits].first_zero()
    }

    pub fn set(&mut self, index: usize) {
        self.bits.set(index, true);
    }

    pub fn clear(&mut self, index: usize) {
        self.bits.set(index, false);
    }

    pub fn is_set(&self, index: usize) -> bool {
        self.bits[index]
    }

    pub fn count_set(&self) -> usize {
        self.bits.count_ones()
    }
}

impl Default for Bitmap {
    fn default() -> Self {
        Self::new()
    }
}
