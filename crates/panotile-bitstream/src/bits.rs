//! Bit-addressed storage and an Exp-Golomb aware reader.
//!
//! Bits are addressed MSB-first: bit 0 of a byte is its high-order bit.

use bit_vec::BitVec;
use std::ops::Range;

/// A byte-boundary-independent sequence of bits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitArray {
    bits: BitVec,
}

impl BitArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(nbits: usize) -> Self {
        Self {
            bits: BitVec::with_capacity(nbits),
        }
    }

    /// Expand every byte into eight bits, high-order bit first.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            bits: BitVec::from_bytes(bytes),
        }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Number of bytes needed to hold every bit.
    pub fn byte_len(&self) -> usize {
        self.bits.len().div_ceil(8)
    }

    pub fn get(&self, index: usize) -> Option<bool> {
        self.bits.get(index)
    }

    /// Set a single bit.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn set(&mut self, index: usize, value: bool) {
        self.bits.set(index, value);
    }

    pub fn push(&mut self, value: bool) {
        self.bits.push(value);
    }

    /// Append the eight bits of `byte`.
    pub fn push_byte(&mut self, byte: u8) {
        for shift in (0..8).rev() {
            self.bits.push((byte >> shift) & 1 == 1);
        }
    }

    pub fn truncate(&mut self, len: usize) {
        self.bits.truncate(len);
    }

    /// Read `width` bits (at most 64) starting at `offset`.
    pub fn read(&self, offset: usize, width: usize) -> Option<u64> {
        if width > 64 || offset.checked_add(width)? > self.len() {
            return None;
        }
        let mut value = 0u64;
        for index in offset..offset + width {
            value = (value << 1) | u64::from(self.bits.get(index)?);
        }
        Some(value)
    }

    /// Overwrite `width` bits at `offset` with the low bits of `value`.
    ///
    /// Returns `false` without writing anything if the range is out of bounds.
    pub fn write(&mut self, offset: usize, width: usize, value: u64) -> bool {
        if width > 64 || offset.saturating_add(width) > self.len() {
            return false;
        }
        for i in 0..width {
            let bit = (value >> (width - 1 - i)) & 1 == 1;
            self.bits.set(offset + i, bit);
        }
        true
    }

    /// Replace the bits in `range` with `replacement`, shifting everything after it.
    pub fn splice(&mut self, range: Range<usize>, replacement: &BitArray) {
        let end = range.end.min(self.len());
        let start = range.start.min(end);
        let mut bits = BitVec::with_capacity(self.len() - (end - start) + replacement.len());
        bits.extend(self.bits.iter().take(start));
        bits.extend(replacement.bits.iter());
        bits.extend(self.bits.iter().skip(end));
        self.bits = bits;
    }

    /// Byte `index`, zero-padded when the array ends mid-byte.
    pub fn byte(&self, index: usize) -> u8 {
        let mut value = 0u8;
        for bit in 0..8 {
            value <<= 1;
            if self.bits.get(index * 8 + bit).unwrap_or(false) {
                value |= 1;
            }
        }
        value
    }

    /// All bits packed into bytes, zero-padded at the end.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.bits.to_bytes()
    }

    /// Index of the last set bit, the RBSP stop bit in a well-formed payload.
    pub fn last_set_bit(&self) -> Option<usize> {
        (0..self.len()).rev().find(|&i| self.bits.get(i) == Some(true))
    }

    /// Drop everything after the last set bit, then zero-pad to a byte boundary.
    pub fn realign_trailing_bits(&mut self) {
        let len = self.last_set_bit().map_or(0, |stop| stop + 1);
        self.bits.truncate(len);
        while self.bits.len() % 8 != 0 {
            self.bits.push(false);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.bits.iter()
    }
}

impl FromIterator<bool> for BitArray {
    fn from_iter<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        Self {
            bits: iter.into_iter().collect(),
        }
    }
}

/// Number of bits in the `ue(v)` codeword for `value`.
pub fn ue_width(value: u32) -> usize {
    let code = u64::from(value) + 1;
    let significant = 64 - code.leading_zeros() as usize;
    2 * significant - 1
}

/// Sequential MSB-first reader over a [`BitArray`].
pub struct BitReader<'a> {
    bits: &'a BitArray,
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(bits: &'a BitArray) -> Self {
        Self { bits, pos: 0 }
    }

    /// Reader positioned at `pos`.
    pub fn at(bits: &'a BitArray, pos: usize) -> Self {
        Self { bits, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Read n bits (up to 32)
    pub fn read_bits(&mut self, n: usize) -> Option<u32> {
        if n > 32 {
            return None;
        }
        let value = self.bits.read(self.pos, n)?;
        self.pos += n;
        u32::try_from(value).ok()
    }

    pub fn read_flag(&mut self) -> Option<bool> {
        self.read_bits(1).map(|bit| bit == 1)
    }

    pub fn skip(&mut self, n: usize) -> Option<()> {
        if self.pos + n > self.bits.len() {
            return None;
        }
        self.pos += n;
        Some(())
    }

    /// Read unsigned Exp-Golomb coded value
    pub fn read_ue(&mut self) -> Option<u32> {
        let mut leading_zeros = 0usize;
        while !self.read_flag()? {
            leading_zeros += 1;
            if leading_zeros > 31 {
                return None;
            }
        }

        if leading_zeros == 0 {
            return Some(0);
        }

        let suffix = self.read_bits(leading_zeros)?;
        Some(((1u64 << leading_zeros) - 1 + u64::from(suffix)) as u32)
    }

    /// Read signed Exp-Golomb coded value
    pub fn read_se(&mut self) -> Option<i32> {
        let k = i64::from(self.read_ue()?);
        let value = if k % 2 == 1 { (k + 1) / 2 } else { -(k / 2) };
        Some(value as i32)
    }
}
