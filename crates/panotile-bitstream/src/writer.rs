//! Writing RBSP syntax elements.

use crate::bits::BitArray;
use bitstream_io::{BigEndian, BitWrite, BitWriter};
use std::io;

/// MSB-first writer for `u(n)`, `ue(v)` and `se(v)` syntax elements.
pub struct RbspWriter {
    inner: BitWriter<Vec<u8>, BigEndian>,
    written: usize,
}

impl Default for RbspWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl RbspWriter {
    pub fn new() -> Self {
        Self {
            inner: BitWriter::endian(Vec::new(), BigEndian),
            written: 0,
        }
    }

    /// Bits written so far.
    pub fn bit_len(&self) -> usize {
        self.written
    }

    pub fn write_flag(&mut self, flag: bool) -> io::Result<()> {
        self.inner.write_bit(flag)?;
        self.written += 1;
        Ok(())
    }

    /// Write the low `width` bits of `value` (`u(n)`).
    pub fn write_bits(&mut self, width: u32, value: u64) -> io::Result<()> {
        if width == 0 {
            return Ok(());
        }
        self.inner.write(width, value)?;
        self.written += width as usize;
        Ok(())
    }

    /// Write an unsigned Exp-Golomb codeword.
    pub fn write_ue(&mut self, value: u32) -> io::Result<()> {
        let code = u64::from(value) + 1;
        let significant = 64 - code.leading_zeros();
        for _ in 1..significant {
            self.write_flag(false)?;
        }
        self.write_bits(significant, code)
    }

    /// Write a signed Exp-Golomb codeword.
    pub fn write_se(&mut self, value: i32) -> io::Result<()> {
        let mapped = if value > 0 {
            2 * i64::from(value) - 1
        } else {
            -2 * i64::from(value)
        };
        self.write_ue(mapped as u32)
    }

    /// Append rbsp_stop_one_bit and alignment zeros, returning the bytes.
    pub fn finish_rbsp(mut self) -> io::Result<Vec<u8>> {
        self.inner.write_bit(true)?;
        self.inner.byte_align()?;
        Ok(self.inner.into_writer())
    }

    /// The written bits, without any padding.
    pub fn into_bits(mut self) -> io::Result<BitArray> {
        let len = self.written;
        self.inner.byte_align()?;
        let mut bits = BitArray::from_bytes(&self.inner.into_writer());
        bits.truncate(len);
        Ok(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::BitReader;

    #[test]
    fn test_write_ue_values() {
        let mut writer = RbspWriter::new();
        for value in [0, 1, 2, 3, 7, 255] {
            writer.write_ue(value).unwrap();
        }
        let bits = writer.into_bits().unwrap();
        let mut reader = BitReader::new(&bits);
        for value in [0, 1, 2, 3, 7, 255] {
            assert_eq!(reader.read_ue(), Some(value));
        }
        assert_eq!(reader.position(), bits.len());
    }

    #[test]
    fn test_write_se_values() {
        let mut writer = RbspWriter::new();
        for value in [0, 1, -1, 26, -26] {
            writer.write_se(value).unwrap();
        }
        let bits = writer.into_bits().unwrap();
        let mut reader = BitReader::new(&bits);
        for value in [0, 1, -1, 26, -26] {
            assert_eq!(reader.read_se(), Some(value));
        }
    }

    #[test]
    fn test_finish_rbsp_aligns() {
        let mut writer = RbspWriter::new();
        writer.write_bits(3, 0b101).unwrap();
        assert_eq!(writer.bit_len(), 3);
        assert_eq!(writer.finish_rbsp().unwrap(), vec![0b1011_0000]);
    }

    #[test]
    fn test_ue_bit_len_matches_width() {
        for value in [0u32, 1, 5, 62, 1000] {
            let mut writer = RbspWriter::new();
            writer.write_ue(value).unwrap();
            assert_eq!(writer.bit_len(), crate::bits::ue_width(value));
        }
    }
}
