//! Bit-addressable stream reader and writer.
//!
//! Bits are addressed in MSB-first order: bit 0 is the high bit of the first byte.
//! Multi-bit values are big-endian. A position is a byte position plus a bit offset
//! in `0..8`; [BitReader::bit_position] and [BitWriter::bit_position] flatten it to
//! `8 * bytes + offset`.

use std::borrow::Cow;
use std::io::{self, Read, Write};

use num_bigint::{BigInt, BigUint};
use num_traits::{One, Signed, Zero};

use crate::errors::StreamError;

pub const BYTE_SIZE: usize = 8;

/// Sign-extends the low `bits` of `value` to a full `i64`.
pub fn sign_extend(value: u64, bits: usize) -> i64 {
    if bits == 0 {
        return 0;
    }

    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

fn low_mask(n: usize) -> u64 {
    if n >= 64 { u64::MAX } else { (1u64 << n) - 1 }
}

/// A saved reader cursor. Restoring it with [BitReader::reset] is a pure cursor assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark {
    bit_position: u64,
}

impl Mark {
    /// Bit position the mark was taken at.
    pub fn bit_position(&self) -> u64 {
        self.bit_position
    }
}

/// Reads bits from an in-memory buffer. The buffer is retained for the reader's
/// lifetime, so any [Mark] taken after the last [BitReader::flush] stays valid.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: Cow<'a, [u8]>,
    start: usize,
    len: usize,
    byte_pos: usize,
    bit_offset: u8,
    flushed_pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            len: data.len(),
            data: Cow::Borrowed(data),
            start: 0,
            byte_pos: 0,
            bit_offset: 0,
            flushed_pos: 0,
        }
    }

    /// Reads `len` bytes of `data` starting at byte `offset`.
    pub fn with_range(data: &'a [u8], offset: usize, len: usize) -> Result<Self, StreamError> {
        let end = offset.checked_add(len).filter(|end| *end <= data.len());
        if end.is_none() {
            return Err(StreamError::PositionOutOfRange {
                position: (offset as u64).saturating_add(len as u64) * BYTE_SIZE as u64,
                lower: 0,
                upper: data.len() as u64 * BYTE_SIZE as u64,
            });
        }

        Ok(Self {
            data: Cow::Borrowed(data),
            start: offset,
            len,
            byte_pos: 0,
            bit_offset: 0,
            flushed_pos: 0,
        })
    }

    /// Buffers everything `source` yields and reads from that buffer.
    pub fn from_read<R: Read>(mut source: R) -> io::Result<BitReader<'static>> {
        let mut buf = Vec::new();
        source.read_to_end(&mut buf)?;

        Ok(BitReader {
            len: buf.len(),
            data: Cow::Owned(buf),
            start: 0,
            byte_pos: 0,
            bit_offset: 0,
            flushed_pos: 0,
        })
    }

    pub fn bit_position(&self) -> u64 {
        self.byte_pos as u64 * BYTE_SIZE as u64 + u64::from(self.bit_offset)
    }

    pub fn byte_position(&self) -> usize {
        self.byte_pos
    }

    pub fn bit_offset(&self) -> u8 {
        self.bit_offset
    }

    /// Total length of the readable range in bits.
    pub fn len_bits(&self) -> u64 {
        self.len as u64 * BYTE_SIZE as u64
    }

    pub fn remaining_bits(&self) -> u64 {
        self.len_bits() - self.bit_position()
    }

    pub fn is_at_end(&self) -> bool {
        self.remaining_bits() == 0
    }

    /// Moves the cursor to `pos`. Positions before the flushed prefix or past the end are rejected.
    pub fn set_bit_position(&mut self, pos: u64) -> Result<(), StreamError> {
        let lower = self.flushed_pos as u64 * BYTE_SIZE as u64;
        let upper = self.len_bits();
        if pos < lower || pos > upper {
            return Err(StreamError::PositionOutOfRange {
                position: pos,
                lower,
                upper,
            });
        }

        self.byte_pos = (pos / BYTE_SIZE as u64) as usize;
        self.bit_offset = (pos % BYTE_SIZE as u64) as u8;
        Ok(())
    }

    pub fn mark(&self) -> Mark {
        Mark {
            bit_position: self.bit_position(),
        }
    }

    pub fn reset(&mut self, mark: Mark) -> Result<(), StreamError> {
        self.set_bit_position(mark.bit_position)
    }

    /// Discards the bytes before the current byte position; they can no longer be revisited.
    pub fn flush(&mut self) {
        self.flushed_pos = self.byte_pos;
    }

    fn ensure(&self, bits: u64) -> Result<(), StreamError> {
        let available = self.remaining_bits();
        if bits > available {
            return Err(StreamError::Truncated {
                needed: bits,
                available,
            });
        }

        Ok(())
    }

    fn advance(&mut self, bits: usize) {
        let total = self.bit_offset as usize + bits;
        self.byte_pos += total / BYTE_SIZE;
        self.bit_offset = (total % BYTE_SIZE) as u8;
    }

    /// Reads `n` bits (max 64) as an unsigned value. MSB-first.
    pub fn read_bits(&mut self, n: usize) -> Result<u64, StreamError> {
        if n > 64 {
            return Err(StreamError::TooManyBits(n));
        }
        self.ensure(n as u64)?;

        let mut value = 0u64;
        let mut remaining = n;

        while remaining > 0 {
            let byte = self.data[self.start + self.byte_pos];
            let available = BYTE_SIZE - self.bit_offset as usize;
            let take = available.min(remaining);
            let bits = u64::from(byte >> (available - take)) & low_mask(take);

            value = (value << take) | bits;
            self.advance(take);
            remaining -= take;
        }

        Ok(value)
    }

    /// Reads `n` bits (max 64) and sign-extends from bit `n - 1`.
    pub fn read_signed_bits(&mut self, n: usize) -> Result<i64, StreamError> {
        let value = self.read_bits(n)?;
        Ok(sign_extend(value, n))
    }

    /// Reads an unsigned integer of any width: the rest of a partial byte, whole bytes, then trailing bits.
    pub fn read_big_uint(&mut self, n: usize) -> Result<BigUint, StreamError> {
        self.ensure(n as u64)?;

        let mut result = BigUint::zero();
        let mut to_read = n;

        if to_read > BYTE_SIZE {
            if self.bit_offset != 0 {
                let prefix = BYTE_SIZE - self.bit_offset as usize;
                result = BigUint::from(self.read_bits(prefix)?);
                to_read -= prefix;
            }

            let num_bytes = to_read / BYTE_SIZE;
            let bytes = self.read_bytes(num_bytes)?;
            result = (result << (BYTE_SIZE * num_bytes)) | BigUint::from_bytes_be(&bytes);
            to_read %= BYTE_SIZE;
        }

        if to_read > 0 {
            let tail = self.read_bits(to_read)?;
            result = (result << to_read) | BigUint::from(tail);
        }

        Ok(result)
    }

    /// Reads a two's-complement integer of any width.
    pub fn read_big_int(&mut self, n: usize) -> Result<BigInt, StreamError> {
        let unsigned = self.read_big_uint(n)?;
        if n == 0 {
            return Ok(BigInt::zero());
        }

        let value = BigInt::from(unsigned);
        if value >= (BigInt::one() << (n - 1)) {
            Ok(value - (BigInt::one() << n))
        } else {
            Ok(value)
        }
    }

    pub fn read_byte(&mut self) -> Result<u8, StreamError> {
        Ok(self.read_bits(BYTE_SIZE)? as u8)
    }

    /// Reads `n` whole bytes, starting at the current bit position.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, StreamError> {
        self.ensure(n as u64 * BYTE_SIZE as u64)?;

        if self.bit_offset == 0 {
            let from = self.start + self.byte_pos;
            let bytes = self.data[from..from + n].to_vec();
            self.byte_pos += n;
            return Ok(bytes);
        }

        let mut bytes = Vec::with_capacity(n);
        for _ in 0..n {
            bytes.push(self.read_byte()?);
        }

        Ok(bytes)
    }

    /// Reads UTF-8 bytes up to and including a zero byte; the terminator is not part of the result.
    pub fn read_zero_terminated_string(&mut self) -> Result<String, StreamError> {
        let mut bytes = Vec::new();
        loop {
            let byte = self.read_byte()?;
            if byte == 0 {
                break;
            }
            bytes.push(byte);
        }

        String::from_utf8(bytes).map_err(|_| StreamError::InvalidUtf8)
    }

    pub fn skip_bits(&mut self, n: u64) -> Result<(), StreamError> {
        self.ensure(n)?;
        let pos = self.bit_position() + n;
        self.set_bit_position(pos)
    }

    /// Skips forward to the next bit position divisible by `bits`. No-op when already aligned.
    pub fn align_to(&mut self, bits: u64) -> Result<(), StreamError> {
        if bits == 0 {
            return Ok(());
        }

        let rem = self.bit_position() % bits;
        if rem != 0 {
            self.skip_bits(bits - rem)?;
        }

        Ok(())
    }

    pub fn byte_align(&mut self) -> Result<(), StreamError> {
        self.align_to(BYTE_SIZE as u64)
    }
}

/// Writes bits into a growable byte buffer, MSB first.
///
/// A trailing partial byte is kept in the buffer with its unused low bits set to zero.
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    buf: Vec<u8>,
    bit_offset: u8,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bit_position(&self) -> u64 {
        let full = if self.bit_offset == 0 {
            self.buf.len()
        } else {
            self.buf.len() - 1
        };

        full as u64 * BYTE_SIZE as u64 + u64::from(self.bit_offset)
    }

    pub fn bit_offset(&self) -> u8 {
        self.bit_offset
    }

    fn put_bits(&mut self, value: u64, n: usize) {
        let mut remaining = n;

        while remaining > 0 {
            if self.bit_offset == 0 {
                self.buf.push(0);
            }

            let free = BYTE_SIZE - self.bit_offset as usize;
            let take = free.min(remaining);
            let chunk = (value >> (remaining - take)) & low_mask(take);
            let last = self.buf.len() - 1;
            self.buf[last] |= (chunk as u8) << (free - take);

            self.bit_offset = ((self.bit_offset as usize + take) % BYTE_SIZE) as u8;
            remaining -= take;
        }
    }

    fn put_zeros(&mut self, mut n: u64) {
        while n > 0 {
            let chunk = n.min(64);
            self.put_bits(0, chunk as usize);
            n -= chunk;
        }
    }

    /// Writes the low-order `n` bits (max 64) of `value`. MSB-first.
    pub fn write_bits(&mut self, value: u64, n: usize) -> Result<(), StreamError> {
        if n > 64 {
            return Err(StreamError::TooManyBits(n));
        }

        self.put_bits(value, n);
        Ok(())
    }

    /// Writes the low-order `n` bits of the two's-complement representation of `value`.
    pub fn write_signed_bits(&mut self, value: i64, n: usize) -> Result<(), StreamError> {
        self.write_bits(value as u64, n)
    }

    /// Writes the low-order `n` bits of `value`, for any width.
    pub fn write_big_uint(&mut self, value: &BigUint, n: usize) {
        if n == 0 {
            return;
        }

        let num_bytes = n.div_ceil(BYTE_SIZE);
        let raw = value.to_bytes_be();
        let mut bytes = vec![0u8; num_bytes];
        let copied = raw.len().min(num_bytes);
        bytes[num_bytes - copied..].copy_from_slice(&raw[raw.len() - copied..]);

        let lead = n - BYTE_SIZE * (num_bytes - 1);
        self.put_bits(u64::from(bytes[0]), lead);
        self.write_bytes(&bytes[1..]);
    }

    /// Writes the low-order `n` bits of the two's-complement representation of `value`, for any width.
    pub fn write_big_int(&mut self, value: &BigInt, n: usize) {
        let modulus = BigInt::one() << n;
        let wrapped = if value.is_negative() {
            ((value % &modulus) + &modulus) % &modulus
        } else {
            value % &modulus
        };

        // wrapped is in 0..modulus, so the conversion cannot fail
        let unsigned = wrapped.to_biguint().unwrap_or_default();
        self.write_big_uint(&unsigned, n);
    }

    pub fn write_byte(&mut self, value: u8) {
        self.put_bits(u64::from(value), BYTE_SIZE);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.bit_offset == 0 {
            self.buf.extend_from_slice(bytes);
            return;
        }

        for byte in bytes {
            self.write_byte(*byte);
        }
    }

    /// Writes the UTF-8 bytes of `value` followed by a single zero byte.
    pub fn write_zero_terminated_string(&mut self, value: &str) {
        self.write_bytes(value.as_bytes());
        self.write_byte(0);
    }

    /// Writes `n` zero bits.
    pub fn skip_bits(&mut self, n: u64) {
        self.put_zeros(n);
    }

    /// Fills with zero bits up to the next bit position divisible by `bits`.
    pub fn align_to(&mut self, bits: u64) {
        if bits == 0 {
            return;
        }

        let rem = self.bit_position() % bits;
        if rem != 0 {
            self.put_zeros(bits - rem);
        }
    }

    pub fn byte_align(&mut self) {
        self.align_to(BYTE_SIZE as u64);
    }

    /// Written bytes, including a zero-padded trailing partial byte.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_to<W: Write>(&self, sink: &mut W) -> io::Result<()> {
        sink.write_all(&self.buf)?;
        sink.flush()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_read_bits() {
        let mut reader = BitReader::new(&[0b11111111]);
        assert_eq!(reader.read_bits(8).unwrap(), 0b11111111);
    }

    #[test]
    fn test_read_bits_across_bytes() {
        let mut reader = BitReader::new(&[0b11_000001, 0b10000_101]);
        assert_eq!(reader.read_bits(2).unwrap(), 3);
        assert_eq!(reader.read_bits(11).unwrap(), 48);
        assert_eq!(reader.read_bits(3).unwrap(), 5);
        assert!(reader.is_at_end());
    }

    #[test]
    fn test_read_bits_out_of_bounds() {
        let mut reader = BitReader::new(&[0b11111111]);
        assert_eq!(
            reader.read_bits(9).unwrap_err(),
            StreamError::Truncated {
                needed: 9,
                available: 8
            }
        );
        assert_eq!(reader.bit_position(), 0);
    }

    #[test]
    fn test_read_bits_more_than_64() {
        let mut reader = BitReader::new(&[0b11111111]);
        assert_eq!(
            reader.read_bits(65).unwrap_err(),
            StreamError::TooManyBits(65)
        );
    }

    #[test]
    fn test_read_signed_bits() {
        let mut reader = BitReader::new(&[0xFF, 0x7F]);
        assert_eq!(reader.read_signed_bits(8).unwrap(), -1);
        assert_eq!(reader.read_signed_bits(8).unwrap(), 127);
    }

    #[test]
    fn test_read_signed_big_int() {
        let mut reader = BitReader::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0xF0]);
        assert_eq!(reader.read_big_int(40).unwrap(), BigInt::from(-16));
    }

    #[test]
    fn test_read_big_uint_unaligned() {
        let mut reader = BitReader::new(&[0b0000_0001, 0x23, 0x45, 0x67, 0x89, 0b1010_0000]);
        reader.skip_bits(4).unwrap();
        let value = reader.read_big_uint(39).unwrap();
        assert_eq!(value, BigUint::from(0x1_2345_6789u64) << 3 | BigUint::from(5u8));
        assert_eq!(reader.bit_position(), 43);
    }

    #[test]
    fn test_read_byte_unaligned() {
        let mut reader = BitReader::new(&[0, 0xFF, 0xFF, 0xFF, 0xF0]);
        reader.skip_bits(2).unwrap();
        assert_eq!(reader.read_byte().unwrap(), 3);
    }

    #[test]
    fn test_read_zero_terminated_string() {
        let mut reader = BitReader::new(b"Hamburg\0rest");
        assert_eq!(reader.read_zero_terminated_string().unwrap(), "Hamburg");
        assert_eq!(reader.byte_position(), 8);

        let mut reader = BitReader::new(b"open");
        assert!(matches!(
            reader.read_zero_terminated_string(),
            Err(StreamError::Truncated { .. })
        ));
    }

    #[test]
    fn test_align_to() {
        let mut reader = BitReader::new(&[0b11111111]);
        reader.skip_bits(2).unwrap();

        reader.align_to(4).unwrap();
        assert_eq!(reader.bit_position(), 4);

        reader.align_to(4).unwrap();
        assert_eq!(reader.bit_position(), 4);

        reader.byte_align().unwrap();
        assert_eq!(reader.bit_position(), 8);
    }

    #[test]
    fn test_mark_reset() {
        let mut reader = BitReader::new(&[0x0B, 0x07]);
        let mark = reader.mark();
        assert_eq!(reader.read_bits(8).unwrap(), 0x0B);
        reader.reset(mark).unwrap();
        assert_eq!(reader.read_bits(16).unwrap(), 0x0B07);
    }

    #[test]
    fn test_reset_before_flushed_prefix() {
        let mut reader = BitReader::new(&[1, 2, 3]);
        let mark = reader.mark();
        reader.read_bytes(2).unwrap();
        reader.flush();
        assert_eq!(
            reader.reset(mark).unwrap_err(),
            StreamError::PositionOutOfRange {
                position: 0,
                lower: 16,
                upper: 24
            }
        );
    }

    #[test]
    fn test_with_range() {
        let data = [9, 1, 2, 3, 9];
        let mut reader = BitReader::with_range(&data, 1, 3).unwrap();
        assert_eq!(reader.read_bytes(3).unwrap(), vec![1, 2, 3]);
        assert!(reader.read_byte().is_err());

        assert!(BitReader::with_range(&data, 4, 2).is_err());
    }

    #[test]
    fn test_sign_extend() {
        assert_eq!(sign_extend(0b11111111, 8), -1);
        assert_eq!(sign_extend(0b01111111, 8), 127);
        assert_eq!(sign_extend(u64::MAX, 64), -1);
    }

    #[test]
    fn test_write_bits() {
        let mut writer = BitWriter::new();
        writer.write_bits(3, 2).unwrap();
        writer.write_bits(48, 11).unwrap();
        writer.write_bits(5, 3).unwrap();
        assert_eq!(writer.as_bytes(), &[0b11_000001, 0b10000_101]);
    }

    #[test]
    fn test_write_partial_byte_is_zero_padded() {
        let mut writer = BitWriter::new();
        writer.write_bits(0b101, 3).unwrap();
        assert_eq!(writer.bit_position(), 3);
        assert_eq!(writer.into_bytes(), vec![0b1010_0000]);
    }

    #[test]
    fn test_write_signed_bits() {
        let mut writer = BitWriter::new();
        writer.write_signed_bits(-100_000, 32).unwrap();
        assert_eq!(writer.as_bytes(), &(-100_000i32).to_be_bytes());
    }

    #[test]
    fn test_write_big_int() {
        let mut writer = BitWriter::new();
        writer.write_big_int(&BigInt::from(-16), 40);
        assert_eq!(writer.as_bytes(), &[0xFF, 0xFF, 0xFF, 0xFF, 0xF0]);

        let mut writer = BitWriter::new();
        writer.write_bits(1, 1).unwrap();
        writer.write_big_uint(&BigUint::from(u128::MAX), 100);
        let bytes = writer.into_bytes();
        let mut reader = BitReader::new(&bytes);
        assert_eq!(reader.read_bits(1).unwrap(), 1);
        assert_eq!(
            reader.read_big_uint(100).unwrap(),
            (BigUint::one() << 100usize) - BigUint::one()
        );
    }

    #[test]
    fn test_write_zero_terminated_string() {
        let mut writer = BitWriter::new();
        writer.write_zero_terminated_string("Hi");
        assert_eq!(writer.as_bytes(), b"Hi\0");
    }

    #[test]
    fn test_writer_align_to() {
        let mut writer = BitWriter::new();
        writer.write_bits(1, 1).unwrap();
        writer.align_to(16);
        assert_eq!(writer.bit_position(), 16);
        writer.align_to(16);
        assert_eq!(writer.bit_position(), 16);
        assert_eq!(writer.as_bytes(), &[0x80, 0x00]);
    }

    #[test]
    fn test_write_bytes_unaligned() {
        let mut writer = BitWriter::new();
        writer.write_bits(0, 4).unwrap();
        writer.write_bytes(&[0xAB, 0xCD]);
        writer.write_bits(0xF, 4).unwrap();
        assert_eq!(writer.as_bytes(), &[0x0A, 0xBC, 0xDF]);
    }

    proptest! {
        #[test]
        fn test_bit_accounting(fields in prop::collection::vec((any::<u64>(), 1usize..=64), 0..32)) {
            let mut writer = BitWriter::new();
            for (value, n) in &fields {
                writer.write_bits(*value, *n).unwrap();
            }

            let total: usize = fields.iter().map(|(_, n)| n).sum();
            prop_assert_eq!(writer.bit_position(), total as u64);

            let bytes = writer.into_bytes();
            let mut reader = BitReader::new(&bytes);
            for (value, n) in &fields {
                prop_assert_eq!(reader.read_bits(*n).unwrap(), value & low_mask(*n));
            }
        }

        #[test]
        fn test_align_idempotent(skip in 0u64..64, align in 1u64..32) {
            let data = [0u8; 32];
            let mut reader = BitReader::new(&data);
            reader.skip_bits(skip).unwrap();
            reader.align_to(align).unwrap();
            let first = reader.bit_position();
            reader.align_to(align).unwrap();
            prop_assert_eq!(reader.bit_position(), first);
            prop_assert_eq!(first % align, 0);

            let mut writer = BitWriter::new();
            writer.skip_bits(skip);
            writer.align_to(align);
            let first = writer.bit_position();
            writer.align_to(align);
            prop_assert_eq!(writer.bit_position(), first);
        }
    }
}
