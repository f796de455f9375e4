//! Bit-granular reading over a byte slice, plus the 40-bit packed quaternion
//! decode used by spline-compressed rotation channels.
//!
//! The reader is strictly forward and single-pass: it buffers at most one word
//! and cannot seek or rewind.

use crate::error::Error;
use glam::Quat;

/// Width of the word pulled from the underlying bytes when the bit buffer
/// runs dry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WordSize {
    Bits8,
    Bits16,
    Bits32,
    Bits64,
}

impl WordSize {
    fn bytes(self) -> usize {
        match self {
            Self::Bits8 => 1,
            Self::Bits16 => 2,
            Self::Bits32 => 4,
            Self::Bits64 => 8,
        }
    }

    fn bits(self) -> u32 {
        self.bytes() as u32 * 8
    }
}

/// Byte order applied when assembling each word from the underlying bytes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WordOrder {
    LittleEndian,
    BigEndian,
}

/// Order in which bits are drained from an assembled word.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BitOrder {
    MsbFirst,
    LsbFirst,
}

#[derive(Clone, Debug)]
pub struct BitReader<'a> {
    bytes: &'a [u8],
    cursor: usize,
    word: WordSize,
    word_order: WordOrder,
    bit_order: BitOrder,
    buffer: u64,
    bits_left: u32,
}

impl<'a> BitReader<'a> {
    pub fn new(bytes: &'a [u8], word: WordSize, word_order: WordOrder, bit_order: BitOrder) -> Self {
        Self {
            bytes,
            cursor: 0,
            word,
            word_order,
            bit_order,
            buffer: 0,
            bits_left: 0,
        }
    }

    fn refill(&mut self) -> Result<(), Error> {
        let end = self.cursor + self.word.bytes();
        if end > self.bytes.len() {
            return Err(Error::UnexpectedEof {
                offset: self.cursor,
            });
        }
        let chunk = &self.bytes[self.cursor..end];
        self.cursor = end;

        let mut word = 0u64;
        match self.word_order {
            WordOrder::LittleEndian => {
                for (i, &b) in chunk.iter().enumerate() {
                    word |= u64::from(b) << (8 * i);
                }
            }
            WordOrder::BigEndian => {
                for &b in chunk {
                    word = (word << 8) | u64::from(b);
                }
            }
        }
        self.buffer = word;
        self.bits_left = self.word.bits();
        Ok(())
    }

    /// Reads a single bit.
    pub fn read_bit(&mut self) -> Result<bool, Error> {
        if self.bits_left == 0 {
            self.refill()?;
        }
        self.bits_left -= 1;
        let bit = match self.bit_order {
            BitOrder::MsbFirst => {
                let width = self.word.bits();
                let bit = (self.buffer >> (width - 1)) & 1;
                let mask = if width == 64 {
                    u64::MAX
                } else {
                    (1u64 << width) - 1
                };
                self.buffer = (self.buffer << 1) & mask;
                bit
            }
            BitOrder::LsbFirst => {
                let bit = self.buffer & 1;
                self.buffer >>= 1;
                bit
            }
        };
        Ok(bit != 0)
    }

    /// Reads `n` bits (`n` ≤ 32) packed into an unsigned integer.
    ///
    /// MSB-first mode packs big-endian (each new bit becomes the low bit of
    /// the accumulator); LSB-first mode packs little-endian (bit `i` lands at
    /// position `i`).
    pub fn read_bits(&mut self, n: u32) -> Result<u32, Error> {
        debug_assert!(n <= 32);
        let mut value = 0u32;
        match self.bit_order {
            BitOrder::MsbFirst => {
                for _ in 0..n {
                    value = (value << 1) | u32::from(self.read_bit()?);
                }
            }
            BitOrder::LsbFirst => {
                for i in 0..n {
                    value |= u32::from(self.read_bit()?) << i;
                }
            }
        }
        Ok(value)
    }

    /// Discards `n` bits.
    pub fn skip(&mut self, n: u32) -> Result<(), Error> {
        for _ in 0..n {
            self.read_bit()?;
        }
        Ok(())
    }
}

/// Zero point of the three unsigned 12-bit quaternion components.
const QUAT_COMPONENT_BIAS: i32 = 0x801;
/// Fixed-point step mapping a centered 12-bit component into roughly [-1, 1].
const QUAT_COMPONENT_SCALE: f32 = 0.000_345_436;

/// Decodes one 40-bit packed quaternion.
///
/// Layout, LSB-first: 12-bit x, 12-bit y, 12-bit z, 2-bit shift, 1 sign bit,
/// 1 unused bit. The encoder drops the largest-magnitude component and rotates
/// the remaining three into the low slots; `shift` records how far to rotate
/// them back, so the reconstructed component does not always land on w.
pub fn read_packed_quaternion(reader: &mut BitReader<'_>) -> Result<Quat, Error> {
    let x = reader.read_bits(12)? as i32;
    let y = reader.read_bits(12)? as i32;
    let z = reader.read_bits(12)? as i32;
    let shift = reader.read_bits(2)? as usize;
    let invert = reader.read_bit()?;
    reader.skip(1)?;

    let fx = (x - QUAT_COMPONENT_BIAS) as f32 * QUAT_COMPONENT_SCALE;
    let fy = (y - QUAT_COMPONENT_BIAS) as f32 * QUAT_COMPONENT_SCALE;
    let fz = (z - QUAT_COMPONENT_BIAS) as f32 * QUAT_COMPONENT_SCALE;

    let dot = fx * fx + fy * fy + fz * fz;
    let mut w = (1.0 - dot).max(0.0).sqrt();
    if invert {
        w = -w;
    }

    let mut q = [fx, fy, fz, w];
    for i in 0..(3 - shift) {
        q.swap(3 - i, 2 - i);
    }
    Ok(Quat::from_xyzw(q[0], q[1], q[2], q[3]))
}
