//! Bit-cursor reader over a captured payload

use crate::error::{CodecError, CodecResult};
use crate::values::*;

/// Maximum byte count of a continuation-bit varint (64 payload bits)
const MAX_VARINT_BYTES: u32 = 10;

/// Reader with an explicit bit cursor over a byte buffer.
///
/// Bits are consumed most-significant first within each byte. Every read
/// checks the remaining bit budget up front and fails with
/// [`CodecError::BufferUnderrun`] instead of reading out of bounds. A failed
/// primitive read (`read_bool`, `read_bits` and the fixed-width integers)
/// leaves the cursor where it was; composite reads may have consumed their
/// leading fields before failing.
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current cursor position in bits
    pub fn bit_offset(&self) -> usize {
        self.pos
    }

    /// Bits left before the end of the buffer
    pub fn remaining_bits(&self) -> usize {
        self.data.len() * 8 - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining_bits() == 0
    }

    fn require(&self, bits: usize) -> CodecResult<()> {
        if self.remaining_bits() < bits {
            return Err(CodecError::underrun(bits, self.remaining_bits()));
        }
        Ok(())
    }

    /// Read a single bit
    pub fn read_bool(&mut self) -> CodecResult<bool> {
        self.require(1)?;
        let byte = self.data[self.pos / 8];
        let bit = (byte >> (7 - self.pos % 8)) & 1;
        self.pos += 1;
        Ok(bit != 0)
    }

    /// Read `n` bits (n <= 64) as an unsigned integer, most-significant first
    pub fn read_bits(&mut self, n: u32) -> CodecResult<u64> {
        debug_assert!(n <= 64);
        self.require(n as usize)?;
        let mut value = 0u64;
        for _ in 0..n {
            let byte = self.data[self.pos / 8];
            let bit = (byte >> (7 - self.pos % 8)) & 1;
            value = (value << 1) | bit as u64;
            self.pos += 1;
        }
        Ok(value)
    }

    /// Read `n` bits as a sign-extended integer
    pub fn read_bits_signed(&mut self, n: u32) -> CodecResult<i64> {
        let raw = self.read_bits(n)?;
        if n == 0 || n == 64 {
            return Ok(raw as i64);
        }
        let sign_bit = 1u64 << (n - 1);
        if raw & sign_bit != 0 {
            Ok((raw | !(sign_bit | (sign_bit - 1))) as i64)
        } else {
            Ok(raw as i64)
        }
    }

    pub fn read_u8(&mut self) -> CodecResult<u8> {
        Ok(self.read_bits(8)? as u8)
    }

    pub fn read_u16(&mut self) -> CodecResult<u16> {
        Ok(self.read_bits(16)? as u16)
    }

    pub fn read_u32(&mut self) -> CodecResult<u32> {
        Ok(self.read_bits(32)? as u32)
    }

    pub fn read_u64(&mut self) -> CodecResult<u64> {
        self.read_bits(64)
    }

    pub fn read_i32(&mut self) -> CodecResult<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_bytes(&mut self, count: usize) -> CodecResult<Vec<u8>> {
        // count comes from wire-supplied lengths; count * 8 may overflow
        if count > self.remaining_bits() / 8 {
            return Err(CodecError::underrun(
                count.saturating_mul(8),
                self.remaining_bits(),
            ));
        }
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.read_bits(8)? as u8);
        }
        Ok(out)
    }

    /// Read a packed unsigned integer: 7-bit chunks, continuation bit set on
    /// every chunk but the last, least-significant chunk first.
    pub fn read_uvarint(&mut self) -> CodecResult<u64> {
        let mut value = 0u64;
        let mut shift = 0u32;
        for i in 0..MAX_VARINT_BYTES {
            let chunk = self.read_bits(8)? as u8;
            let payload = (chunk & 0x7F) as u64;
            if shift == 63 && payload > 1 {
                return Err(CodecError::invalid("varint overflows 64 bits"));
            }
            value |= payload << shift;
            if chunk & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if i == MAX_VARINT_BYTES - 1 {
                break;
            }
        }
        Err(CodecError::invalid("varint longer than 10 bytes"))
    }

    /// Read a packed signed integer (zigzag over [`read_uvarint`])
    pub fn read_varint(&mut self) -> CodecResult<i64> {
        let raw = self.read_uvarint()?;
        Ok(((raw >> 1) as i64) ^ -((raw & 1) as i64))
    }

    /// Read a packed float: 8-bit exponent field first, a zero field stands
    /// for exactly 0.0; otherwise sign bit then 23 raw mantissa bits.
    pub fn read_pfloat(&mut self) -> CodecResult<f32> {
        let exponent = self.read_bits(8)? as u32;
        if exponent == 0 {
            return Ok(0.0);
        }
        let sign = self.read_bool()? as u32;
        let mantissa = self.read_bits(23)? as u32;
        Ok(f32::from_bits((sign << 31) | (exponent << 23) | mantissa))
    }

    /// Read a packed double: 11-bit exponent field, then sign + 52-bit
    /// mantissa unless the exponent field was zero.
    pub fn read_pdouble(&mut self) -> CodecResult<f64> {
        let exponent = self.read_bits(11)?;
        if exponent == 0 {
            return Ok(0.0);
        }
        let sign = self.read_bool()? as u64;
        let mantissa = self.read_bits(52)?;
        Ok(f64::from_bits((sign << 63) | (exponent << 52) | mantissa))
    }

    /// Read a length-prefixed UTF-8 string (uvarint byte length + raw bytes)
    pub fn read_string(&mut self) -> CodecResult<String> {
        let len = self.read_uvarint()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes).map_err(|e| CodecError::invalid(format!("invalid UTF-8: {e}")))
    }

    /// Read an obfuscated length-prefixed string.
    ///
    /// Layout is provisional: uvarint byte length, then bytes masked with a
    /// rolling XOR keystream `0x5A ^ index`.
    pub fn read_protected_string(&mut self) -> CodecResult<String> {
        let len = self.read_uvarint()? as usize;
        let mut bytes = self.read_bytes(len)?;
        for (i, b) in bytes.iter_mut().enumerate() {
            *b ^= 0x5A ^ (i as u8);
        }
        String::from_utf8(bytes).map_err(|e| CodecError::invalid(format!("invalid UTF-8: {e}")))
    }

    /// Read a binary string, which carries its own length encoding: a raw
    /// u32 byte count followed by the bytes.
    pub fn read_binary_string(&mut self) -> CodecResult<Vec<u8>> {
        let len = self.read_u32()? as usize;
        self.read_bytes(len)
    }

    pub fn read_vector2(&mut self) -> CodecResult<Vector2> {
        Ok(Vector2 {
            x: self.read_pfloat()?,
            y: self.read_pfloat()?,
        })
    }

    pub fn read_vector3(&mut self) -> CodecResult<Vector3> {
        Ok(Vector3 {
            x: self.read_pfloat()?,
            y: self.read_pfloat()?,
            z: self.read_pfloat()?,
        })
    }

    pub fn read_vector2_uint16(&mut self) -> CodecResult<Vector2Uint16> {
        Ok(Vector2Uint16 {
            x: self.read_u16()?,
            y: self.read_u16()?,
        })
    }

    pub fn read_vector3_uint16(&mut self) -> CodecResult<Vector3Uint16> {
        Ok(Vector3Uint16 {
            x: self.read_u16()?,
            y: self.read_u16()?,
            z: self.read_u16()?,
        })
    }

    pub fn read_color3(&mut self) -> CodecResult<Color3> {
        Ok(Color3 {
            r: self.read_pfloat()?,
            g: self.read_pfloat()?,
            b: self.read_pfloat()?,
        })
    }

    pub fn read_color3_uint8(&mut self) -> CodecResult<Color3Uint8> {
        Ok(Color3Uint8 {
            r: self.read_u8()?,
            g: self.read_u8()?,
            b: self.read_u8()?,
        })
    }

    /// Read a 7-bit palette index
    pub fn read_brick_color(&mut self) -> CodecResult<BrickColor> {
        Ok(BrickColor(self.read_bits(7)? as u8))
    }

    pub fn read_udim(&mut self) -> CodecResult<UDim> {
        Ok(UDim {
            scale: self.read_pfloat()?,
            offset: self.read_i32()?,
        })
    }

    pub fn read_udim2(&mut self) -> CodecResult<UDim2> {
        Ok(UDim2 {
            x: self.read_udim()?,
            y: self.read_udim()?,
        })
    }

    pub fn read_axes(&mut self) -> CodecResult<Axes> {
        let bits = self.read_bits(3)?;
        Ok(Axes {
            x: bits & 0b100 != 0,
            y: bits & 0b010 != 0,
            z: bits & 0b001 != 0,
        })
    }

    pub fn read_faces(&mut self) -> CodecResult<Faces> {
        let bits = self.read_bits(6)?;
        Ok(Faces {
            right: bits & 0b100000 != 0,
            top: bits & 0b010000 != 0,
            back: bits & 0b001000 != 0,
            left: bits & 0b000100 != 0,
            bottom: bits & 0b000010 != 0,
            front: bits & 0b000001 != 0,
        })
    }

    pub fn read_ray(&mut self) -> CodecResult<Ray> {
        Ok(Ray {
            origin: self.read_vector3()?,
            direction: self.read_vector3()?,
        })
    }

    /// Read a coordinate frame: packed position, then a rotation id byte.
    /// Id 0 announces a raw 9-float matrix; 1..=36 is a canned orientation;
    /// anything else is outside the domain.
    pub fn read_cframe(&mut self) -> CodecResult<CFrame> {
        let position = self.read_vector3()?;
        let id = self.read_u8()?;
        let rotation = if id == 0 {
            let mut matrix = [0f32; 9];
            for cell in matrix.iter_mut() {
                *cell = f32::from_bits(self.read_u32()?);
            }
            Rotation::Matrix(matrix)
        } else if id <= Rotation::MAX_ORIENTATION {
            Rotation::Orientation(id)
        } else {
            return Err(CodecError::invalid(format!("rotation id {id} out of range")));
        };
        Ok(CFrame { position, rotation })
    }
}
