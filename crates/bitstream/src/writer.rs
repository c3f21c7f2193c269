//! Bit-cursor writer, the exact inverse of [`BitReader`](crate::BitReader)

use crate::error::{CodecError, CodecResult};
use crate::values::*;

/// Writer that packs values at bit granularity, most-significant bit first.
///
/// The final byte is zero-padded by [`finish`](BitWriter::finish).
#[derive(Debug, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bit_len: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bits written so far
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Consume the writer, returning the zero-padded byte buffer
    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }

    pub fn write_bool(&mut self, value: bool) -> CodecResult<()> {
        if self.bit_len % 8 == 0 {
            self.bytes.push(0);
        }
        if value {
            let idx = self.bit_len / 8;
            self.bytes[idx] |= 1 << (7 - self.bit_len % 8);
        }
        self.bit_len += 1;
        Ok(())
    }

    /// Write the low `n` bits of `value`, most-significant first
    pub fn write_bits(&mut self, value: u64, n: u32) -> CodecResult<()> {
        debug_assert!(n <= 64);
        for i in (0..n).rev() {
            self.write_bool((value >> i) & 1 != 0)?;
        }
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> CodecResult<()> {
        self.write_bits(value as u64, 8)
    }

    pub fn write_u16(&mut self, value: u16) -> CodecResult<()> {
        self.write_bits(value as u64, 16)
    }

    pub fn write_u32(&mut self, value: u32) -> CodecResult<()> {
        self.write_bits(value as u64, 32)
    }

    pub fn write_u64(&mut self, value: u64) -> CodecResult<()> {
        self.write_bits(value, 64)
    }

    pub fn write_i32(&mut self, value: i32) -> CodecResult<()> {
        self.write_u32(value as u32)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> CodecResult<()> {
        for &b in bytes {
            self.write_u8(b)?;
        }
        Ok(())
    }

    /// Write a packed unsigned integer in 7-bit continuation chunks,
    /// least-significant chunk first
    pub fn write_uvarint(&mut self, mut value: u64) -> CodecResult<()> {
        loop {
            let chunk = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                return self.write_u8(chunk);
            }
            self.write_u8(chunk | 0x80)?;
        }
    }

    /// Write a packed signed integer (zigzag)
    pub fn write_varint(&mut self, value: i64) -> CodecResult<()> {
        self.write_uvarint(((value << 1) ^ (value >> 63)) as u64)
    }

    /// Write a packed float. Zero (either sign) and subnormals canonicalize
    /// to the one-byte zero form.
    pub fn write_pfloat(&mut self, value: f32) -> CodecResult<()> {
        let bits = value.to_bits();
        let exponent = (bits >> 23) & 0xFF;
        if exponent == 0 {
            return self.write_bits(0, 8);
        }
        self.write_bits(exponent as u64, 8)?;
        self.write_bool(bits >> 31 != 0)?;
        self.write_bits((bits & 0x7F_FFFF) as u64, 23)
    }

    /// Write a packed double
    pub fn write_pdouble(&mut self, value: f64) -> CodecResult<()> {
        let bits = value.to_bits();
        let exponent = (bits >> 52) & 0x7FF;
        if exponent == 0 {
            return self.write_bits(0, 11);
        }
        self.write_bits(exponent, 11)?;
        self.write_bool(bits >> 63 != 0)?;
        self.write_bits(bits & 0xF_FFFF_FFFF_FFFF, 52)
    }

    pub fn write_string(&mut self, value: &str) -> CodecResult<()> {
        self.write_uvarint(value.len() as u64)?;
        self.write_bytes(value.as_bytes())
    }

    pub fn write_protected_string(&mut self, value: &str) -> CodecResult<()> {
        self.write_uvarint(value.len() as u64)?;
        for (i, &b) in value.as_bytes().iter().enumerate() {
            self.write_u8(b ^ 0x5A ^ (i as u8))?;
        }
        Ok(())
    }

    pub fn write_binary_string(&mut self, value: &[u8]) -> CodecResult<()> {
        self.write_u32(value.len() as u32)?;
        self.write_bytes(value)
    }

    pub fn write_vector2(&mut self, value: Vector2) -> CodecResult<()> {
        self.write_pfloat(value.x)?;
        self.write_pfloat(value.y)
    }

    pub fn write_vector3(&mut self, value: Vector3) -> CodecResult<()> {
        self.write_pfloat(value.x)?;
        self.write_pfloat(value.y)?;
        self.write_pfloat(value.z)
    }

    pub fn write_vector2_uint16(&mut self, value: Vector2Uint16) -> CodecResult<()> {
        self.write_u16(value.x)?;
        self.write_u16(value.y)
    }

    pub fn write_vector3_uint16(&mut self, value: Vector3Uint16) -> CodecResult<()> {
        self.write_u16(value.x)?;
        self.write_u16(value.y)?;
        self.write_u16(value.z)
    }

    pub fn write_color3(&mut self, value: Color3) -> CodecResult<()> {
        self.write_pfloat(value.r)?;
        self.write_pfloat(value.g)?;
        self.write_pfloat(value.b)
    }

    pub fn write_color3_uint8(&mut self, value: Color3Uint8) -> CodecResult<()> {
        self.write_u8(value.r)?;
        self.write_u8(value.g)?;
        self.write_u8(value.b)
    }

    pub fn write_brick_color(&mut self, value: BrickColor) -> CodecResult<()> {
        if value.0 > BrickColor::MAX_INDEX {
            return Err(CodecError::invalid(format!(
                "palette index {} exceeds 7 bits",
                value.0
            )));
        }
        self.write_bits(value.0 as u64, 7)
    }

    pub fn write_udim(&mut self, value: UDim) -> CodecResult<()> {
        self.write_pfloat(value.scale)?;
        self.write_i32(value.offset)
    }

    pub fn write_udim2(&mut self, value: UDim2) -> CodecResult<()> {
        self.write_udim(value.x)?;
        self.write_udim(value.y)
    }

    pub fn write_axes(&mut self, value: Axes) -> CodecResult<()> {
        let bits =
            (value.x as u64) << 2 | (value.y as u64) << 1 | value.z as u64;
        self.write_bits(bits, 3)
    }

    pub fn write_faces(&mut self, value: Faces) -> CodecResult<()> {
        let bits = (value.right as u64) << 5
            | (value.top as u64) << 4
            | (value.back as u64) << 3
            | (value.left as u64) << 2
            | (value.bottom as u64) << 1
            | value.front as u64;
        self.write_bits(bits, 6)
    }

    pub fn write_ray(&mut self, value: Ray) -> CodecResult<()> {
        self.write_vector3(value.origin)?;
        self.write_vector3(value.direction)
    }

    pub fn write_cframe(&mut self, value: CFrame) -> CodecResult<()> {
        self.write_vector3(value.position)?;
        match value.rotation {
            Rotation::Matrix(matrix) => {
                self.write_u8(0)?;
                for cell in matrix {
                    self.write_u32(cell.to_bits())?;
                }
                Ok(())
            }
            Rotation::Orientation(id) => {
                if id == 0 || id > Rotation::MAX_ORIENTATION {
                    return Err(CodecError::invalid(format!(
                        "rotation id {id} out of range"
                    )));
                }
                self.write_u8(id)
            }
        }
    }
}
