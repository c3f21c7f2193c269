//! Structured value types carried by the wire format

use serde::{Deserialize, Serialize};

/// 2D vector with packed-float components
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

/// 3D vector with packed-float components
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// 2D vector with raw 16-bit components
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vector2Uint16 {
    pub x: u16,
    pub y: u16,
}

/// 3D vector with raw 16-bit components
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vector3Uint16 {
    pub x: u16,
    pub y: u16,
    pub z: u16,
}

/// RGB color with packed-float channels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Color3 {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

/// RGB color as a raw byte triple
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color3Uint8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Palette color, transmitted as a 7-bit index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrickColor(pub u8);

impl BrickColor {
    /// Largest encodable palette index
    pub const MAX_INDEX: u8 = 0x7F;
}

/// Scale + offset pair for one screen dimension
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UDim {
    pub scale: f32,
    pub offset: i32,
}

/// Two-axis UDim pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UDim2 {
    pub x: UDim,
    pub y: UDim,
}

/// Axis bitmask (3 bits on the wire, order x, y, z)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Axes {
    pub x: bool,
    pub y: bool,
    pub z: bool,
}

/// Face bitmask (6 bits on the wire)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Faces {
    pub right: bool,
    pub top: bool,
    pub back: bool,
    pub left: bool,
    pub bottom: bool,
    pub front: bool,
}

/// Origin + direction ray
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Ray {
    pub origin: Vector3,
    pub direction: Vector3,
}

/// Rotation part of a coordinate frame.
///
/// On the wire this is an id byte: 0 announces a raw 9-float matrix,
/// 1..=36 selects a canned axis-aligned orientation. Id 1 is the identity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Rotation {
    Matrix([f32; 9]),
    Orientation(u8),
}

impl Rotation {
    /// Highest valid canned orientation id
    pub const MAX_ORIENTATION: u8 = 36;
}

impl Default for Rotation {
    fn default() -> Self {
        Rotation::Orientation(1)
    }
}

/// Position + rotation transform
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CFrame {
    pub position: Vector3,
    pub rotation: Rotation,
}
