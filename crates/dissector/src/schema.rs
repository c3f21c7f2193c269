//! Replication property schema
//!
//! Schema items come from an external, versioned catalog loaded at startup
//! (loading itself is out of scope). Declared type names are validated into
//! a closed [`PropertyType`] at catalog load time; an unrecognized name is a
//! load-time error, never a decode-time fallback.

use crate::error::{DissectError, DissectResult};
use serde::{Deserialize, Serialize};

/// Closed set of declared property types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    Bool,
    String,
    ProtectedString,
    BinaryString,
    Int,
    Float,
    Double,
    Axes,
    Faces,
    BrickColor,
    Object,
    UDim,
    UDim2,
    Vector2,
    Vector3,
    Vector2Uint16,
    Vector3Uint16,
    Ray,
    Color3,
    Color3Uint8,
    CoordinateFrame,
    Content,
    SystemAddress,
    Enum,
}

impl PropertyType {
    /// Map a catalog type name to its closed type, using the catalog's
    /// spelling of each name.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => Self::Bool,
            "string" => Self::String,
            "ProtectedString" => Self::ProtectedString,
            "BinaryString" => Self::BinaryString,
            "int" => Self::Int,
            "float" => Self::Float,
            "double" => Self::Double,
            "Axes" => Self::Axes,
            "Faces" => Self::Faces,
            "BrickColor" => Self::BrickColor,
            "Object" => Self::Object,
            "UDim" => Self::UDim,
            "UDim2" => Self::UDim2,
            "Vector2" => Self::Vector2,
            "Vector3" => Self::Vector3,
            "Vector2uint16" => Self::Vector2Uint16,
            "Vector3uint16" => Self::Vector3Uint16,
            "Ray" => Self::Ray,
            "Color3" => Self::Color3,
            "Color3uint8" => Self::Color3Uint8,
            "CoordinateFrame" => Self::CoordinateFrame,
            "Content" => Self::Content,
            "SystemAddress" => Self::SystemAddress,
            _ => return None,
        })
    }

    /// String-typed fields use the join-aware reference mechanism and are
    /// grouped into the STRINGS round.
    pub fn is_string_typed(self) -> bool {
        matches!(
            self,
            Self::Object
                | Self::String
                | Self::ProtectedString
                | Self::BinaryString
                | Self::SystemAddress
                | Self::Content
        )
    }
}

/// Immutable descriptor of one replicable field.
///
/// Loaded once at startup and shared read-only (behind `Arc`) by every
/// conversation's decodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySchemaItem {
    pub name: String,
    pub prop_type: PropertyType,
    pub is_enum: bool,
    /// Bit width of the enum value, when `is_enum` is set
    pub enum_bits: u32,
    pub replicates: bool,
}

impl PropertySchemaItem {
    /// Validate a catalog entry into a schema item.
    ///
    /// Enum-flagged fields ignore the declared type name and are decoded
    /// through the generic enum decoder with the declared bit width.
    pub fn new(
        name: impl Into<String>,
        type_name: &str,
        is_enum: bool,
        enum_bits: u32,
        replicates: bool,
    ) -> DissectResult<Self> {
        let name = name.into();
        let prop_type = if is_enum {
            if enum_bits == 0 || enum_bits > 64 {
                return Err(DissectError::schema(format!(
                    "field {name}: enum bit width {enum_bits} out of range"
                )));
            }
            PropertyType::Enum
        } else {
            PropertyType::from_name(type_name).ok_or_else(|| {
                DissectError::schema(format!(
                    "field {name}: unknown declared type {type_name:?}"
                ))
            })?
        };
        Ok(Self {
            name,
            prop_type,
            is_enum,
            enum_bits,
            replicates,
        })
    }

    pub fn is_string_typed(&self) -> bool {
        self.prop_type.is_string_typed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_type_names() {
        assert_eq!(
            PropertyType::from_name("Vector3uint16"),
            Some(PropertyType::Vector3Uint16)
        );
        assert_eq!(PropertyType::from_name("bool"), Some(PropertyType::Bool));
        assert_eq!(PropertyType::from_name("Rotation2D"), None);
    }

    #[test]
    fn test_unknown_name_is_load_time_error() {
        let err = PropertySchemaItem::new("Health", "Gibberish", false, 0, true).unwrap_err();
        assert!(matches!(err, DissectError::Schema(_)));
    }

    #[test]
    fn test_enum_flag_overrides_name() {
        let schema = PropertySchemaItem::new("Material", "Enum<Material>", true, 6, true).unwrap();
        assert_eq!(schema.prop_type, PropertyType::Enum);
        assert!(!schema.is_string_typed());
    }

    #[test]
    fn test_enum_bit_width_validated() {
        assert!(PropertySchemaItem::new("M", "x", true, 0, true).is_err());
        assert!(PropertySchemaItem::new("M", "x", true, 65, true).is_err());
    }

    #[test]
    fn test_string_typed_classification() {
        for name in [
            "Object",
            "string",
            "ProtectedString",
            "BinaryString",
            "SystemAddress",
            "Content",
        ] {
            assert!(PropertyType::from_name(name).unwrap().is_string_typed());
        }
        for name in ["bool", "int", "Vector3", "CoordinateFrame", "BrickColor"] {
            assert!(!PropertyType::from_name(name).unwrap().is_string_typed());
        }
    }
}
