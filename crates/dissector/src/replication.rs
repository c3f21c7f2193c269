//! Schema-driven replicated-property decoding
//!
//! The wire format groups replicated fields across instances rather than
//! per-instance, so one batch is decoded in up to four rounds: a full
//! join-data snapshot, the string-typed fields of a join batch, the
//! remaining fields of a join batch, and incremental single-property
//! updates. The round selects which fields apply and whether string-typed
//! decoders resolve references join-aware.

use crate::context::{CommunicationContext, ObjectRef};
use crate::error::DissectError;
use crate::schema::{PropertySchemaItem, PropertyType};
use rakscope_core::{DiagnosticSink, EndpointAddr, FrameMeta};
use rakscope_bitstream as wire;
use rakscope_bitstream::{BitReader, CodecResult};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use thiserror::Error;

/// Decode round of a replication batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Round {
    /// Full-state snapshot on first replication of an instance
    JoinData = 0,
    /// String-typed fields only, within a join-data batch
    Strings = 1,
    /// Non-string-typed fields, within a join-data batch
    Other = 2,
    /// Incremental single-property update
    Update = 3,
}

/// Decoded value of a replicated property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Bool(bool),
    String(String),
    ProtectedString(String),
    BinaryString(Vec<u8>),
    Int(i64),
    Float(f32),
    Double(f64),
    Axes(wire::Axes),
    Faces(wire::Faces),
    BrickColor(wire::BrickColor),
    Object(ObjectRef),
    UDim(wire::UDim),
    UDim2(wire::UDim2),
    Vector2(wire::Vector2),
    Vector3(wire::Vector3),
    Vector2Uint16(wire::Vector2Uint16),
    Vector3Uint16(wire::Vector3Uint16),
    Ray(wire::Ray),
    Color3(wire::Color3),
    Color3Uint8(wire::Color3Uint8),
    CFrame(wire::CFrame),
    Content(String),
    SystemAddress(EndpointAddr),
    Enum { value: u64, bits: u32 },
}

impl PropertyValue {
    /// The type's zero value, used when the default-bit shortcut fires
    pub fn zero_for(prop_type: PropertyType) -> Self {
        match prop_type {
            PropertyType::Bool => Self::Bool(false),
            PropertyType::String => Self::String(String::new()),
            PropertyType::ProtectedString => Self::ProtectedString(String::new()),
            PropertyType::BinaryString => Self::BinaryString(Vec::new()),
            PropertyType::Int => Self::Int(0),
            PropertyType::Float => Self::Float(0.0),
            PropertyType::Double => Self::Double(0.0),
            PropertyType::Axes => Self::Axes(wire::Axes::default()),
            PropertyType::Faces => Self::Faces(wire::Faces::default()),
            PropertyType::BrickColor => Self::BrickColor(wire::BrickColor::default()),
            PropertyType::Object => Self::Object(ObjectRef::default()),
            PropertyType::UDim => Self::UDim(wire::UDim::default()),
            PropertyType::UDim2 => Self::UDim2(wire::UDim2::default()),
            PropertyType::Vector2 => Self::Vector2(wire::Vector2::default()),
            PropertyType::Vector3 => Self::Vector3(wire::Vector3::default()),
            PropertyType::Vector2Uint16 => Self::Vector2Uint16(wire::Vector2Uint16::default()),
            PropertyType::Vector3Uint16 => Self::Vector3Uint16(wire::Vector3Uint16::default()),
            PropertyType::Ray => Self::Ray(wire::Ray::default()),
            PropertyType::Color3 => Self::Color3(wire::Color3::default()),
            PropertyType::Color3Uint8 => Self::Color3Uint8(wire::Color3Uint8::default()),
            PropertyType::CoordinateFrame => Self::CFrame(wire::CFrame::default()),
            PropertyType::Content => Self::Content(String::new()),
            PropertyType::SystemAddress => Self::SystemAddress(EndpointAddr::new(
                IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                0,
            )),
            PropertyType::Enum => Self::Enum { value: 0, bits: 0 },
        }
    }
}

/// One decoded replicated property
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationProperty {
    pub schema: Arc<PropertySchemaItem>,
    pub value: PropertyValue,
    pub is_default: bool,
}

/// Property decode failure, carrying whatever was built before the failure
/// for diagnostics.
#[derive(Error, Debug)]
#[error("decoding property {name}: {source}")]
pub struct PropertyError {
    pub name: String,
    pub partial: Option<ReplicationProperty>,
    #[source]
    pub source: DissectError,
}

impl PropertyError {
    fn new(name: &str, partial: Option<ReplicationProperty>, source: DissectError) -> Self {
        Self {
            name: name.to_string(),
            partial,
            source,
        }
    }
}

impl PropertySchemaItem {
    /// Decode this field from the bitstream for the given round.
    ///
    /// Returns `Ok(None)` when the field is silently absent: it does not
    /// replicate, or the round filter excludes it. In both cases the bit
    /// cursor does not advance.
    pub fn decode(
        self: &Arc<Self>,
        round: Round,
        reader: &mut BitReader<'_>,
        context: &mut CommunicationContext,
        meta: &FrameMeta,
        diag: &dyn DiagnosticSink,
    ) -> Result<Option<ReplicationProperty>, PropertyError> {
        if !self.replicates {
            return Ok(None);
        }
        let is_join_data = round == Round::JoinData;

        let is_string_typed = self.is_string_typed();
        if round == Round::Strings && !is_string_typed {
            return Ok(None);
        }
        // Booleans carry no default bit, so the OTHER grouping has no
        // encoding for them; they only travel in a snapshot or an update.
        if round == Round::Other && (is_string_typed || self.prop_type == PropertyType::Bool) {
            return Ok(None);
        }

        let mut property = ReplicationProperty {
            schema: Arc::clone(self),
            value: PropertyValue::zero_for(self.prop_type),
            is_default: false,
        };

        // Booleans have no default shortcut: the wire bit is the value.
        if self.prop_type == PropertyType::Bool {
            let value = reader
                .read_bool()
                .map_err(|e| PropertyError::new(&self.name, Some(property.clone()), e.into()))?;
            property.value = PropertyValue::Bool(value);
            diag.checkpoint(meta, &self.name, &format!("bool {value}"));
            return Ok(Some(property));
        }

        // Outside the update round every non-boolean field leads with an
        // is-default bit; a set bit elides the value entirely.
        if round != Round::Update {
            property.is_default = reader
                .read_bool()
                .map_err(|e| PropertyError::new(&self.name, Some(property.clone()), e.into()))?;
            if property.is_default {
                diag.checkpoint(meta, &self.name, "1 bit: default");
                return Ok(Some(property));
            }
        }

        let value = self
            .decode_value(reader, context, is_join_data)
            .map_err(|e| PropertyError::new(&self.name, Some(property.clone()), e))?;
        property.value = value;
        diag.checkpoint(meta, &self.name, &format!("{:?}", property.value));
        Ok(Some(property))
    }

    fn decode_value(
        &self,
        reader: &mut BitReader<'_>,
        context: &mut CommunicationContext,
        is_join_data: bool,
    ) -> Result<PropertyValue, DissectError> {
        let value = match self.prop_type {
            // Handled before the default bit
            PropertyType::Bool => unreachable!("bool handled by caller"),
            PropertyType::String => {
                PropertyValue::String(context.read_cached_string(reader, is_join_data)?)
            }
            PropertyType::ProtectedString => {
                PropertyValue::ProtectedString(reader.read_protected_string()?)
            }
            PropertyType::BinaryString => {
                PropertyValue::BinaryString(reader.read_binary_string()?)
            }
            PropertyType::Int => PropertyValue::Int(reader.read_varint()?),
            PropertyType::Float => PropertyValue::Float(reader.read_pfloat()?),
            PropertyType::Double => PropertyValue::Double(reader.read_pdouble()?),
            PropertyType::Axes => PropertyValue::Axes(reader.read_axes()?),
            PropertyType::Faces => PropertyValue::Faces(reader.read_faces()?),
            PropertyType::BrickColor => PropertyValue::BrickColor(reader.read_brick_color()?),
            PropertyType::Object => {
                PropertyValue::Object(context.read_object(reader, is_join_data)?)
            }
            PropertyType::UDim => PropertyValue::UDim(reader.read_udim()?),
            PropertyType::UDim2 => PropertyValue::UDim2(reader.read_udim2()?),
            PropertyType::Vector2 => PropertyValue::Vector2(reader.read_vector2()?),
            PropertyType::Vector3 => PropertyValue::Vector3(reader.read_vector3()?),
            PropertyType::Vector2Uint16 => {
                PropertyValue::Vector2Uint16(reader.read_vector2_uint16()?)
            }
            PropertyType::Vector3Uint16 => {
                PropertyValue::Vector3Uint16(reader.read_vector3_uint16()?)
            }
            PropertyType::Ray => PropertyValue::Ray(reader.read_ray()?),
            PropertyType::Color3 => PropertyValue::Color3(reader.read_color3()?),
            PropertyType::Color3Uint8 => PropertyValue::Color3Uint8(reader.read_color3_uint8()?),
            PropertyType::CoordinateFrame => PropertyValue::CFrame(reader.read_cframe()?),
            PropertyType::Content => {
                PropertyValue::Content(context.read_cached_string(reader, is_join_data)?)
            }
            PropertyType::SystemAddress => {
                PropertyValue::SystemAddress(read_system_address(reader)?)
            }
            PropertyType::Enum => {
                if !self.is_enum {
                    // The cursor cannot be trusted past this point; the
                    // caller must abort the enclosing packet.
                    return Err(DissectError::schema(format!(
                        "field {}: enum-typed schema without enum flag",
                        self.name
                    )));
                }
                PropertyValue::Enum {
                    value: reader.read_bits(self.enum_bits)?,
                    bits: self.enum_bits,
                }
            }
        };
        Ok(value)
    }
}

/// System addresses travel as a complemented IPv4 quad plus a raw port
fn read_system_address(reader: &mut BitReader<'_>) -> CodecResult<EndpointAddr> {
    let quad = reader.read_bytes(4)?;
    let port = reader.read_u16()?;
    let ip = Ipv4Addr::new(!quad[0], !quad[1], !quad[2], !quad[3]);
    Ok(EndpointAddr::new(IpAddr::V4(ip), port))
}
