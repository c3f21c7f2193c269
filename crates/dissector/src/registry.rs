//! Application packet types and the id -> decoder registry
//!
//! Every application packet starts with a one-byte type identifier; the
//! remaining bits follow that type's fixed schema. Decoders consume exactly
//! the bits the wire format defines, so concatenated packets in one frame
//! leave the cursor on the next packet boundary.

use crate::context::CommunicationContext;
use crate::error::{DissectError, DissectResult};
use rakscope_bitstream::{BitReader, BitWriter, CodecResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Closed union over the known application packet types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    /// 0x00 - keepalive probe
    ConnectedPing { send_time: u64 },
    /// 0x03 - keepalive reply
    ConnectedPong {
        ping_send_time: u64,
        pong_send_time: u64,
    },
    /// 0x15 - disconnect with a reason code
    DisconnectionReason { reason: i32 },
    /// 0x8F - client -> server preferred spawn location name
    PreferredSpawnName { spawn_name: String },
    /// 0x90 - protocol schema version handshake with requested feature flags
    ProtocolSync {
        schema_version: u32,
        flags: Vec<String>,
    },
}

impl Packet {
    pub fn type_id(&self) -> u8 {
        match self {
            Packet::ConnectedPing { .. } => 0x00,
            Packet::ConnectedPong { .. } => 0x03,
            Packet::DisconnectionReason { .. } => 0x15,
            Packet::PreferredSpawnName { .. } => 0x8F,
            Packet::ProtocolSync { .. } => 0x90,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Packet::ConnectedPing { .. } => "ConnectedPing",
            Packet::ConnectedPong { .. } => "ConnectedPong",
            Packet::DisconnectionReason { .. } => "DisconnectionReason",
            Packet::PreferredSpawnName { .. } => "PreferredSpawnName",
            Packet::ProtocolSync { .. } => "ProtocolSync",
        }
    }

    /// Write the identifier byte followed by the payload
    pub fn serialize(&self, writer: &mut BitWriter) -> CodecResult<()> {
        writer.write_u8(self.type_id())?;
        match self {
            Packet::ConnectedPing { send_time } => writer.write_u64(*send_time),
            Packet::ConnectedPong {
                ping_send_time,
                pong_send_time,
            } => {
                writer.write_u64(*ping_send_time)?;
                writer.write_u64(*pong_send_time)
            }
            Packet::DisconnectionReason { reason } => writer.write_i32(*reason),
            Packet::PreferredSpawnName { spawn_name } => writer.write_string(spawn_name),
            Packet::ProtocolSync {
                schema_version,
                flags,
            } => {
                writer.write_u32(*schema_version)?;
                writer.write_uvarint(flags.len() as u64)?;
                for flag in flags {
                    writer.write_string(flag)?;
                }
                Ok(())
            }
        }
    }
}

type DecodeFn = fn(&mut BitReader<'_>, &mut CommunicationContext) -> DissectResult<Packet>;

struct PacketHandler {
    name: &'static str,
    decode: DecodeFn,
}

/// Maps the one-byte type identifier to its decoder
pub struct PacketRegistry {
    handlers: HashMap<u8, PacketHandler>,
}

impl PacketRegistry {
    /// Registry with all known packet types
    pub fn new() -> Self {
        let mut registry = Self {
            handlers: HashMap::new(),
        };
        registry.register(0x00, "ConnectedPing", decode_connected_ping);
        registry.register(0x03, "ConnectedPong", decode_connected_pong);
        registry.register(0x15, "DisconnectionReason", decode_disconnection_reason);
        registry.register(0x8F, "PreferredSpawnName", decode_preferred_spawn_name);
        registry.register(0x90, "ProtocolSync", decode_protocol_sync);
        registry
    }

    fn register(&mut self, id: u8, name: &'static str, decode: DecodeFn) {
        self.handlers.insert(id, PacketHandler { name, decode });
    }

    /// Name registered for an identifier, if any
    pub fn name_of(&self, id: u8) -> Option<&'static str> {
        self.handlers.get(&id).map(|h| h.name)
    }

    /// Decode one packet starting at the cursor.
    ///
    /// An identifier without a handler yields
    /// [`DissectError::UnrecognizedPacketType`]; since the payload length of
    /// an unknown type cannot be inferred, the caller discards the remainder
    /// of the frame only.
    pub fn decode(
        &self,
        reader: &mut BitReader<'_>,
        context: &mut CommunicationContext,
    ) -> DissectResult<Packet> {
        let id = reader.read_u8()?;
        let handler = self
            .handlers
            .get(&id)
            .ok_or(DissectError::UnrecognizedPacketType(id))?;
        (handler.decode)(reader, context)
    }
}

impl Default for PacketRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_connected_ping(
    reader: &mut BitReader<'_>,
    _context: &mut CommunicationContext,
) -> DissectResult<Packet> {
    Ok(Packet::ConnectedPing {
        send_time: reader.read_u64()?,
    })
}

fn decode_connected_pong(
    reader: &mut BitReader<'_>,
    _context: &mut CommunicationContext,
) -> DissectResult<Packet> {
    Ok(Packet::ConnectedPong {
        ping_send_time: reader.read_u64()?,
        pong_send_time: reader.read_u64()?,
    })
}

fn decode_disconnection_reason(
    reader: &mut BitReader<'_>,
    _context: &mut CommunicationContext,
) -> DissectResult<Packet> {
    Ok(Packet::DisconnectionReason {
        reason: reader.read_i32()?,
    })
}

fn decode_preferred_spawn_name(
    reader: &mut BitReader<'_>,
    _context: &mut CommunicationContext,
) -> DissectResult<Packet> {
    Ok(Packet::PreferredSpawnName {
        spawn_name: reader.read_string()?,
    })
}

fn decode_protocol_sync(
    reader: &mut BitReader<'_>,
    _context: &mut CommunicationContext,
) -> DissectResult<Packet> {
    let schema_version = reader.read_u32()?;
    let count = reader.read_uvarint()? as usize;
    let mut flags = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        flags.push(reader.read_string()?);
    }
    Ok(Packet::ProtocolSync {
        schema_version,
        flags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(packet: Packet) {
        let mut writer = BitWriter::new();
        packet.serialize(&mut writer).unwrap();
        let bytes = writer.finish();

        let registry = PacketRegistry::new();
        let mut ctx = CommunicationContext::new();
        let mut reader = BitReader::new(&bytes);
        let decoded = registry.decode(&mut reader, &mut ctx).unwrap();
        assert_eq!(decoded, packet);

        // decode -> serialize -> decode is structurally equal
        let mut writer = BitWriter::new();
        decoded.serialize(&mut writer).unwrap();
        assert_eq!(writer.finish(), bytes);
    }

    #[test]
    fn test_all_variants_round_trip() {
        round_trip(Packet::ConnectedPing { send_time: 123456 });
        round_trip(Packet::ConnectedPong {
            ping_send_time: 1,
            pong_send_time: u64::MAX,
        });
        round_trip(Packet::DisconnectionReason { reason: -1 });
        round_trip(Packet::PreferredSpawnName {
            spawn_name: "SpawnLocation1".to_string(),
        });
        round_trip(Packet::ProtocolSync {
            schema_version: 36,
            flags: vec!["UseNewPhysics".to_string(), String::new()],
        });
    }

    #[test]
    fn test_empty_spawn_name_consumes_two_bytes() {
        let registry = PacketRegistry::new();
        let mut ctx = CommunicationContext::new();
        let mut reader = BitReader::new(&[0x8F, 0x00]);
        let packet = registry.decode(&mut reader, &mut ctx).unwrap();
        assert_eq!(
            packet,
            Packet::PreferredSpawnName {
                spawn_name: String::new()
            }
        );
        // identifier byte + zero-length prefix, nothing more
        assert_eq!(reader.bit_offset(), 16);
    }

    #[test]
    fn test_unrecognized_identifier() {
        let registry = PacketRegistry::new();
        let mut ctx = CommunicationContext::new();
        let mut reader = BitReader::new(&[0xFE, 0xAA, 0xBB]);
        match registry.decode(&mut reader, &mut ctx) {
            Err(DissectError::UnrecognizedPacketType(0xFE)) => {}
            other => panic!("expected unrecognized type, got {other:?}"),
        }

        // A later frame decodes cleanly with the same registry and context
        let mut reader = BitReader::new(&[0x8F, 0x00]);
        assert!(registry.decode(&mut reader, &mut ctx).is_ok());
    }

    #[test]
    fn test_concatenated_packets_share_a_frame() {
        let mut writer = BitWriter::new();
        Packet::ConnectedPing { send_time: 9 }
            .serialize(&mut writer)
            .unwrap();
        Packet::DisconnectionReason { reason: 4 }
            .serialize(&mut writer)
            .unwrap();
        let bytes = writer.finish();

        let registry = PacketRegistry::new();
        let mut ctx = CommunicationContext::new();
        let mut reader = BitReader::new(&bytes);
        assert_eq!(
            registry.decode(&mut reader, &mut ctx).unwrap(),
            Packet::ConnectedPing { send_time: 9 }
        );
        assert_eq!(
            registry.decode(&mut reader, &mut ctx).unwrap(),
            Packet::DisconnectionReason { reason: 4 }
        );
        assert!(reader.is_empty());
    }

    #[test]
    fn test_truncated_payload_is_underrun() {
        let registry = PacketRegistry::new();
        let mut ctx = CommunicationContext::new();
        let mut reader = BitReader::new(&[0x00, 0x01, 0x02]);
        let err = registry.decode(&mut reader, &mut ctx).unwrap_err();
        assert!(err.is_recoverable());
    }
}
