//! Conversation tracking and per-frame dissection

use crate::context::CommunicationContext;
use crate::registry::{Packet, PacketRegistry};
use chrono::{DateTime, Utc};
use rakscope_core::{
    ConversationKey, DiagnosticSink, Direction, EndpointAddr, FrameError, FrameMeta, RawFrame,
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// Dissection result for one frame.
///
/// Errors are attached to the frame that produced them and surfaced
/// alongside whatever decoded before the failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DissectedFrame {
    pub meta: FrameMeta,
    pub packets: Vec<Packet>,
    pub errors: Vec<FrameError>,
}

impl DissectedFrame {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// All frames exchanged between one endpoint pair, plus the decode state
/// they share.
///
/// Created on the first frame of a new pair and kept for the capture
/// session. The context must never be touched while another conversation's
/// frames are being processed.
#[derive(Debug)]
pub struct Conversation {
    pub id: Uuid,
    pub key: ConversationKey,
    /// Endpoint that sent the first observed frame
    pub initiator: EndpointAddr,
    pub first_seen: DateTime<Utc>,
    pub context: CommunicationContext,
    pub frames: Vec<DissectedFrame>,
    next_index: u64,
}

impl Conversation {
    /// Create a conversation from its first frame
    pub fn new(frame: &RawFrame) -> Self {
        Self {
            id: Uuid::new_v4(),
            key: ConversationKey::of(frame),
            initiator: frame.source,
            first_seen: frame.timestamp,
            context: CommunicationContext::new(),
            frames: Vec::new(),
            next_index: 0,
        }
    }

    pub fn direction_of(&self, frame: &RawFrame) -> Direction {
        if frame.source == self.initiator {
            Direction::FromInitiator
        } else {
            Direction::ToInitiator
        }
    }

    /// Dissect one frame and append the result.
    ///
    /// Decodes concatenated packets until the payload is exhausted. Any
    /// failure stops decoding of this frame at that point; the error is
    /// recorded on the frame and the conversation carries on with the next
    /// one.
    pub fn ingest(
        &mut self,
        frame: &RawFrame,
        registry: &PacketRegistry,
        diag: &dyn DiagnosticSink,
    ) -> &DissectedFrame {
        let meta = FrameMeta {
            conversation: self.id,
            index: self.next_index,
            timestamp: frame.timestamp,
            direction: self.direction_of(frame),
        };
        self.next_index += 1;

        let mut dissected = DissectedFrame {
            meta,
            packets: Vec::new(),
            errors: Vec::new(),
        };

        let mut reader = rakscope_bitstream::BitReader::new(&frame.payload);
        while !reader.is_empty() {
            let offset = reader.bit_offset();
            match registry.decode(&mut reader, &mut self.context) {
                Ok(packet) => {
                    diag.checkpoint(&dissected.meta, packet.name(), "packet decoded");
                    dissected.packets.push(packet);
                    // A decoder that consumed nothing would loop forever
                    if reader.bit_offset() == offset {
                        break;
                    }
                }
                Err(err) => {
                    warn!(
                        conversation = %self.id,
                        frame = dissected.meta.index,
                        offset_bits = offset,
                        %err,
                        "frame dissection stopped"
                    );
                    dissected
                        .errors
                        .push(FrameError::new(offset as u64, err.to_string()));
                    break;
                }
            }
        }

        self.frames.push(dissected);
        self.frames.last().expect("frame just pushed")
    }
}

/// One parsed HTTP message head observed in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpExchange {
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub start_line: String,
    pub headers: Vec<String>,
}

/// Non-game HTTP traffic grouped by endpoint pair.
///
/// Kept apart from game conversations: no bit-level dissection applies.
#[derive(Debug)]
pub struct HttpConversation {
    pub id: Uuid,
    pub key: ConversationKey,
    pub initiator: EndpointAddr,
    pub exchanges: Vec<HttpExchange>,
}

impl HttpConversation {
    pub fn new(frame: &RawFrame) -> Self {
        Self {
            id: Uuid::new_v4(),
            key: ConversationKey::of(frame),
            initiator: frame.source,
            exchanges: Vec::new(),
        }
    }

    /// Record the message head of a frame; continuation frames without a
    /// start line are ignored.
    pub fn ingest(&mut self, frame: &RawFrame) {
        if !looks_like_http(&frame.payload) {
            return;
        }
        let text = String::from_utf8_lossy(&frame.payload);
        let mut lines = text.lines();
        let start_line = match lines.next() {
            Some(line) if !line.is_empty() => line.to_string(),
            _ => return,
        };
        let headers = lines
            .take_while(|line| !line.is_empty())
            .map(|line| line.to_string())
            .collect();
        let direction = if frame.source == self.initiator {
            Direction::FromInitiator
        } else {
            Direction::ToInitiator
        };
        self.exchanges.push(HttpExchange {
            timestamp: frame.timestamp,
            direction,
            start_line,
            headers,
        });
    }
}

/// Payload shape test for HTTP message heads
pub fn looks_like_http(payload: &[u8]) -> bool {
    const PREFIXES: [&[u8]; 8] = [
        b"GET ", b"POST ", b"PUT ", b"DELETE ", b"HEAD ", b"OPTIONS ", b"PATCH ", b"HTTP/",
    ];
    PREFIXES.iter().any(|p| payload.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rakscope_bitstream::BitWriter;
    use rakscope_core::NullSink;
    use std::net::{IpAddr, Ipv4Addr};

    fn ep(last: u8, port: u16) -> EndpointAddr {
        EndpointAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, last)), port)
    }

    fn game_frame(payload: Vec<u8>) -> RawFrame {
        RawFrame::new(ep(1, 50000), ep(2, 53640), payload)
    }

    fn spawn_name_bytes(name: &str) -> Vec<u8> {
        let mut writer = BitWriter::new();
        Packet::PreferredSpawnName {
            spawn_name: name.to_string(),
        }
        .serialize(&mut writer)
        .unwrap();
        writer.finish()
    }

    #[test]
    fn test_ingest_decodes_packets_in_order() {
        let registry = PacketRegistry::new();
        let f1 = game_frame(spawn_name_bytes("alpha"));
        let mut conv = Conversation::new(&f1);
        conv.ingest(&f1, &registry, &NullSink);
        conv.ingest(&game_frame(spawn_name_bytes("beta")), &registry, &NullSink);

        assert_eq!(conv.frames.len(), 2);
        assert_eq!(conv.frames[0].meta.index, 0);
        assert_eq!(conv.frames[1].meta.index, 1);
        assert_eq!(
            conv.frames[0].packets[0],
            Packet::PreferredSpawnName {
                spawn_name: "alpha".to_string()
            }
        );
    }

    #[test]
    fn test_bad_frame_does_not_poison_the_next() {
        let registry = PacketRegistry::new();
        let bad = game_frame(vec![0xFE, 0x01, 0x02]);
        let mut conv = Conversation::new(&bad);
        let dissected = conv.ingest(&bad, &registry, &NullSink);
        assert!(!dissected.is_clean());
        assert!(dissected.packets.is_empty());

        let good = conv.ingest(&game_frame(spawn_name_bytes("ok")), &registry, &NullSink);
        assert!(good.is_clean());
        assert_eq!(good.packets.len(), 1);
    }

    #[test]
    fn test_partial_frame_keeps_decoded_prefix() {
        let registry = PacketRegistry::new();
        let mut payload = spawn_name_bytes("kept");
        payload.push(0xFE); // unknown type after a valid packet
        let frame = game_frame(payload);
        let mut conv = Conversation::new(&frame);
        let dissected = conv.ingest(&frame, &registry, &NullSink);
        assert_eq!(dissected.packets.len(), 1);
        assert_eq!(dissected.errors.len(), 1);
        assert!(dissected.errors[0].detail.contains("0xfe"));
    }

    #[test]
    fn test_direction_tracking() {
        let out = RawFrame::new(ep(1, 50000), ep(2, 53640), vec![]);
        let back = RawFrame::new(ep(2, 53640), ep(1, 50000), vec![]);
        let conv = Conversation::new(&out);
        assert_eq!(conv.direction_of(&out), Direction::FromInitiator);
        assert_eq!(conv.direction_of(&back), Direction::ToInitiator);
    }

    #[test]
    fn test_http_head_parsing() {
        let frame = RawFrame::new(
            ep(1, 49152),
            ep(9, 80),
            b"GET /asset?id=42 HTTP/1.1\r\nHost: example.com\r\nAccept: */*\r\n\r\n".to_vec(),
        );
        let mut conv = HttpConversation::new(&frame);
        conv.ingest(&frame);
        assert_eq!(conv.exchanges.len(), 1);
        assert_eq!(conv.exchanges[0].start_line, "GET /asset?id=42 HTTP/1.1");
        assert_eq!(conv.exchanges[0].headers.len(), 2);
    }

    #[test]
    fn test_looks_like_http() {
        assert!(looks_like_http(b"HTTP/1.1 200 OK\r\n"));
        assert!(looks_like_http(b"POST /x HTTP/1.1\r\n"));
        assert!(!looks_like_http(&[0x8F, 0x00]));
    }
}
