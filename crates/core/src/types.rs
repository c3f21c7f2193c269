//! Frame and conversation identity types

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

/// Address family of a captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

/// One side of a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointAddr {
    pub ip: IpAddr,
    pub port: u16,
}

impl EndpointAddr {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }
}

impl std::fmt::Display for EndpointAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// A raw captured frame, as handed over by the capture collaborator.
///
/// Consumed exactly once by the dissection engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFrame {
    pub timestamp: DateTime<Utc>,
    pub source: EndpointAddr,
    pub dest: EndpointAddr,
    pub family: AddressFamily,
    pub payload: Bytes,
}

impl RawFrame {
    pub fn new(source: EndpointAddr, dest: EndpointAddr, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        let family = match source.ip {
            IpAddr::V4(_) => AddressFamily::Ipv4,
            IpAddr::V6(_) => AddressFamily::Ipv6,
        };
        Self {
            timestamp: Utc::now(),
            source,
            dest,
            family,
            payload,
        }
    }
}

/// Order-normalized endpoint pair identifying a conversation.
///
/// Frames in either direction between the same two endpoints map to the same
/// key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    pub lower: EndpointAddr,
    pub upper: EndpointAddr,
}

impl ConversationKey {
    pub fn of(frame: &RawFrame) -> Self {
        Self::between(frame.source, frame.dest)
    }

    pub fn between(a: EndpointAddr, b: EndpointAddr) -> Self {
        if (a.ip, a.port) <= (b.ip, b.port) {
            Self { lower: a, upper: b }
        } else {
            Self { lower: b, upper: a }
        }
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.lower, self.upper)
    }
}

/// Direction of a frame relative to the conversation's first observed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    FromInitiator,
    ToInitiator,
}

/// Identity of one frame within one conversation.
///
/// Attached to every dissection result and diagnostic checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameMeta {
    pub conversation: Uuid,
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
}

/// Error metadata attached to the frame that produced it.
///
/// Surfaced to subscribers alongside whatever was decoded before the failure;
/// never dropped invisibly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameError {
    /// Bit offset of the cursor when the error was raised
    pub offset_bits: u64,
    pub detail: String,
}

impl FrameError {
    pub fn new(offset_bits: u64, detail: impl Into<String>) -> Self {
        Self {
            offset_bits,
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ep(last: u8, port: u16) -> EndpointAddr {
        EndpointAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, last)), port)
    }

    #[test]
    fn test_key_is_direction_agnostic() {
        let a = ep(1, 50000);
        let b = ep(2, 2048);
        assert_eq!(ConversationKey::between(a, b), ConversationKey::between(b, a));
    }

    #[test]
    fn test_key_distinguishes_ports() {
        let a = ep(1, 50000);
        assert_ne!(
            ConversationKey::between(a, ep(2, 2048)),
            ConversationKey::between(a, ep(2, 2049))
        );
    }

    #[test]
    fn test_raw_frame_family() {
        let frame = RawFrame::new(ep(1, 1), ep(2, 2), vec![0u8; 4]);
        assert_eq!(frame.family, AddressFamily::Ipv4);
    }
}
