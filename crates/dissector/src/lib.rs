//! Game protocol dissection engine
//!
//! Turns raw captured frames into typed packets and schema-driven replicated
//! properties, grouped into per-endpoint-pair conversations. The engine is a
//! passive dissector over supplied bytes; capture acquisition and
//! presentation are external collaborators.

pub mod capture;
pub mod context;
pub mod conversation;
pub mod error;
pub mod registry;
pub mod replication;
pub mod schema;

pub use capture::{CaptureSession, ConversationHandle, FrameSource, HttpHandle, SessionStats};
pub use context::{CommunicationContext, ObjectRef};
pub use conversation::{Conversation, DissectedFrame, HttpConversation};
pub use error::{DissectError, DissectResult};
pub use registry::{Packet, PacketRegistry};
pub use replication::{PropertyError, PropertyValue, ReplicationProperty, Round};
pub use schema::{PropertySchemaItem, PropertyType};
