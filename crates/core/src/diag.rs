//! Injectable decode diagnostics
//!
//! Decode checkpoints report through a sink supplied by the caller rather
//! than a process-wide logger, so embedding applications control where the
//! per-field trace goes.

use crate::types::FrameMeta;
use tracing::debug;

/// Sink for per-field decode checkpoints
pub trait DiagnosticSink: Send + Sync {
    /// Called once per decoded field with the frame identity, the field name
    /// and a short rendering of what was read.
    fn checkpoint(&self, meta: &FrameMeta, field: &str, detail: &str);
}

/// Forwards checkpoints to `tracing` at debug level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn checkpoint(&self, meta: &FrameMeta, field: &str, detail: &str) {
        debug!(
            conversation = %meta.conversation,
            frame = meta.index,
            field,
            detail,
            "decode checkpoint"
        );
    }
}

/// Discards all checkpoints
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn checkpoint(&self, _meta: &FrameMeta, _field: &str, _detail: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Direction;
    use std::sync::Mutex;

    struct RecordingSink(Mutex<Vec<String>>);

    impl DiagnosticSink for RecordingSink {
        fn checkpoint(&self, _meta: &FrameMeta, field: &str, detail: &str) {
            self.0.lock().unwrap().push(format!("{field}={detail}"));
        }
    }

    #[test]
    fn test_sink_is_injectable() {
        let sink = RecordingSink(Mutex::new(Vec::new()));
        let meta = FrameMeta {
            conversation: uuid::Uuid::new_v4(),
            index: 0,
            timestamp: chrono::Utc::now(),
            direction: Direction::FromInitiator,
        };
        sink.checkpoint(&meta, "Name", "\"player\"");
        assert_eq!(sink.0.lock().unwrap().as_slice(), ["Name=\"player\""]);
    }
}
