//! Capture session: conversation demultiplexing and event publication
//!
//! One session owns a single ingestion stream of raw frames, the decode
//! state of every conversation observed in it, and the capture resource
//! itself. Frames are applied to their conversation in arrival order on the
//! ingestion path; "new conversation" events go to subscribers through a
//! bounded queue drained by a dispatch thread, so a slow subscriber stalls
//! dispatch (and eventually, once the queue fills, ingestion) but never
//! loses events. Blocking rather than dropping is deliberate: a gap in a
//! conversation's event stream would break the protocol's stateful
//! reference tables.

use crate::conversation::{looks_like_http, Conversation, HttpConversation};
use crate::registry::PacketRegistry;
use crossbeam_channel::{bounded, Sender};
use dashmap::DashMap;
use rakscope_core::{ConversationKey, DiagnosticSink, RawFrame, SessionConfig, TracingSink};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{debug, info};

/// Shared handle to a game conversation
pub type ConversationHandle = Arc<Mutex<Conversation>>;
/// Shared handle to an HTTP conversation
pub type HttpHandle = Arc<Mutex<HttpConversation>>;

/// Handle to the capture collaborator supplying raw frames.
///
/// The session takes ownership and closes it exactly once, on teardown or
/// when the stream drains.
pub trait FrameSource: Send {
    /// Next frame, or `None` when the stream has drained
    fn next_frame(&mut self) -> Option<RawFrame>;

    /// Release the underlying capture resource
    fn close(&mut self) {}
}

enum SessionEvent {
    Conversation(ConversationHandle),
    Http(HttpHandle),
}

type ConversationCallback = Box<dyn Fn(ConversationHandle) + Send + Sync>;
type HttpCallback = Box<dyn Fn(HttpHandle) + Send + Sync>;

#[derive(Default)]
struct CallbackSet {
    conversation: Mutex<Vec<ConversationCallback>>,
    http: Mutex<Vec<HttpCallback>>,
}

#[derive(Default)]
struct SessionStatsInner {
    frames_ingested: AtomicU64,
    frame_errors: AtomicU64,
}

/// Session counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStats {
    pub frames_ingested: u64,
    pub frame_errors: u64,
    pub conversations: u64,
    pub http_conversations: u64,
}

/// Owns all per-conversation decode state for one capture session
pub struct CaptureSession {
    config: SessionConfig,
    registry: Arc<PacketRegistry>,
    diag: Arc<dyn DiagnosticSink>,
    conversations: DashMap<ConversationKey, ConversationHandle>,
    http_conversations: DashMap<ConversationKey, HttpHandle>,
    callbacks: Arc<CallbackSet>,
    event_sender: Option<Sender<SessionEvent>>,
    dispatch_thread: Option<thread::JoinHandle<()>>,
    source: Option<Box<dyn FrameSource>>,
    running: Arc<AtomicBool>,
    stats: Arc<SessionStatsInner>,
}

impl CaptureSession {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_diagnostics(config, Arc::new(TracingSink))
    }

    pub fn with_diagnostics(config: SessionConfig, diag: Arc<dyn DiagnosticSink>) -> Self {
        let (sender, receiver) = bounded(config.event_queue_size);
        let callbacks = Arc::new(CallbackSet::default());
        let dispatch_callbacks = Arc::clone(&callbacks);

        let handle = thread::spawn(move || {
            while let Ok(event) = receiver.recv() {
                match event {
                    SessionEvent::Conversation(conv) => {
                        for cb in dispatch_callbacks.conversation.lock().unwrap().iter() {
                            cb(Arc::clone(&conv));
                        }
                    }
                    SessionEvent::Http(conv) => {
                        for cb in dispatch_callbacks.http.lock().unwrap().iter() {
                            cb(Arc::clone(&conv));
                        }
                    }
                }
            }
            debug!("event dispatch thread finished");
        });

        info!(name = %config.name, "capture session started");
        Self {
            config,
            registry: Arc::new(PacketRegistry::new()),
            diag,
            conversations: DashMap::new(),
            http_conversations: DashMap::new(),
            callbacks,
            event_sender: Some(sender),
            dispatch_thread: Some(handle),
            source: None,
            running: Arc::new(AtomicBool::new(true)),
            stats: Arc::new(SessionStatsInner::default()),
        }
    }

    /// Subscribe to "new conversation observed" events
    pub fn on_conversation<F>(&self, callback: F)
    where
        F: Fn(ConversationHandle) + Send + Sync + 'static,
    {
        self.callbacks
            .conversation
            .lock()
            .unwrap()
            .push(Box::new(callback));
    }

    /// Subscribe to "new HTTP conversation observed" events
    pub fn on_http<F>(&self, callback: F)
    where
        F: Fn(HttpHandle) + Send + Sync + 'static,
    {
        self.callbacks.http.lock().unwrap().push(Box::new(callback));
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            frames_ingested: self.stats.frames_ingested.load(Ordering::Relaxed),
            frame_errors: self.stats.frame_errors.load(Ordering::Relaxed),
            conversations: self.conversations.len() as u64,
            http_conversations: self.http_conversations.len() as u64,
        }
    }

    /// Apply one frame to its conversation, creating the conversation on the
    /// first frame of a new endpoint pair. Frames arriving after shutdown
    /// are ignored.
    pub fn ingest(&mut self, frame: RawFrame) {
        if !self.is_running() {
            return;
        }
        self.stats.frames_ingested.fetch_add(1, Ordering::Relaxed);

        let key = ConversationKey::of(&frame);
        if self.is_http(&frame) {
            let (handle, created) = match self.http_conversations.get(&key) {
                Some(existing) => (Arc::clone(existing.value()), false),
                None => {
                    let handle = Arc::new(Mutex::new(HttpConversation::new(&frame)));
                    self.http_conversations.insert(key, Arc::clone(&handle));
                    (handle, true)
                }
            };
            if created {
                self.publish(SessionEvent::Http(Arc::clone(&handle)));
            }
            handle.lock().unwrap().ingest(&frame);
            return;
        }

        let (handle, created) = match self.conversations.get(&key) {
            Some(existing) => (Arc::clone(existing.value()), false),
            None => {
                let handle = Arc::new(Mutex::new(Conversation::new(&frame)));
                self.conversations.insert(key, Arc::clone(&handle));
                (handle, true)
            }
        };
        if created {
            self.publish(SessionEvent::Conversation(Arc::clone(&handle)));
        }

        let mut conversation = handle.lock().unwrap();
        let dissected = conversation.ingest(&frame, &self.registry, self.diag.as_ref());
        if !dissected.is_clean() {
            self.stats.frame_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Pull frames from a capture source until it drains or the session is
    /// shut down. The source is owned by the session from here on.
    pub fn capture_from(&mut self, source: Box<dyn FrameSource>) {
        self.source = Some(source);
        loop {
            if !self.is_running() {
                break;
            }
            let frame = match self.source.as_mut().and_then(|s| s.next_frame()) {
                Some(frame) => frame,
                None => break,
            };
            self.ingest(frame);
        }
        self.close_source();
    }

    /// Stop ingestion, release the capture resource and flush the event
    /// queue. Idempotent; after it returns no further events are delivered.
    pub fn shutdown(&mut self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!(name = %self.config.name, "capture session stopping");
        }
        self.close_source();
        // Dropping the sender lets the dispatch thread drain and exit
        drop(self.event_sender.take());
        if let Some(handle) = self.dispatch_thread.take() {
            let _ = handle.join();
        }
    }

    fn close_source(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.close();
        }
    }

    fn is_http(&self, frame: &RawFrame) -> bool {
        self.config.http_ports.contains(&frame.dest.port)
            || self.config.http_ports.contains(&frame.source.port)
            || looks_like_http(&frame.payload)
    }

    fn publish(&self, event: SessionEvent) {
        // Blocks when the queue is full; see the module docs for why
        if let Some(sender) = &self.event_sender {
            let _ = sender.send(event);
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Packet;
    use rakscope_bitstream::BitWriter;
    use rakscope_core::EndpointAddr;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::AtomicUsize;

    fn ep(last: u8, port: u16) -> EndpointAddr {
        EndpointAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, last)), port)
    }

    fn spawn_frame(name: &str) -> RawFrame {
        let mut writer = BitWriter::new();
        Packet::PreferredSpawnName {
            spawn_name: name.to_string(),
        }
        .serialize(&mut writer)
        .unwrap();
        RawFrame::new(ep(1, 50000), ep(2, 53640), writer.finish())
    }

    #[test]
    fn test_new_conversation_event_fires_once() {
        let mut session = CaptureSession::new(SessionConfig::default());
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        session.on_conversation(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        session.ingest(spawn_frame("a"));
        session.ingest(spawn_frame("b"));
        session.shutdown();

        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_frames_observed_in_arrival_order() {
        let mut session = CaptureSession::new(SessionConfig::default());
        let handles: Arc<Mutex<Vec<ConversationHandle>>> = Arc::default();
        let sink = Arc::clone(&handles);
        session.on_conversation(move |handle| {
            sink.lock().unwrap().push(handle);
        });

        for name in ["f1", "f2", "f3"] {
            session.ingest(spawn_frame(name));
        }
        session.shutdown();

        let handles = handles.lock().unwrap();
        assert_eq!(handles.len(), 1);
        let conversation = handles[0].lock().unwrap();
        let names: Vec<_> = conversation
            .frames
            .iter()
            .map(|f| match &f.packets[0] {
                Packet::PreferredSpawnName { spawn_name } => spawn_name.clone(),
                other => panic!("unexpected packet {other:?}"),
            })
            .collect();
        assert_eq!(names, ["f1", "f2", "f3"]);
    }

    #[test]
    fn test_http_traffic_grouped_separately() {
        let mut session = CaptureSession::new(SessionConfig::default());
        let http_seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&http_seen);
        session.on_http(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let frame = RawFrame::new(
            ep(1, 49152),
            ep(9, 80),
            b"GET / HTTP/1.1\r\nHost: x\r\n\r\n".to_vec(),
        );
        session.ingest(frame);
        session.shutdown();

        assert_eq!(http_seen.load(Ordering::SeqCst), 1);
        let stats = session.stats();
        assert_eq!(stats.http_conversations, 1);
        assert_eq!(stats.conversations, 0);
    }

    #[test]
    fn test_shutdown_is_idempotent_and_final() {
        let mut session = CaptureSession::new(SessionConfig::default());
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        session.on_conversation(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        session.shutdown();
        session.shutdown();
        assert!(!session.is_running());

        // Frames after teardown are ignored and deliver nothing
        session.ingest(spawn_frame("late"));
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert_eq!(session.stats().frames_ingested, 0);
    }

    struct CountingSource {
        frames: Vec<RawFrame>,
        closed: Arc<AtomicUsize>,
    }

    impl FrameSource for CountingSource {
        fn next_frame(&mut self) -> Option<RawFrame> {
            if self.frames.is_empty() {
                None
            } else {
                Some(self.frames.remove(0))
            }
        }

        fn close(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_capture_source_closed_exactly_once() {
        let closed = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            frames: vec![spawn_frame("x"), spawn_frame("y")],
            closed: Arc::clone(&closed),
        };

        let mut session = CaptureSession::new(SessionConfig::default());
        session.capture_from(Box::new(source));
        assert_eq!(session.stats().frames_ingested, 2);

        session.shutdown();
        session.shutdown();
        drop(session);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_bad_frames_counted_not_fatal() {
        let mut session = CaptureSession::new(SessionConfig::default());
        session.ingest(RawFrame::new(ep(1, 50000), ep(2, 53640), vec![0xFE, 0x00]));
        session.ingest(spawn_frame("after"));
        session.shutdown();

        let stats = session.stats();
        assert_eq!(stats.frames_ingested, 2);
        assert_eq!(stats.frame_errors, 1);
        assert_eq!(stats.conversations, 1);
    }
}
