//! Seams between the playback session, the streaming engine and the media surface
//!
//! Events travel over mpsc channels. A listener owns the receiving end
//! ([`Subscription`]); dropping it deregisters the listener, after which the
//! producer's sends fail and nothing can reach a torn-down session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};

use thiserror::Error;

/// MIME type a surface must accept to play HLS without an engine
pub const HLS_MIME: &str = "application/vnd.apple.mpegurl";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    Network,
    Media,
    Other,
}

/// Lifecycle events raised by a streaming engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    ManifestParsed,
    Error {
        fatal: bool,
        kind: EngineErrorKind,
        details: String,
    },
    BufferStalled,
    BufferResumed,
    LevelLoaded,
}

/// Events raised by the media surface itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// Native playback has enough data to start
    CanPlay,
    Play,
    Pause,
}

/// Producer side of an event feed
#[derive(Debug)]
pub struct EventSink<E> {
    tx: Sender<E>,
}

impl<E> Clone for EventSink<E> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<E> EventSink<E> {
    /// Returns false once the listener is gone
    pub fn emit(&self, event: E) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Listener side of an event feed
#[derive(Debug)]
pub struct Subscription<E> {
    rx: Receiver<E>,
}

impl<E> Subscription<E> {
    /// Take everything queued so far without blocking
    pub fn drain(&self) -> Vec<E> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        events
    }
}

pub fn event_channel<E>() -> (EventSink<E>, Subscription<E>) {
    let (tx, rx) = channel();
    (EventSink { tx }, Subscription { rx })
}

/// Decoded RGB24 frame
pub struct DecodedFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub pts: i64,
}

/// Slot a surface exposes for a software engine to render into
#[derive(Clone, Default)]
pub struct FrameSink {
    frame: Arc<Mutex<Option<DecodedFrame>>>,
    paused: Arc<AtomicBool>,
}

impl FrameSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, frame: DecodedFrame) {
        *self.frame.lock().unwrap_or_else(|e| e.into_inner()) = Some(frame);
    }

    pub fn take(&self) -> Option<DecodedFrame> {
        self.frame.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    pub fn clear(&self) {
        self.take();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Error)]
#[error("Playback request rejected: {0}")]
pub struct PlayRejected(pub String);

/// Native rendering surface (video element, egui texture, ...)
pub trait MediaSurface {
    /// Whether the surface can play `mime` on its own
    fn can_play_type(&self, mime: &str) -> bool;
    fn set_source(&mut self, url: Option<&str>);
    /// Start playback; may be refused by the host (autoplay policy)
    fn play(&mut self) -> Result<(), PlayRejected>;
    fn pause(&mut self);
    fn set_volume(&mut self, volume: f32);
    fn set_muted(&mut self, muted: bool);
    /// Best effort, silently ignored where unsupported
    fn request_fullscreen(&mut self);
    fn subscribe(&mut self) -> Subscription<SurfaceEvent>;
    /// Frame slot for software engines, if the surface renders decoded frames
    fn frame_sink(&self) -> Option<FrameSink> {
        None
    }
}

/// Adaptive-streaming engine bound to a single source
pub trait StreamingEngine {
    fn subscribe(&mut self) -> Subscription<EngineEvent>;
    fn load_source(&mut self, url: &str);
    fn attach_media(&mut self, surface: &mut dyn MediaSurface);
    /// Stop all work and release the surface. Must be idempotent.
    fn destroy(&mut self);
}

pub trait EngineFactory {
    /// Whether a software engine can run in this build/host
    fn is_supported(&self) -> bool;
    fn create(&self) -> Box<dyn StreamingEngine>;
}
