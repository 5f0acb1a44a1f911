//! Recording fakes for the player seams

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::api::{ChannelResolver, ResolveError};
use crate::controller::Dispatch;
use crate::engine::{
    event_channel, EngineEvent, EngineFactory, EventSink, MediaSurface, PlayRejected,
    StreamingEngine, Subscription, SurfaceEvent,
};
use crate::models::{ChannelId, ChannelMetadata, StreamDescriptor};

/// Shared, ordered record of calls across fakes
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.position(entry).is_some()
    }
}

pub struct FakeSurface {
    pub log: CallLog,
    pub native_hls: bool,
    pub reject_play: bool,
    listeners: Vec<EventSink<SurfaceEvent>>,
}

impl FakeSurface {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            native_hls: false,
            reject_play: false,
            listeners: Vec::new(),
        }
    }

    pub fn native(log: &CallLog) -> Self {
        Self {
            native_hls: true,
            ..Self::new(log)
        }
    }

    /// Deliver an event to live listeners; returns how many received it
    pub fn emit(&mut self, event: SurfaceEvent) -> usize {
        self.listeners.retain(|sink| sink.emit(event));
        self.listeners.len()
    }
}

impl MediaSurface for FakeSurface {
    fn can_play_type(&self, mime: &str) -> bool {
        self.native_hls && mime == crate::engine::HLS_MIME
    }

    fn set_source(&mut self, url: Option<&str>) {
        self.log.push(format!("surface source {}", url.unwrap_or("none")));
    }

    fn play(&mut self) -> Result<(), PlayRejected> {
        self.log.push("surface play");
        if self.reject_play {
            return Err(PlayRejected("autoplay blocked".to_string()));
        }
        self.emit(SurfaceEvent::Play);
        Ok(())
    }

    fn pause(&mut self) {
        self.log.push("surface pause");
        self.emit(SurfaceEvent::Pause);
    }

    fn set_volume(&mut self, volume: f32) {
        self.log.push(format!("surface volume {}", volume));
    }

    fn set_muted(&mut self, muted: bool) {
        self.log.push(format!("surface muted {}", muted));
    }

    fn request_fullscreen(&mut self) {
        self.log.push("surface fullscreen");
    }

    fn subscribe(&mut self) -> Subscription<SurfaceEvent> {
        let (sink, subscription) = event_channel();
        self.listeners.push(sink);
        subscription
    }
}

/// Engine factory whose engines log calls and expose their event sinks
#[derive(Clone)]
pub struct FakeEngines {
    pub log: CallLog,
    pub supported: bool,
    sinks: Arc<Mutex<Vec<EventSink<EngineEvent>>>>,
}

impl FakeEngines {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            supported: true,
            sinks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn unsupported(log: &CallLog) -> Self {
        Self {
            supported: false,
            ..Self::new(log)
        }
    }

    pub fn created(&self) -> usize {
        self.sinks.lock().unwrap().len()
    }

    /// Emit on the n-th engine created (1-based); false if its listener is gone
    pub fn emit(&self, engine: usize, event: EngineEvent) -> bool {
        let sinks = self.sinks.lock().unwrap();
        sinks[engine - 1].emit(event)
    }

    pub fn emit_latest(&self, event: EngineEvent) -> bool {
        let n = self.created();
        self.emit(n, event)
    }
}

impl EngineFactory for FakeEngines {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn create(&self) -> Box<dyn StreamingEngine> {
        let mut sinks = self.sinks.lock().unwrap();
        let (sink, subscription) = event_channel();
        sinks.push(sink);
        Box::new(FakeEngine {
            id: sinks.len(),
            log: self.log.clone(),
            subscription: Some(subscription),
            destroyed: false,
        })
    }
}

struct FakeEngine {
    id: usize,
    log: CallLog,
    subscription: Option<Subscription<EngineEvent>>,
    destroyed: bool,
}

impl StreamingEngine for FakeEngine {
    fn subscribe(&mut self) -> Subscription<EngineEvent> {
        self.subscription.take().expect("subscribed twice")
    }

    fn load_source(&mut self, url: &str) {
        self.log.push(format!("engine#{} load {}", self.id, url));
    }

    fn attach_media(&mut self, _surface: &mut dyn MediaSurface) {
        self.log.push(format!("engine#{} attach", self.id));
    }

    fn destroy(&mut self) {
        if !self.destroyed {
            self.destroyed = true;
            self.log.push(format!("engine#{} destroy", self.id));
        }
    }
}

/// Resolver answering from fixed tables; unknown ids are `NotFound`
#[derive(Default)]
pub struct FakeResolver {
    channels: HashMap<String, Result<ChannelMetadata, ResolveError>>,
    streams: HashMap<String, Result<String, ResolveError>>,
}

impl FakeResolver {
    pub fn with_channel(mut self, id: &str, name: &str, country: &str) -> Self {
        let meta = ChannelMetadata {
            name: name.to_string(),
            category: None,
            language: None,
            country_code: country.to_string(),
            logo_url: None,
            epg_id: None,
            updated_at: None,
        };
        self.channels.insert(id.to_string(), Ok(meta));
        self
    }

    pub fn with_channel_error(mut self, id: &str, err: ResolveError) -> Self {
        self.channels.insert(id.to_string(), Err(err));
        self
    }

    pub fn with_stream(mut self, id: &str, url: &str) -> Self {
        self.streams.insert(id.to_string(), Ok(url.to_string()));
        self
    }

    pub fn with_stream_error(mut self, id: &str, err: ResolveError) -> Self {
        self.streams.insert(id.to_string(), Err(err));
        self
    }
}

impl ChannelResolver for FakeResolver {
    fn get_channel(&self, id: &ChannelId) -> Result<ChannelMetadata, ResolveError> {
        self.channels
            .get(id.as_str())
            .cloned()
            .unwrap_or(Err(ResolveError::NotFound))
    }

    fn get_channel_stream(&self, id: &ChannelId) -> Result<StreamDescriptor, ResolveError> {
        let url = self
            .streams
            .get(id.as_str())
            .cloned()
            .unwrap_or(Err(ResolveError::NotFound))?;
        Ok(StreamDescriptor {
            channel_id: id.clone(),
            stream_url: url,
        })
    }
}

/// Runs jobs immediately on the calling thread
pub struct InlineDispatch;

impl Dispatch for InlineDispatch {
    fn spawn(&self, job: Box<dyn FnOnce() + Send + 'static>) {
        job();
    }
}

/// Holds jobs until the test releases them, in any order
#[derive(Clone, Default)]
pub struct QueuedDispatch {
    jobs: Arc<Mutex<Vec<Option<Box<dyn FnOnce() + Send + 'static>>>>>,
}

impl QueuedDispatch {
    pub fn pending(&self) -> usize {
        self.jobs.lock().unwrap().iter().filter(|j| j.is_some()).count()
    }

    /// Run the job queued at `index` (0-based, in submission order)
    pub fn run(&self, index: usize) {
        let job = self.jobs.lock().unwrap()[index].take();
        if let Some(job) = job {
            job();
        }
    }
}

impl Dispatch for QueuedDispatch {
    fn spawn(&self, job: Box<dyn FnOnce() + Send + 'static>) {
        self.jobs.lock().unwrap().push(Some(job));
    }
}
