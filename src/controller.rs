//! Stream playback controller
//!
//! Owns the media surface and the current [`PlaybackSession`], resolves a
//! channel id into metadata and a stream URL, and exposes the player state
//! and transport controls to the UI. Everything runs on the UI thread; the
//! two lookups run on worker threads and report back through a channel
//! drained by [`PlaybackController::poll`].

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::api::{ChannelResolver, ResolveError};
use crate::config::AppConfig;
use crate::engine::{EngineFactory, MediaSurface};
use crate::models::{
    error_message, ChannelId, ChannelMetadata, ErrorDetail, PlayerStatus, StreamDescriptor,
};
use crate::session::PlaybackSession;

/// Runs resolver jobs somewhere other than the UI thread
pub trait Dispatch {
    fn spawn(&self, job: Box<dyn FnOnce() + Send + 'static>);
}

/// One OS thread per job, like the rest of the app's background fetches
pub struct ThreadDispatch;

impl Dispatch for ThreadDispatch {
    fn spawn(&self, job: Box<dyn FnOnce() + Send + 'static>) {
        if let Err(e) = thread::Builder::new().name("resolver".into()).spawn(job) {
            error!(error = %e, "Failed to spawn resolver thread");
        }
    }
}

enum Resolution {
    Metadata(Result<ChannelMetadata, ResolveError>),
    Stream(Result<StreamDescriptor, ResolveError>),
}

struct ResolveMessage {
    generation: u64,
    channel_id: ChannelId,
    resolution: Resolution,
}

/// Metadata panel state
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PageState {
    #[default]
    Idle,
    Loading,
    Ready(ChannelMetadata),
    NotFound,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Back,
}

/// Everything the player view needs to draw one frame
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSnapshot {
    pub status: PlayerStatus,
    pub error_detail: Option<ErrorDetail>,
    pub playing: bool,
    pub volume: f32,
    pub muted: bool,
    pub status_text: &'static str,
    /// Only set in `Error`/`Unavailable`
    pub error_message: Option<String>,
}

pub struct PlaybackController<S: MediaSurface> {
    resolver: Arc<dyn ChannelResolver>,
    engines: Box<dyn EngineFactory>,
    dispatch: Box<dyn Dispatch>,
    surface: Option<S>,
    watchdog_timeout: Duration,

    channel_id: Option<ChannelId>,
    generation: u64,
    page: PageState,
    stream: Option<StreamDescriptor>,
    stream_error: Option<ResolveError>,
    session: PlaybackSession,

    playing: bool,
    volume: f32,
    muted: bool,

    results_tx: Sender<ResolveMessage>,
    results_rx: Receiver<ResolveMessage>,
}

fn as_surface<S: MediaSurface>(surface: &mut Option<S>) -> Option<&mut dyn MediaSurface> {
    surface.as_mut().map(|s| s as &mut dyn MediaSurface)
}

impl<S: MediaSurface> PlaybackController<S> {
    pub fn new(
        config: &AppConfig,
        resolver: Arc<dyn ChannelResolver>,
        engines: Box<dyn EngineFactory>,
        dispatch: Box<dyn Dispatch>,
    ) -> Self {
        let (results_tx, results_rx) = channel();
        let watchdog_timeout = config.watchdog_timeout();
        Self {
            resolver,
            engines,
            dispatch,
            surface: None,
            watchdog_timeout,
            channel_id: None,
            generation: 0,
            page: PageState::Idle,
            stream: None,
            stream_error: None,
            session: PlaybackSession::new(watchdog_timeout),
            playing: true,
            volume: config.volume(),
            muted: false,
            results_tx,
            results_rx,
        }
    }

    // ---- surface lifecycle ----

    /// Hand the controller its media surface (view mounted).
    pub fn mount_surface(&mut self, surface: S) {
        self.mount_surface_at(surface, Instant::now());
    }

    pub fn mount_surface_at(&mut self, surface: S, now: Instant) {
        self.session.teardown(as_surface(&mut self.surface));
        let mut surface = surface;
        surface.set_volume(self.volume);
        surface.set_muted(self.muted);
        self.surface = Some(surface);
        if self.channel_id.is_some() {
            self.restart_session(now);
        }
    }

    /// Take the surface back (view unmounted); the session is torn down first.
    /// An open channel keeps a surface-less session whose watchdog still runs.
    pub fn unmount_surface(&mut self) -> Option<S> {
        self.unmount_surface_at(Instant::now())
    }

    pub fn unmount_surface_at(&mut self, now: Instant) -> Option<S> {
        self.session.teardown(as_surface(&mut self.surface));
        let surface = self.surface.take();
        if self.channel_id.is_some() {
            self.restart_session(now);
        } else {
            self.session = PlaybackSession::new(self.watchdog_timeout);
        }
        surface
    }

    pub fn surface(&self) -> Option<&S> {
        self.surface.as_ref()
    }

    pub fn surface_mut(&mut self) -> Option<&mut S> {
        self.surface.as_mut()
    }

    // ---- channel resolution ----

    /// Switch to `channel_id`. Re-opening the current channel is a no-op; use [`retry`](Self::retry).
    pub fn open(&mut self, channel_id: ChannelId) {
        self.open_at(channel_id, Instant::now());
    }

    pub fn open_at(&mut self, channel_id: ChannelId, now: Instant) {
        if self.channel_id.as_ref() == Some(&channel_id) {
            debug!(%channel_id, "Channel already open");
            return;
        }
        self.begin(channel_id, now);
    }

    /// Resolve the current channel again with a fresh session
    pub fn retry(&mut self) {
        self.retry_at(Instant::now());
    }

    pub fn retry_at(&mut self, now: Instant) {
        if let Some(channel_id) = self.channel_id.clone() {
            info!(%channel_id, "Retrying channel");
            self.begin(channel_id, now);
        }
    }

    fn begin(&mut self, channel_id: ChannelId, now: Instant) {
        self.generation += 1;
        info!(%channel_id, generation = self.generation, "Opening channel");

        self.channel_id = Some(channel_id.clone());
        self.page = PageState::Loading;
        self.stream = None;
        self.stream_error = None;
        self.restart_session(now);

        let generation = self.generation;

        let resolver = Arc::clone(&self.resolver);
        let tx = self.results_tx.clone();
        let id = channel_id.clone();
        self.dispatch.spawn(Box::new(move || {
            let resolution = Resolution::Metadata(resolver.get_channel(&id));
            let _ = tx.send(ResolveMessage { generation, channel_id: id, resolution });
        }));

        let resolver = Arc::clone(&self.resolver);
        let tx = self.results_tx.clone();
        let id = channel_id;
        self.dispatch.spawn(Box::new(move || {
            let resolution = Resolution::Stream(resolver.get_channel_stream(&id));
            let _ = tx.send(ResolveMessage { generation, channel_id: id, resolution });
        }));
    }

    fn restart_session(&mut self, now: Instant) {
        let url = self.stream.as_ref().and_then(StreamDescriptor::playable_url);
        self.session
            .start(url, as_surface(&mut self.surface), &*self.engines, now);
        if let Some(ref e) = self.stream_error {
            self.session.note_resolution_error(e.to_string());
        }
    }

    /// Drain finished lookups, engine and surface events, and the watchdog.
    /// Call once per UI frame.
    pub fn poll(&mut self) {
        self.poll_at(Instant::now());
    }

    pub fn poll_at(&mut self, now: Instant) {
        while let Ok(message) = self.results_rx.try_recv() {
            self.on_resolved(message, now);
        }

        if let Some(playing) = self.session.poll(now, as_surface(&mut self.surface)) {
            self.playing = playing;
        }
    }

    fn on_resolved(&mut self, message: ResolveMessage, now: Instant) {
        let current = self.channel_id.as_ref() == Some(&message.channel_id);
        if message.generation != self.generation || !current {
            warn!(
                channel_id = %message.channel_id,
                generation = message.generation,
                current = self.generation,
                "Discarding stale response"
            );
            return;
        }

        match message.resolution {
            Resolution::Metadata(Ok(meta)) => {
                debug!(name = %meta.name, "Channel metadata loaded");
                self.page = PageState::Ready(meta);
            }
            Resolution::Metadata(Err(ResolveError::NotFound)) => {
                warn!(channel_id = %message.channel_id, "Channel not found");
                self.page = PageState::NotFound;
            }
            Resolution::Metadata(Err(e)) => {
                error!(error = %e, "Failed to fetch channel");
                self.page = PageState::Failed(e.to_string());
            }
            Resolution::Stream(Ok(stream)) => {
                if self.stream.as_ref() == Some(&stream) {
                    return;
                }
                info!(url = %stream.stream_url, "Stream resolved");
                self.stream = Some(stream);
                self.restart_session(now);
            }
            Resolution::Stream(Err(e)) => {
                // Session stays loading; the watchdog turns this into Unavailable
                warn!(error = %e, "Failed to fetch channel stream");
                self.session.note_resolution_error(e.to_string());
                self.stream_error = Some(e);
            }
        }
    }

    /// Leave the player: stop everything and forget the channel.
    pub fn go_back(&mut self) -> Navigation {
        self.close();
        Navigation::Back
    }

    pub fn close(&mut self) {
        if let Some(channel_id) = self.channel_id.take() {
            info!(%channel_id, "Closing channel");
        }
        // Anything still in flight belongs to an older generation now
        self.generation += 1;
        self.session.teardown(as_surface(&mut self.surface));
        self.session = PlaybackSession::new(self.watchdog_timeout);
        self.page = PageState::Idle;
        self.stream = None;
        self.stream_error = None;
    }

    // ---- transport controls ----

    /// Play or pause. `playing` follows the surface's own play/pause events.
    pub fn toggle_play(&mut self) {
        let Some(surface) = self.surface.as_mut() else {
            return;
        };
        if self.playing {
            surface.pause();
        } else if let Err(e) = surface.play() {
            warn!(error = %e, "Play request rejected");
        }
    }

    /// Set volume in `[0, 1]`. Mute follows the slider: zero mutes, anything else unmutes.
    pub fn set_volume(&mut self, volume: f32) {
        let volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        self.volume = volume;
        self.muted = volume == 0.0;
        if let Some(surface) = self.surface.as_mut() {
            surface.set_volume(volume);
            surface.set_muted(self.muted);
        }
    }

    pub fn toggle_mute(&mut self) {
        self.muted = !self.muted;
        if let Some(surface) = self.surface.as_mut() {
            surface.set_muted(self.muted);
        }
    }

    pub fn request_fullscreen(&mut self) {
        if let Some(surface) = self.surface.as_mut() {
            surface.request_fullscreen();
        }
    }

    // ---- state for the view ----

    pub fn channel_id(&self) -> Option<&ChannelId> {
        self.channel_id.as_ref()
    }

    pub fn page(&self) -> &PageState {
        &self.page
    }

    pub fn stream(&self) -> Option<&StreamDescriptor> {
        self.stream.as_ref()
    }

    pub fn stream_error(&self) -> Option<&ResolveError> {
        self.stream_error.as_ref()
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    pub fn status(&self) -> PlayerStatus {
        self.session.status()
    }

    pub fn playing(&self) -> bool {
        self.playing
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        let status = self.session.status();
        let error_detail = self.session.error_detail().cloned();
        let error_message = status
            .is_terminal()
            .then(|| error_message(self.session.stream_url().is_some(), error_detail.as_ref()));
        PlayerSnapshot {
            status,
            error_detail,
            playing: self.playing,
            volume: self.volume,
            muted: self.muted,
            status_text: status.status_text(),
            error_message,
        }
    }
}

impl<S: MediaSurface> Drop for PlaybackController<S> {
    fn drop(&mut self) {
        self.session.teardown(as_surface(&mut self.surface));
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
