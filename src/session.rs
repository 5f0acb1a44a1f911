//! Playback session: one media surface, at most one streaming engine, one stream URL
//!
//! The session turns engine and surface events into a [`PlayerStatus`].
//! Every restart tears the previous engine down (subscription dropped first,
//! then `destroy`) before anything new is attached.

use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::engine::{
    EngineErrorKind, EngineEvent, EngineFactory, MediaSurface, StreamingEngine, Subscription,
    SurfaceEvent, HLS_MIME,
};
use crate::models::{ErrorDetail, PlayerStatus};
use crate::watchdog::Watchdog;

pub struct PlaybackSession {
    status: PlayerStatus,
    error_detail: Option<ErrorDetail>,
    stream_url: Option<String>,
    engine: Option<Box<dyn StreamingEngine>>,
    engine_events: Option<Subscription<EngineEvent>>,
    surface_events: Option<Subscription<SurfaceEvent>>,
    native_source: bool,
    resolution_error: Option<String>,
    watchdog: Watchdog,
}

impl PlaybackSession {
    pub fn new(timeout: Duration) -> Self {
        Self {
            status: PlayerStatus::Loading,
            error_detail: None,
            stream_url: None,
            engine: None,
            engine_events: None,
            surface_events: None,
            native_source: false,
            resolution_error: None,
            watchdog: Watchdog::new(timeout),
        }
    }

    pub fn status(&self) -> PlayerStatus {
        self.status
    }

    pub fn error_detail(&self) -> Option<&ErrorDetail> {
        self.error_detail.as_ref()
    }

    pub fn stream_url(&self) -> Option<&str> {
        self.stream_url.as_deref()
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    pub fn watchdog_pending(&self) -> bool {
        self.watchdog.is_armed()
    }

    /// Begin a session for `stream_url`, replacing whatever ran before.
    ///
    /// The watchdog is armed for every new session, whether or not a URL is
    /// known yet, and is cancelled once the stream becomes ready or fails.
    pub fn start(
        &mut self,
        stream_url: Option<&str>,
        mut surface: Option<&mut (dyn MediaSurface + '_)>,
        engines: &dyn EngineFactory,
        now: Instant,
    ) {
        self.teardown(surface.as_deref_mut());

        self.status = PlayerStatus::Loading;
        self.error_detail = None;
        self.resolution_error = None;
        self.stream_url = stream_url
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string);
        self.watchdog.arm(now);

        let (Some(surface), Some(url)) = (surface, self.stream_url.clone()) else {
            info!(
                timeout_secs = self.watchdog.timeout().as_secs(),
                "No stream yet, waiting for watchdog"
            );
            return;
        };

        self.surface_events = Some(surface.subscribe());

        if engines.is_supported() {
            info!(%url, "Attaching streaming engine");
            let mut engine = engines.create();
            self.engine_events = Some(engine.subscribe());
            engine.load_source(&url);
            engine.attach_media(surface);
            self.engine = Some(engine);
        } else if surface.can_play_type(HLS_MIME) {
            info!(%url, "Using native playback");
            surface.set_source(Some(&url));
            self.native_source = true;
        } else {
            error!("No adaptive streaming support available");
            self.fail(
                PlayerStatus::Error,
                ErrorDetail::unsupported("HLS is not supported by this player build."),
            );
        }
    }

    /// Record why the stream lookup failed. If the watchdog later fires,
    /// the session reports this instead of a plain timeout.
    pub fn note_resolution_error(&mut self, details: impl Into<String>) {
        self.resolution_error = Some(details.into());
    }

    /// Process queued events and the watchdog.
    ///
    /// Returns the latest play/pause state reported by the surface, if any.
    pub fn poll(&mut self, now: Instant, mut surface: Option<&mut (dyn MediaSurface + '_)>) -> Option<bool> {
        let engine_events = self
            .engine_events
            .as_ref()
            .map(Subscription::drain)
            .unwrap_or_default();
        for event in engine_events {
            self.on_engine_event(event, surface.as_deref_mut());
            if self.engine.is_none() {
                break;
            }
        }

        // play() may queue Play/Pause behind the event that triggered it
        let mut playing = None;
        loop {
            let surface_events = self
                .surface_events
                .as_ref()
                .map(Subscription::drain)
                .unwrap_or_default();
            if surface_events.is_empty() {
                break;
            }
            for event in surface_events {
                match event {
                    SurfaceEvent::CanPlay if self.native_source && !self.status.is_terminal() => {
                        self.transition(PlayerStatus::Playing);
                        attempt_play(surface.as_deref_mut());
                    }
                    SurfaceEvent::CanPlay => {}
                    SurfaceEvent::Play => playing = Some(true),
                    SurfaceEvent::Pause => playing = Some(false),
                }
            }
        }

        if self.watchdog.fire_if_due(now) && self.status == PlayerStatus::Loading {
            warn!("Stream did not become ready in time");
            let detail = match self.resolution_error.take() {
                Some(details) => ErrorDetail::stream_resolution(details),
                None => ErrorDetail::timeout(),
            };
            self.fail(PlayerStatus::Unavailable, detail);
        }

        playing
    }

    fn on_engine_event(&mut self, event: EngineEvent, surface: Option<&mut (dyn MediaSurface + '_)>) {
        debug!(?event, "Engine event");
        match event {
            EngineEvent::ManifestParsed if self.status.is_terminal() => {}
            EngineEvent::ManifestParsed => {
                self.transition(PlayerStatus::Playing);
                attempt_play(surface);
            }
            EngineEvent::Error { fatal: false, kind, details } => {
                debug!(?kind, %details, "Engine recovered from error");
            }
            EngineEvent::Error { fatal: true, kind, details } => {
                error!(?kind, %details, "Fatal engine error");
                self.fail(
                    PlayerStatus::Error,
                    ErrorDetail::engine_fatal(kind == EngineErrorKind::Network, details),
                );
                self.destroy_engine();
            }
            EngineEvent::BufferStalled => self.transition(PlayerStatus::Loading),
            EngineEvent::BufferResumed | EngineEvent::LevelLoaded => {
                self.transition(PlayerStatus::Playing)
            }
        }
    }

    /// Move between loading and playing; terminal states stay put.
    /// Reaching playing disarms the watchdog: later stalls are transient.
    fn transition(&mut self, status: PlayerStatus) {
        if self.status.is_terminal() {
            return;
        }
        if status == PlayerStatus::Playing {
            self.watchdog.cancel();
        }
        if self.status != status {
            debug!(from = ?self.status, to = ?status, "Player status");
            self.status = status;
        }
    }

    fn fail(&mut self, status: PlayerStatus, detail: ErrorDetail) {
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        self.error_detail = Some(detail);
        self.watchdog.cancel();
    }

    fn destroy_engine(&mut self) {
        // Deregister before destroying so nothing queued after this point is seen
        self.engine_events = None;
        if let Some(mut engine) = self.engine.take() {
            engine.destroy();
        }
    }

    /// Release everything the session holds. Safe to call repeatedly.
    pub fn teardown(&mut self, surface: Option<&mut (dyn MediaSurface + '_)>) {
        self.destroy_engine();
        self.surface_events = None;
        if self.native_source {
            if let Some(surface) = surface {
                surface.set_source(None);
            }
            self.native_source = false;
        }
        self.watchdog.cancel();
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.destroy_engine();
    }
}

fn attempt_play(surface: Option<&mut (dyn MediaSurface + '_)>) {
    if let Some(surface) = surface {
        if let Err(e) = surface.play() {
            warn!(error = %e, "Autoplay failed");
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
