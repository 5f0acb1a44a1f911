// Software streaming engine using ffmpeg-next
// Requires FFmpeg libraries: libavcodec, libavformat, libavutil, libswscale
//
// To install FFmpeg development libraries:
// - Ubuntu/Debian: sudo apt install libavcodec-dev libavformat-dev libavutil-dev libswscale-dev libavdevice-dev
// - Fedora: sudo dnf install ffmpeg-devel
// - macOS: brew install ffmpeg
// - Windows: Download from https://ffmpeg.org and set FFMPEG_DIR environment variable

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::engine::{EngineEvent, EngineFactory, StreamingEngine};

/// Gap between decoded frames treated as a buffering stall
pub const STALL_AFTER: Duration = Duration::from_secs(2);

/// How often the watcher thread looks at frame delivery
const STALL_CHECK_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug)]
struct StallState {
    last_frame: Instant,
    stalled: bool,
    closed: bool,
}

/// Frame-delivery clock shared by the decode thread and its watcher.
///
/// The decoder reports every frame it hands to the surface; the watcher calls
/// [`check`](Self::check) on a timer, so a stall is reported while the decoder
/// is still blocked waiting for data.
#[derive(Debug, Clone)]
pub struct StallMonitor {
    state: Arc<Mutex<StallState>>,
    stall_after: Duration,
}

impl StallMonitor {
    pub fn new(stall_after: Duration, now: Instant) -> Self {
        Self {
            state: Arc::new(Mutex::new(StallState {
                last_frame: now,
                stalled: false,
                closed: false,
            })),
            stall_after,
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut StallState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    /// A frame reached the surface. Returns `BufferResumed` if this ends a stall.
    pub fn frame_delivered(&self, now: Instant) -> Option<EngineEvent> {
        self.with_state(|state| {
            state.last_frame = now;
            std::mem::take(&mut state.stalled).then_some(EngineEvent::BufferResumed)
        })
    }

    /// Returns `BufferStalled` once per gap longer than the stall threshold
    pub fn check(&self, now: Instant) -> Option<EngineEvent> {
        let stall_after = self.stall_after;
        self.with_state(|state| {
            if state.closed || state.stalled {
                return None;
            }
            if now.saturating_duration_since(state.last_frame) > stall_after {
                state.stalled = true;
                return Some(EngineEvent::BufferStalled);
            }
            None
        })
    }

    /// Paused playback delivers no frames on purpose; restart the clock.
    pub fn hold(&self, now: Instant) {
        self.with_state(|state| state.last_frame = now);
    }

    pub fn close(&self) {
        self.with_state(|state| state.closed = true);
    }

    pub fn is_closed(&self) -> bool {
        self.with_state(|state| state.closed)
    }
}

#[cfg(feature = "internal-player")]
mod engine_impl {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Once};
    use std::thread;
    use std::time::{Duration, Instant};

    extern crate ffmpeg_next as ffmpeg;
    use ffmpeg::format::Pixel;
    use ffmpeg::media::Type;
    use ffmpeg::software::scaling::{context::Context as ScalingContext, flag::Flags};
    use ffmpeg::util::frame::video::Video as VideoFrame;
    use tracing::{debug, info, warn};

    use super::{StallMonitor, STALL_AFTER, STALL_CHECK_INTERVAL};
    use crate::engine::{
        event_channel, DecodedFrame, EngineErrorKind, EngineEvent, EventSink, FrameSink,
        MediaSurface, StreamingEngine, Subscription,
    };

    static FFMPEG_INIT: Once = Once::new();

    pub fn init() {
        FFMPEG_INIT.call_once(|| {
            if let Err(e) = ffmpeg::init() {
                warn!(error = %e, "FFmpeg init failed");
            }
        });
    }

    pub struct FfmpegEngine {
        user_agent: String,
        url: Option<String>,
        events: Option<EventSink<EngineEvent>>,
        stop: Arc<AtomicBool>,
        started: bool,
    }

    impl FfmpegEngine {
        pub fn new(user_agent: &str) -> Self {
            Self {
                user_agent: user_agent.to_string(),
                url: None,
                events: None,
                stop: Arc::new(AtomicBool::new(false)),
                started: false,
            }
        }

        fn fail(&self, kind: EngineErrorKind, details: &str) {
            if let Some(ref events) = self.events {
                events.emit(EngineEvent::Error {
                    fatal: true,
                    kind,
                    details: details.to_string(),
                });
            }
        }
    }

    impl StreamingEngine for FfmpegEngine {
        fn subscribe(&mut self) -> Subscription<EngineEvent> {
            let (sink, subscription) = event_channel();
            self.events = Some(sink);
            subscription
        }

        fn load_source(&mut self, url: &str) {
            self.url = Some(url.to_string());
        }

        fn attach_media(&mut self, surface: &mut dyn MediaSurface) {
            if self.started {
                return;
            }
            let Some(url) = self.url.clone() else {
                self.fail(EngineErrorKind::Other, "No source loaded");
                return;
            };
            let Some(frames) = surface.frame_sink() else {
                self.fail(EngineErrorKind::Other, "Surface cannot render decoded frames");
                return;
            };
            let Some(events) = self.events.clone() else {
                warn!("Engine attached without a listener");
                return;
            };

            self.started = true;
            let user_agent = self.user_agent.clone();
            let stop = Arc::clone(&self.stop);
            let spawned = thread::Builder::new()
                .name("ffmpeg-decode".into())
                .spawn(move || decode_thread(url, user_agent, frames, stop, events));
            if let Err(e) = spawned {
                self.fail(EngineErrorKind::Other, &format!("Failed to start decoder: {}", e));
            }
        }

        fn destroy(&mut self) {
            self.stop.store(true, Ordering::Relaxed);
            self.events = None;
        }
    }

    impl Drop for FfmpegEngine {
        fn drop(&mut self) {
            self.destroy();
        }
    }

    fn fatal(events: &EventSink<EngineEvent>, kind: EngineErrorKind, details: String) {
        events.emit(EngineEvent::Error {
            fatal: true,
            kind,
            details,
        });
    }

    /// Report stalls while the decoder is blocked inside the demuxer
    fn stall_watcher(
        monitor: StallMonitor,
        frames: FrameSink,
        stop: Arc<AtomicBool>,
        events: EventSink<EngineEvent>,
    ) {
        while !stop.load(Ordering::Relaxed) && !monitor.is_closed() {
            let now = Instant::now();
            if frames.is_paused() {
                monitor.hold(now);
            } else if let Some(event) = monitor.check(now) {
                debug!("No frames for {:?}, buffering", STALL_AFTER);
                if !events.emit(event) {
                    return;
                }
            }
            thread::sleep(STALL_CHECK_INTERVAL);
        }
    }

    fn decode_thread(
        url: String,
        user_agent: String,
        frames: FrameSink,
        stop: Arc<AtomicBool>,
        events: EventSink<EngineEvent>,
    ) {
        // Set options for network streams
        let mut options = ffmpeg::Dictionary::new();
        options.set("user_agent", &user_agent);
        options.set("reconnect", "1");
        options.set("reconnect_streamed", "1");
        options.set("reconnect_delay_max", "5");
        options.set("timeout", "5000000"); // 5 second timeout

        let mut ictx = match ffmpeg::format::input_with_dictionary(&url, options) {
            Ok(ctx) => ctx,
            Err(e) => {
                fatal(&events, EngineErrorKind::Network, format!("Failed to open stream: {}", e));
                return;
            }
        };

        let Some(video_stream) = ictx.streams().best(Type::Video) else {
            fatal(&events, EngineErrorKind::Media, "No video stream found".to_string());
            return;
        };
        let video_stream_index = video_stream.index();

        let mut decoder = match ffmpeg::codec::context::Context::from_parameters(video_stream.parameters())
            .and_then(|ctx| ctx.decoder().video())
        {
            Ok(d) => d,
            Err(e) => {
                fatal(&events, EngineErrorKind::Media, format!("Failed to create decoder: {}", e));
                return;
            }
        };

        let width = decoder.width();
        let height = decoder.height();

        // Scale to reasonable size if too large
        let (target_width, target_height) = if width > 1280 || height > 720 {
            let scale = f64::min(1280.0 / width as f64, 720.0 / height as f64);
            ((width as f64 * scale) as u32, (height as f64 * scale) as u32)
        } else {
            (width, height)
        };

        let mut scaler = match ScalingContext::get(
            decoder.format(),
            width,
            height,
            Pixel::RGB24,
            target_width,
            target_height,
            Flags::BILINEAR,
        ) {
            Ok(s) => s,
            Err(e) => {
                fatal(&events, EngineErrorKind::Media, format!("Failed to create scaler: {}", e));
                return;
            }
        };

        info!(%url, width, height, "Stream opened");
        if !events.emit(EngineEvent::ManifestParsed) {
            return;
        }
        events.emit(EngineEvent::LevelLoaded);

        let monitor = StallMonitor::new(STALL_AFTER, Instant::now());
        let watcher = {
            let monitor = monitor.clone();
            let frames = frames.clone();
            let stop = Arc::clone(&stop);
            let events = events.clone();
            thread::Builder::new()
                .name("ffmpeg-stall".into())
                .spawn(move || stall_watcher(monitor, frames, stop, events))
        };
        if let Err(e) = watcher {
            warn!(error = %e, "Stall watcher not started");
        }

        let frame_duration = Duration::from_secs_f64(1.0 / 30.0); // Target 30fps display
        let mut last_frame_time = Instant::now();

        for (stream, packet) in ictx.packets() {
            if stop.load(Ordering::Relaxed) {
                debug!("Decoder stopped");
                break;
            }

            if frames.is_paused() {
                thread::sleep(Duration::from_millis(50));
                last_frame_time = Instant::now();
                monitor.hold(last_frame_time);
                continue;
            }

            if stream.index() != video_stream_index {
                continue;
            }

            if let Err(e) = decoder.send_packet(&packet) {
                events.emit(EngineEvent::Error {
                    fatal: false,
                    kind: EngineErrorKind::Media,
                    details: e.to_string(),
                });
                continue;
            }

            let mut decoded = VideoFrame::empty();
            while decoder.receive_frame(&mut decoded).is_ok() {
                let mut rgb_frame = VideoFrame::empty();
                if scaler.run(&decoded, &mut rgb_frame).is_err() {
                    continue;
                }

                let data = rgb_frame.data(0);
                let stride = rgb_frame.stride(0);

                // Copy frame data (handling stride)
                let mut frame_data = Vec::with_capacity((target_width * target_height * 3) as usize);
                for y in 0..target_height as usize {
                    let row_start = y * stride;
                    let row_end = row_start + (target_width as usize * 3);
                    frame_data.extend_from_slice(&data[row_start..row_end]);
                }

                frames.push(DecodedFrame {
                    width: target_width,
                    height: target_height,
                    data: frame_data,
                    pts: decoded.pts().unwrap_or(0),
                });
                if let Some(event) = monitor.frame_delivered(Instant::now()) {
                    events.emit(event);
                }

                // Rate limiting to avoid overwhelming the UI
                let elapsed = last_frame_time.elapsed();
                if elapsed < frame_duration {
                    thread::sleep(frame_duration - elapsed);
                }
                last_frame_time = Instant::now();
            }
        }

        monitor.close();
        if !stop.load(Ordering::Relaxed) {
            fatal(&events, EngineErrorKind::Network, "Stream ended".to_string());
        }
    }
}

#[cfg(not(feature = "internal-player"))]
mod engine_impl {
    use crate::engine::{
        event_channel, EngineErrorKind, EngineEvent, EventSink, MediaSurface, StreamingEngine,
        Subscription,
    };

    pub fn init() {}

    /// Placeholder that fails on attach when FFmpeg support is compiled out
    pub struct FfmpegEngine {
        events: Option<EventSink<EngineEvent>>,
    }

    impl FfmpegEngine {
        pub fn new(_user_agent: &str) -> Self {
            Self { events: None }
        }
    }

    impl StreamingEngine for FfmpegEngine {
        fn subscribe(&mut self) -> Subscription<EngineEvent> {
            let (sink, subscription) = event_channel();
            self.events = Some(sink);
            subscription
        }

        fn load_source(&mut self, _url: &str) {}

        fn attach_media(&mut self, _surface: &mut dyn MediaSurface) {
            if let Some(ref events) = self.events {
                events.emit(EngineEvent::Error {
                    fatal: true,
                    kind: EngineErrorKind::Other,
                    details: "Internal player not enabled. Build with --features internal-player".to_string(),
                });
            }
        }

        fn destroy(&mut self) {
            self.events = None;
        }
    }
}

pub use engine_impl::FfmpegEngine;

#[cfg(test)]
#[path = "ffmpeg_player_tests.rs"]
mod tests;

/// Creates FFmpeg engines; unsupported when built without `internal-player`
pub struct FfmpegEngineFactory {
    user_agent: String,
}

impl FfmpegEngineFactory {
    pub fn new(user_agent: &str) -> Self {
        Self {
            user_agent: user_agent.to_string(),
        }
    }
}

impl EngineFactory for FfmpegEngineFactory {
    fn is_supported(&self) -> bool {
        cfg!(feature = "internal-player")
    }

    fn create(&self) -> Box<dyn StreamingEngine> {
        engine_impl::init();
        Box::new(FfmpegEngine::new(&self.user_agent))
    }
}
