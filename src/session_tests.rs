//! Tests for session attach/teardown and status mapping

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use crate::engine::{EngineErrorKind, EngineEvent, MediaSurface, SurfaceEvent};
    use crate::models::{ErrorKind, PlayerStatus};
    use crate::session::PlaybackSession;
    use crate::test_support::{CallLog, FakeEngines, FakeSurface};

    const URL: &str = "https://x/bbc1.m3u8";

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn started(log: &CallLog) -> (PlaybackSession, FakeSurface, FakeEngines, Instant) {
        let t0 = Instant::now();
        let mut surface = FakeSurface::new(log);
        let engines = FakeEngines::new(log);
        let mut session = PlaybackSession::new(secs(10));
        session.start(Some(URL), Some(&mut surface as &mut dyn MediaSurface), &engines, t0);
        (session, surface, engines, t0)
    }

    #[test]
    fn test_engine_attached_with_url() {
        let log = CallLog::default();
        let (session, _surface, engines, _) = started(&log);
        assert_eq!(session.status(), PlayerStatus::Loading);
        assert!(session.has_engine());
        assert_eq!(engines.created(), 1);
        assert_eq!(
            log.entries(),
            vec![format!("engine#1 load {}", URL), "engine#1 attach".to_string()]
        );
    }

    #[test]
    fn test_manifest_parsed_plays_and_cancels_watchdog() {
        let log = CallLog::default();
        let (mut session, mut surface, engines, t0) = started(&log);

        engines.emit(1, EngineEvent::ManifestParsed);
        let playing = session.poll(t0 + Duration::from_millis(200), Some(&mut surface));

        assert_eq!(session.status(), PlayerStatus::Playing);
        assert_eq!(playing, Some(true));
        assert!(log.contains("surface play"));
        assert!(!session.watchdog_pending());

        session.poll(t0 + secs(30), Some(&mut surface));
        assert_eq!(session.status(), PlayerStatus::Playing);
        assert!(session.error_detail().is_none());
    }

    #[test]
    fn test_autoplay_rejection_keeps_status() {
        let log = CallLog::default();
        let (mut session, mut surface, engines, t0) = started(&log);
        surface.reject_play = true;

        engines.emit(1, EngineEvent::ManifestParsed);
        let playing = session.poll(t0, Some(&mut surface));

        assert_eq!(session.status(), PlayerStatus::Playing);
        assert_eq!(playing, None);
        assert!(session.error_detail().is_none());
    }

    #[test]
    fn test_fatal_error_destroys_engine() {
        let log = CallLog::default();
        let (mut session, mut surface, engines, t0) = started(&log);

        engines.emit(
            1,
            EngineEvent::Error {
                fatal: true,
                kind: EngineErrorKind::Network,
                details: "manifestLoadError".to_string(),
            },
        );
        engines.emit(1, EngineEvent::LevelLoaded);
        session.poll(t0, Some(&mut surface));

        assert_eq!(session.status(), PlayerStatus::Error);
        let detail = session.error_detail().unwrap();
        assert_eq!(detail.kind, ErrorKind::EngineFatal { network: true });
        assert_eq!(detail.details, "manifestLoadError");
        assert!(!session.has_engine());
        assert!(log.contains("engine#1 destroy"));
        assert!(!session.watchdog_pending());
        // listener was dropped with the engine
        assert!(!engines.emit(1, EngineEvent::ManifestParsed));
    }

    #[test]
    fn test_non_fatal_error_ignored() {
        let log = CallLog::default();
        let (mut session, mut surface, engines, t0) = started(&log);

        engines.emit(
            1,
            EngineEvent::Error {
                fatal: false,
                kind: EngineErrorKind::Media,
                details: "bufferNudgeOnStall".to_string(),
            },
        );
        session.poll(t0, Some(&mut surface));

        assert_eq!(session.status(), PlayerStatus::Loading);
        assert!(session.has_engine());
        assert!(session.watchdog_pending());
    }

    #[test]
    fn test_stall_and_resume() {
        let log = CallLog::default();
        let (mut session, mut surface, engines, t0) = started(&log);

        engines.emit(1, EngineEvent::ManifestParsed);
        session.poll(t0, Some(&mut surface));
        assert_eq!(session.status(), PlayerStatus::Playing);

        engines.emit(1, EngineEvent::BufferStalled);
        session.poll(t0 + secs(1), Some(&mut surface));
        assert_eq!(session.status(), PlayerStatus::Loading);
        assert!(!session.watchdog_pending());

        engines.emit(1, EngineEvent::BufferResumed);
        session.poll(t0 + secs(2), Some(&mut surface));
        assert_eq!(session.status(), PlayerStatus::Playing);

        // a long stall after playback started never times out
        engines.emit(1, EngineEvent::BufferStalled);
        session.poll(t0 + secs(60), Some(&mut surface));
        assert_eq!(session.status(), PlayerStatus::Loading);
        assert!(session.error_detail().is_none());
    }

    #[test]
    fn test_watchdog_without_url() {
        let log = CallLog::default();
        let t0 = Instant::now();
        let mut surface = FakeSurface::new(&log);
        let engines = FakeEngines::new(&log);
        let mut session = PlaybackSession::new(secs(10));

        session.start(None, Some(&mut surface), &engines, t0);
        assert_eq!(engines.created(), 0);

        session.poll(t0 + secs(9), Some(&mut surface));
        assert_eq!(session.status(), PlayerStatus::Loading);

        session.poll(t0 + secs(10), Some(&mut surface));
        assert_eq!(session.status(), PlayerStatus::Unavailable);
        assert_eq!(session.error_detail().unwrap().kind, ErrorKind::Timeout);
    }

    #[test]
    fn test_stall_after_level_loaded_never_times_out() {
        let log = CallLog::default();
        let (mut session, mut surface, engines, t0) = started(&log);

        engines.emit(1, EngineEvent::LevelLoaded);
        session.poll(t0 + secs(1), Some(&mut surface));
        assert_eq!(session.status(), PlayerStatus::Playing);
        assert!(!session.watchdog_pending());

        engines.emit(1, EngineEvent::BufferStalled);
        session.poll(t0 + secs(11), Some(&mut surface));
        assert_eq!(session.status(), PlayerStatus::Loading);
        assert!(session.error_detail().is_none());

        engines.emit(1, EngineEvent::BufferResumed);
        session.poll(t0 + secs(30), Some(&mut surface));
        assert_eq!(session.status(), PlayerStatus::Playing);
    }

    #[test]
    fn test_watchdog_reports_lookup_failure() {
        let log = CallLog::default();
        let t0 = Instant::now();
        let mut surface = FakeSurface::new(&log);
        let engines = FakeEngines::new(&log);
        let mut session = PlaybackSession::new(secs(10));

        session.start(None, Some(&mut surface), &engines, t0);
        session.note_resolution_error("Stream is unavailable");
        session.poll(t0 + secs(10), Some(&mut surface));

        let detail = session.error_detail().unwrap();
        assert_eq!(session.status(), PlayerStatus::Unavailable);
        assert_eq!(detail.kind, ErrorKind::StreamResolution);
        assert_eq!(detail.details, "Stream is unavailable");

        // a restart forgets the old lookup failure
        session.start(None, Some(&mut surface), &engines, t0 + secs(20));
        session.poll(t0 + secs(30), Some(&mut surface));
        assert_eq!(session.error_detail().unwrap().kind, ErrorKind::Timeout);
    }

    #[test]
    fn test_watchdog_when_manifest_never_arrives() {
        let log = CallLog::default();
        let (mut session, mut surface, engines, t0) = started(&log);

        engines.emit(1, EngineEvent::BufferStalled);
        session.poll(t0 + secs(11), Some(&mut surface));

        assert_eq!(session.status(), PlayerStatus::Unavailable);
        // late events do not revive a terminal session
        engines.emit(1, EngineEvent::ManifestParsed);
        session.poll(t0 + secs(12), Some(&mut surface));
        assert_eq!(session.status(), PlayerStatus::Unavailable);
    }

    #[test]
    fn test_native_fallback() {
        let log = CallLog::default();
        let t0 = Instant::now();
        let mut surface = FakeSurface::native(&log);
        let engines = FakeEngines::unsupported(&log);
        let mut session = PlaybackSession::new(secs(10));

        session.start(Some(URL), Some(&mut surface), &engines, t0);
        assert!(log.contains(&format!("surface source {}", URL)));
        assert_eq!(engines.created(), 0);

        surface.emit(SurfaceEvent::CanPlay);
        let playing = session.poll(t0 + secs(1), Some(&mut surface));
        assert_eq!(session.status(), PlayerStatus::Playing);
        assert_eq!(playing, Some(true));
        assert!(!session.watchdog_pending());

        session.teardown(Some(&mut surface));
        assert!(log.contains("surface source none"));
        assert_eq!(surface.emit(SurfaceEvent::Pause), 0);
    }

    #[test]
    fn test_no_support_is_error() {
        let log = CallLog::default();
        let t0 = Instant::now();
        let mut surface = FakeSurface::new(&log);
        let engines = FakeEngines::unsupported(&log);
        let mut session = PlaybackSession::new(secs(10));

        session.start(Some(URL), Some(&mut surface), &engines, t0);
        assert_eq!(session.status(), PlayerStatus::Error);
        assert_eq!(session.error_detail().unwrap().kind, ErrorKind::Unsupported);
        assert!(!session.watchdog_pending());
    }

    #[test]
    fn test_restart_destroys_before_load() {
        let log = CallLog::default();
        let (mut session, mut surface, engines, t0) = started(&log);

        session.start(Some("https://x/itv.m3u8"), Some(&mut surface), &engines, t0 + secs(1));

        let destroy = log.position("engine#1 destroy").unwrap();
        let load = log.position("engine#2 load https://x/itv.m3u8").unwrap();
        assert!(destroy < load);
        assert_eq!(session.status(), PlayerStatus::Loading);
        assert!(!engines.emit(1, EngineEvent::ManifestParsed));
    }

    #[test]
    fn test_restart_clears_terminal_state() {
        let log = CallLog::default();
        let t0 = Instant::now();
        let mut surface = FakeSurface::new(&log);
        let engines = FakeEngines::new(&log);
        let mut session = PlaybackSession::new(secs(10));

        session.start(None, Some(&mut surface), &engines, t0);
        session.poll(t0 + secs(10), Some(&mut surface));
        assert_eq!(session.status(), PlayerStatus::Unavailable);

        session.start(Some(URL), Some(&mut surface), &engines, t0 + secs(11));
        assert_eq!(session.status(), PlayerStatus::Loading);
        assert!(session.error_detail().is_none());
    }

    #[test]
    fn test_drop_destroys_engine() {
        let log = CallLog::default();
        let (session, _surface, _engines, _) = started(&log);
        drop(session);
        assert!(log.contains("engine#1 destroy"));
    }
}
