//! Tests for the egui video surface

#[cfg(test)]
mod tests {
    use crate::engine::{DecodedFrame, MediaSurface, SurfaceEvent, HLS_MIME};
    use crate::player_view::VideoSurface;

    fn frame() -> DecodedFrame {
        DecodedFrame {
            width: 2,
            height: 1,
            data: vec![0; 6],
            pts: 0,
        }
    }

    #[test]
    fn test_no_native_hls() {
        let surface = VideoSurface::new();
        assert!(!surface.can_play_type(HLS_MIME));
        assert!(surface.frame_sink().is_some());
    }

    #[test]
    fn test_pause_and_play_reach_listeners_and_engine() {
        let mut surface = VideoSurface::new();
        let events = surface.subscribe();
        let sink = surface.frame_sink().unwrap();

        surface.pause();
        assert!(sink.is_paused());
        surface.play().unwrap();
        assert!(!sink.is_paused());

        assert_eq!(events.drain(), vec![SurfaceEvent::Pause, SurfaceEvent::Play]);
    }

    #[test]
    fn test_dropped_listener_is_pruned() {
        let mut surface = VideoSurface::new();
        let events = surface.subscribe();
        drop(events);
        surface.pause();
        let events = surface.subscribe();
        surface.play().unwrap();
        assert_eq!(events.drain(), vec![SurfaceEvent::Play]);
    }

    #[test]
    fn test_clearing_source_drops_pending_frame() {
        let mut surface = VideoSurface::new();
        let sink = surface.frame_sink().unwrap();
        sink.push(frame());
        surface.set_source(None);
        assert!(sink.take().is_none());
    }

    #[test]
    fn test_volume_and_mute_applied() {
        let mut surface = VideoSurface::new();
        surface.set_volume(0.3);
        surface.set_muted(true);
        assert_eq!(surface.volume(), 0.3);
        assert!(surface.muted());
    }
}
