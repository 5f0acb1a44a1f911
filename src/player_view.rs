//! egui media surface and the player page

use eframe::egui;
use tracing::debug;

use crate::controller::{Navigation, PageState, PlaybackController, PlayerSnapshot};
use crate::engine::{
    event_channel, EventSink, FrameSink, MediaSurface, PlayRejected, Subscription, SurfaceEvent,
};
use crate::models::{ChannelMetadata, PlayerStatus};

/// Texture-backed surface that software engines render decoded frames into.
/// It has no native HLS support of its own.
pub struct VideoSurface {
    frames: FrameSink,
    listeners: Vec<EventSink<SurfaceEvent>>,
    texture: Option<egui::TextureHandle>,
    volume: f32,
    muted: bool,
    fullscreen_requested: bool,
    fullscreen: bool,
}

impl VideoSurface {
    pub fn new() -> Self {
        Self {
            frames: FrameSink::new(),
            listeners: Vec::new(),
            texture: None,
            volume: 1.0,
            muted: false,
            fullscreen_requested: false,
            fullscreen: false,
        }
    }

    fn emit(&mut self, event: SurfaceEvent) {
        self.listeners.retain(|sink| sink.emit(event));
    }

    /// Upload the newest decoded frame, if any
    pub fn update_texture(&mut self, ctx: &egui::Context) {
        if let Some(frame) = self.frames.take() {
            let image = egui::ColorImage::from_rgb(
                [frame.width as usize, frame.height as usize],
                &frame.data,
            );
            self.texture = Some(ctx.load_texture("video_frame", image, egui::TextureOptions::LINEAR));
        }
    }

    /// Apply a pending fullscreen request to the viewport
    pub fn apply_fullscreen(&mut self, ctx: &egui::Context) {
        if std::mem::take(&mut self.fullscreen_requested) {
            self.fullscreen = !self.fullscreen;
            ctx.send_viewport_cmd(egui::ViewportCommand::Fullscreen(self.fullscreen));
        }
    }

    pub fn texture(&self) -> Option<&egui::TextureHandle> {
        self.texture.as_ref()
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn muted(&self) -> bool {
        self.muted
    }
}

impl Default for VideoSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaSurface for VideoSurface {
    fn can_play_type(&self, _mime: &str) -> bool {
        false
    }

    fn set_source(&mut self, url: Option<&str>) {
        // Only software engines feed this surface; a source switch just drops the picture
        if url.is_none() {
            self.frames.clear();
            self.texture = None;
        }
    }

    fn play(&mut self) -> Result<(), PlayRejected> {
        self.frames.set_paused(false);
        self.emit(SurfaceEvent::Play);
        Ok(())
    }

    fn pause(&mut self) {
        self.frames.set_paused(true);
        self.emit(SurfaceEvent::Pause);
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn request_fullscreen(&mut self) {
        self.fullscreen_requested = true;
    }

    fn subscribe(&mut self) -> Subscription<SurfaceEvent> {
        let (sink, subscription) = event_channel();
        self.listeners.push(sink);
        subscription
    }

    fn frame_sink(&self) -> Option<FrameSink> {
        Some(self.frames.clone())
    }
}

/// Render the player page. Returns a navigation request when the user leaves.
pub fn show_player_page(
    ctx: &egui::Context,
    controller: &mut PlaybackController<VideoSurface>,
) -> Option<Navigation> {
    if let Some(surface) = controller.surface_mut() {
        surface.update_texture(ctx);
        surface.apply_fullscreen(ctx);
    }

    let mut navigation = None;
    let snapshot = controller.snapshot();

    let meta = match controller.page().clone() {
        PageState::Ready(meta) => meta,
        page => {
            egui::CentralPanel::default().show(ctx, |ui| {
                if ui.button("⬅ Back").clicked() {
                    navigation = Some(controller.go_back());
                }
                ui.add_space(50.0);
                ui.vertical_centered(|ui| match page {
                    PageState::Idle => {
                        ui.label("Enter a channel id to start watching.");
                    }
                    PageState::Loading => {
                        ui.spinner();
                        ui.label("Loading channel...");
                    }
                    PageState::NotFound => {
                        ui.heading("Channel Not Found");
                        ui.label("The requested channel could not be found.");
                    }
                    PageState::Failed(error) => {
                        ui.heading("Error");
                        ui.colored_label(egui::Color32::RED, error);
                        if ui.button("↻ Retry").clicked() {
                            controller.retry();
                        }
                    }
                    PageState::Ready(_) => {}
                });
            });
            return navigation;
        }
    };

    egui::SidePanel::right("channel_info")
        .resizable(false)
        .exact_width(350.0)
        .show(ctx, |ui| show_channel_info(ui, &meta, &snapshot));

    egui::CentralPanel::default().show(ctx, |ui| {
        if ui.button("⬅ Back to Channels").clicked() {
            navigation = Some(controller.go_back());
            return;
        }
        ui.separator();

        let controls_height = 40.0;
        let video_size = ui.available_size() - egui::vec2(0.0, controls_height);
        ui.allocate_ui(video_size, |ui| {
            ui.vertical_centered(|ui| show_video(ui, controller, &snapshot));
        });

        ui.separator();
        show_controls(ui, controller, &snapshot);
    });

    navigation
}

fn show_video(
    ui: &mut egui::Ui,
    controller: &PlaybackController<VideoSurface>,
    snapshot: &PlayerSnapshot,
) {
    let texture = controller.surface().and_then(VideoSurface::texture);

    if let (Some(texture), PlayerStatus::Playing) = (texture, snapshot.status) {
        let available = ui.available_size();
        let tex_size = texture.size_vec2();
        let aspect = tex_size.x / tex_size.y;

        let (width, height) = if available.x / available.y > aspect {
            (available.y * aspect * 0.95, available.y * 0.95)
        } else {
            (available.x * 0.95, available.x / aspect * 0.95)
        };

        ui.image((texture.id(), egui::vec2(width, height)));
        return;
    }

    ui.add_space(50.0);
    match snapshot.status {
        PlayerStatus::Error | PlayerStatus::Unavailable => {
            ui.label(egui::RichText::new("📺").size(48.0));
            ui.heading("Stream Unavailable");
            if let Some(ref message) = snapshot.error_message {
                ui.label(message);
            }
            if let Some(error) = controller.stream_error() {
                ui.colored_label(egui::Color32::YELLOW, format!("⚠ {}", error));
            }
        }
        _ => {
            ui.spinner();
            ui.heading("Loading stream...");
        }
    }
}

fn show_controls(
    ui: &mut egui::Ui,
    controller: &mut PlaybackController<VideoSurface>,
    snapshot: &PlayerSnapshot,
) {
    ui.horizontal(|ui| {
        let play_text = if snapshot.playing { "⏸ Pause" } else { "▶ Play" };
        if ui.button(play_text).clicked() {
            controller.toggle_play();
        }

        ui.separator();

        let mute_text = if snapshot.muted { "🔇" } else { "🔊" };
        if ui.button(mute_text).clicked() {
            controller.toggle_mute();
        }

        let mut volume = snapshot.volume;
        let slider = egui::Slider::new(&mut volume, 0.0..=1.0)
            .step_by(0.1)
            .show_value(false);
        if ui.add(slider).changed() {
            debug!(volume, "Volume changed");
            controller.set_volume(volume);
        }

        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            if ui.button("⛶ Fullscreen").clicked() {
                controller.request_fullscreen();
            }
            if snapshot.status.is_terminal() && ui.button("↻ Retry").clicked() {
                controller.retry();
            }
        });
    });
}

fn show_channel_info(ui: &mut egui::Ui, meta: &ChannelMetadata, snapshot: &PlayerSnapshot) {
    ui.add_space(10.0);
    ui.heading(&meta.name);
    ui.horizontal_wrapped(|ui| {
        for tag in meta.tags() {
            ui.label(egui::RichText::new(tag).small().background_color(ui.visuals().faint_bg_color));
        }
    });
    if let Some(ref logo) = meta.logo_url {
        ui.hyperlink_to("Channel logo", logo);
    }

    ui.add_space(10.0);
    ui.label(meta.description());

    ui.add_space(15.0);
    ui.strong("Stream Information");
    let status_color = if snapshot.status == PlayerStatus::Playing {
        egui::Color32::from_rgb(16, 185, 129)
    } else {
        egui::Color32::from_rgb(245, 158, 11)
    };
    ui.horizontal(|ui| {
        ui.label("Status:");
        ui.colored_label(status_color, format!("● {}", snapshot.status_text));
    });
    ui.label("Quality: Auto");
    ui.label(format!("Last Updated: {}", meta.last_updated_label()));

    if let Some(ref epg_id) = meta.epg_id {
        ui.add_space(15.0);
        ui.strong("EPG ID");
        ui.label(epg_id);
    }
}

#[cfg(test)]
#[path = "player_view_tests.rs"]
mod tests;
