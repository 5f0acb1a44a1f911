//! TheBox Player - Rust Edition
//! Desktop IPTV channel player with adaptive stream playback

// Hide console window on Windows release builds
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

// Use mimalloc for faster memory allocation (Linux, macOS)
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use eframe::egui;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod controller;
mod engine;
mod ffmpeg_player;
mod models;
mod player_view;
mod session;
mod watchdog;

#[cfg(test)]
mod test_support;

use api::ApiClient;
use config::AppConfig;
use controller::{Navigation, PlaybackController, ThreadDispatch};
use ffmpeg_player::FfmpegEngineFactory;
use models::{ChannelId, PlayerStatus};
use player_view::{show_player_page, VideoSurface};

/// How often the UI wakes up to drain events and check the watchdog
const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn main() -> Result<(), eframe::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("thebox_player=info")),
        )
        .init();

    let config = AppConfig::load();
    let initial_channel = std::env::args()
        .nth(1)
        .filter(|id| !id.trim().is_empty())
        .or_else(|| Some(config.last_channel_id.clone()).filter(|id| !id.is_empty()));

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1250.0, 700.0])
            .with_min_inner_size([900.0, 500.0]),
        vsync: true,
        hardware_acceleration: if config.hw_accel {
            eframe::HardwareAcceleration::Preferred
        } else {
            eframe::HardwareAcceleration::Off
        },
        ..Default::default()
    };

    eframe::run_native(
        "TheBox Player",
        options,
        Box::new(move |cc| {
            install_emoji_font(&cc.egui_ctx);
            if config.dark_mode {
                cc.egui_ctx.set_visuals(egui::Visuals::dark());
            } else {
                cc.egui_ctx.set_visuals(egui::Visuals::light());
            }
            Ok(Box::new(PlayerApp::new(config, initial_channel)))
        }),
    )
}

/// Add a system emoji font so the control glyphs render
fn install_emoji_font(ctx: &egui::Context) {
    #[cfg(target_os = "windows")]
    let candidates: &[&str] = &["C:\\Windows\\Fonts\\seguiemj.ttf"];
    #[cfg(target_os = "macos")]
    let candidates: &[&str] = &["/System/Library/Fonts/Apple Color Emoji.ttc"];
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    let candidates: &[&str] = &[
        "/usr/share/fonts/truetype/noto/NotoColorEmoji.ttf",
        "/usr/share/fonts/noto-emoji/NotoColorEmoji.ttf",
        "/usr/share/fonts/google-noto-emoji/NotoColorEmoji.ttf",
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    ];

    let mut fonts = egui::FontDefinitions::default();
    for path in candidates {
        if let Ok(font_data) = std::fs::read(path) {
            fonts.font_data.insert(
                "emoji".to_owned(),
                egui::FontData::from_owned(font_data).into(),
            );
            fonts.families
                .entry(egui::FontFamily::Proportional)
                .or_default()
                .push("emoji".to_owned());
            break;
        }
    }
    ctx.set_fonts(fonts);
}

struct PlayerApp {
    config: AppConfig,
    controller: PlaybackController<VideoSurface>,
    channel_input: String,
}

impl PlayerApp {
    fn new(config: AppConfig, initial_channel: Option<String>) -> Self {
        let base_url = config.api_base_url();
        info!(%base_url, "Using catalog API");

        let resolver = ApiClient::new(&base_url, config.request_timeout())
            .with_user_agent(&config.user_agent);
        let engines = FfmpegEngineFactory::new(&config.user_agent);
        let mut controller = PlaybackController::new(
            &config,
            Arc::new(resolver),
            Box::new(engines),
            Box::new(ThreadDispatch),
        );
        controller.mount_surface(VideoSurface::new());

        let mut app = Self {
            config,
            controller,
            channel_input: String::new(),
        };
        if let Some(id) = initial_channel {
            app.open_channel(&id);
        }
        app
    }

    fn open_channel(&mut self, id: &str) {
        let id = id.trim();
        if id.is_empty() {
            return;
        }
        self.channel_input = id.to_string();
        self.controller.open(ChannelId::new(id));
        self.remember_channel(id);
    }

    fn remember_channel(&mut self, id: &str) {
        if self.config.last_channel_id == id {
            return;
        }
        self.config.last_channel_id = id.to_string();
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
    }

    fn show_channel_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("channel_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label("Channel:");
                let input = ui.add(
                    egui::TextEdit::singleline(&mut self.channel_input)
                        .hint_text("channel id")
                        .desired_width(240.0),
                );
                let submitted = input.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                if ui.button("▶ Open").clicked() || submitted {
                    let id = self.channel_input.clone();
                    self.open_channel(&id);
                }
            });
        });
    }
}

impl eframe::App for PlayerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.controller.poll();

        self.show_channel_bar(ctx);

        if let Some(Navigation::Back) = show_player_page(ctx, &mut self.controller) {
            self.channel_input.clear();
            self.remember_channel("");
        }

        // Keep frames flowing while playing; otherwise just tick for events and the watchdog
        if self.controller.status() == PlayerStatus::Playing {
            ctx.request_repaint();
        } else {
            ctx.request_repaint_after(POLL_INTERVAL);
        }
    }
}
