//! Dashboard application entry points
//!
//! The live window drives the capture session from its frame loop; the
//! replay window steps through cached captures on the capture key.

use eframe::egui;
use std::time::Duration;
use tracing::{info, warn};

use crate::capture::{Camera, CaptureSession, CaptureStatus};
use crate::config::{AppConfig, KeyConfig};
use crate::dashboard::components::{render_result_panel, ResultAction, StatusCard};
use crate::dashboard::state::{ImagePanel, ResultForm};
use crate::dashboard::theme::{self, ResultColors};
use crate::replay::Replay;
use crate::storage::RecordStore;

const TICK: Duration = Duration::from_millis(10);
const PREVIEW: egui::Vec2 = egui::vec2(480.0, 320.0);

/// Window settings shared by both apps
fn options(title: &str) -> eframe::NativeOptions {
    eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 720.0])
            .with_min_inner_size([800.0, 500.0])
            .with_title(title),
        ..Default::default()
    }
}

/// Key bindings resolved once at startup
#[derive(Debug, Clone, Copy)]
struct Keys {
    capture: Option<egui::Key>,
    exit: Option<egui::Key>,
}

impl Keys {
    fn from_config(keys: &KeyConfig) -> Self {
        Self {
            capture: keys.capture_key(),
            exit: keys.exit_key(),
        }
    }

    fn pressed(ctx: &egui::Context, key: Option<egui::Key>) -> bool {
        // Keys typed into the result form belong to the form
        key.is_some_and(|key| !ctx.wants_keyboard_input() && ctx.input(|i| i.key_pressed(key)))
    }

    fn handle_exit(&self, ctx: &egui::Context) {
        if Self::pressed(ctx, self.exit) {
            info!("Exit key pressed");
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }
    }
}

/// Live capture window
pub struct LiveApp {
    session: CaptureSession,
    camera: Camera,
    store: RecordStore,
    keys: Keys,
    colors: ResultColors,
    text_scale: f32,
    camera_panel: ImagePanel,
    debug_panel: ImagePanel,
    result_panel: ImagePanel,
    form: ResultForm,
    /// Status the result panel was last drawn for
    shown_status: Option<CaptureStatus>,
    theme_applied: bool,
}

impl LiveApp {
    pub fn new(session: CaptureSession, camera: Camera, store: RecordStore, config: &AppConfig) -> Self {
        Self {
            session,
            camera,
            store,
            keys: Keys::from_config(&config.keys),
            colors: ResultColors::from(&config.palette),
            text_scale: config.window.result_text_scale,
            camera_panel: ImagePanel::new("camera"),
            debug_panel: ImagePanel::new("barcode"),
            result_panel: ImagePanel::new("result"),
            form: ResultForm::default(),
            shown_status: None,
            theme_applied: false,
        }
    }

    fn save(&mut self) {
        let edits = self.form.edits();
        match self.session.confirm(&self.store, &edits) {
            Ok(record) => {
                info!("Saved {} ({})", record.full_name, record.student_id);
                self.form.clear();
            }
            Err(e) => {
                warn!("Save failed: {}", e);
                self.form.save_error = Some(e.to_string());
            }
        }
    }

    fn abort(&mut self) {
        self.session.reset_lifecycle();
        self.form.clear();
    }

    fn handle_keys(&mut self, ctx: &egui::Context) {
        self.keys.handle_exit(ctx);
        if !Keys::pressed(ctx, self.keys.capture) {
            return;
        }
        match self.session.status() {
            CaptureStatus::Success => self.save(),
            CaptureStatus::Monitor => {
                self.session.trigger_now();
            }
            _ => {}
        }
    }

    fn sync_panels(&mut self, ctx: &egui::Context) {
        let state = self.session.state();
        if let Some(frame) = &state.frame {
            self.camera_panel.set(ctx, &frame.image);
        }
        if let Some(debug) = &state.debug_frame {
            self.debug_panel.set(ctx, debug);
        }

        // Result images only change on a transition
        if self.shown_status != Some(state.status) {
            match &state.result_frame {
                Some(image) => self.result_panel.set(ctx, image),
                None => self.result_panel.clear(),
            }
            self.shown_status = Some(state.status);
        }
        match (&state.card, state.status) {
            (Some(card), CaptureStatus::Success) => self.form.load(card),
            (_, CaptureStatus::Success) => {}
            _ => {
                if self.form != ResultForm::default() {
                    self.form.clear();
                }
            }
        }
    }
}

impl eframe::App for LiveApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if !self.theme_applied {
            theme::apply_theme(ctx, self.text_scale);
            self.theme_applied = true;
        }

        match self.camera.read() {
            Some(frame) => self.session.tick(frame),
            None => self.session.poll_worker(),
        }
        self.handle_keys(ctx);
        self.sync_panels(ctx);

        let mut action = ResultAction::None;
        egui::SidePanel::right("result")
            .resizable(false)
            .default_width(420.0)
            .show(ctx, |ui| {
                let state = self.session.state();
                let mut card = StatusCard::for_status(state.status, &self.colors);
                if let Some(error) = &state.error {
                    card = card.with_detail(format!("{}: {}", error.kind().label(), error));
                }
                card.show(ui);
                ui.add_space(8.0);

                self.result_panel
                    .show(ui, egui::vec2(400.0, 260.0), "Present a card to the camera");
                ui.add_space(8.0);

                if let (CaptureStatus::Success, Some(card)) = (state.status, &state.card) {
                    action = render_result_panel(ui, card, &mut self.form, &self.colors, true);
                }
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.horizontal_wrapped(|ui| {
                self.camera_panel.show(ui, PREVIEW, "Waiting for camera...");
                self.debug_panel.show(ui, PREVIEW, "");
            });
        });

        match action {
            ResultAction::Save => self.save(),
            ResultAction::Abort => self.abort(),
            ResultAction::None => {}
        }

        ctx.request_repaint_after(TICK);
    }
}

/// Run the live capture window (blocking)
pub fn run_live(app: LiveApp, title: &str) -> Result<(), eframe::Error> {
    eframe::run_native(title, options(title), Box::new(|_cc| Ok(Box::new(app))))
}

/// Replay / import window
pub struct ReplayApp {
    replay: Replay,
    /// Present in import mode, where cards can be saved
    store: Option<RecordStore>,
    keys: Keys,
    colors: ResultColors,
    text_scale: f32,
    debug_panel: ImagePanel,
    result_panel: ImagePanel,
    form: ResultForm,
    message: Option<String>,
    loaded: bool,
    theme_applied: bool,
}

impl ReplayApp {
    pub fn new(replay: Replay, store: Option<RecordStore>, config: &AppConfig) -> Self {
        Self {
            replay,
            store,
            keys: Keys::from_config(&config.keys),
            colors: ResultColors::from(&config.palette),
            text_scale: config.window.result_text_scale,
            debug_panel: ImagePanel::new("replay_barcode"),
            result_panel: ImagePanel::new("replay_result"),
            form: ResultForm::default(),
            message: None,
            loaded: false,
            theme_applied: false,
        }
    }

    fn show_current(&mut self, ctx: &egui::Context) {
        self.form.clear();
        match self.replay.current() {
            Some(item) => {
                self.debug_panel.set(ctx, &item.debug_frame);
                self.result_panel.set(ctx, item.result_frame());
                if let Some(card) = item.card() {
                    self.form.load(card);
                }
                self.message = None;
            }
            None => {
                self.debug_panel.clear();
                self.result_panel.clear();
                let message = if self.replay.cursor().is_empty() {
                    "No cached captures"
                } else {
                    "No more captures"
                };
                self.message = Some(message.to_string());
            }
        }
    }

    fn next(&mut self, ctx: &egui::Context) {
        self.replay.advance();
        self.show_current(ctx);
    }

    fn save(&mut self, ctx: &egui::Context) {
        let Some(store) = &self.store else {
            return;
        };
        match self.replay.save_current(store, &self.form.edits()) {
            Ok(record) => {
                info!("Imported {} ({})", record.full_name, record.student_id);
                self.next(ctx);
            }
            Err(e) => {
                warn!("Import save failed: {}", e);
                self.form.save_error = Some(e.to_string());
            }
        }
    }
}

impl eframe::App for ReplayApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if !self.theme_applied {
            theme::apply_theme(ctx, self.text_scale);
            self.theme_applied = true;
        }
        if !self.loaded {
            self.replay.load_current();
            self.show_current(ctx);
            self.loaded = true;
        }

        self.keys.handle_exit(ctx);
        if Keys::pressed(ctx, self.keys.capture) {
            self.next(ctx);
        }

        let mut action = ResultAction::None;
        egui::SidePanel::right("replay_result")
            .resizable(false)
            .default_width(420.0)
            .show(ctx, |ui| {
                let cursor = self.replay.cursor();
                let position = format!("{} / {}", (cursor.index() + 1).min(cursor.len()), cursor.len());

                match self.replay.current() {
                    Some(item) => {
                        let status = if item.outcome.is_ok() {
                            StatusCard::new("Valid", self.colors.success)
                        } else {
                            StatusCard::new("Rejected", self.colors.failure)
                        };
                        let detail = match &item.outcome {
                            Ok(_) => format!("{} ({})", item.id, position),
                            Err(failure) => format!("{} ({}): {}", item.id, position, failure.error),
                        };
                        status.with_detail(detail).show(ui);
                        ui.add_space(8.0);
                        self.result_panel.show(ui, egui::vec2(400.0, 260.0), "");
                        ui.add_space(8.0);

                        if let Some(card) = item.card() {
                            action = render_result_panel(ui, card, &mut self.form, &self.colors, self.store.is_some());
                        }
                    }
                    None => {
                        let message = self.message.as_deref().unwrap_or_default();
                        StatusCard::new(message, self.colors.neutral).show(ui);
                    }
                }
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.debug_panel.show(ui, egui::vec2(640.0, 480.0), "");
        });

        match action {
            ResultAction::Save => self.save(ctx),
            ResultAction::Abort => self.next(ctx),
            ResultAction::None => {}
        }

        ctx.request_repaint_after(Duration::from_millis(100));
    }
}

/// Run the replay window (blocking)
pub fn run_replay(app: ReplayApp, title: &str) -> Result<(), eframe::Error> {
    eframe::run_native(title, options(title), Box::new(|_cc| Ok(Box::new(app))))
}
