//! Status card showing where the capture lifecycle is

use egui::{Color32, RichText, Rounding, Vec2};

use crate::capture::CaptureStatus;
use crate::dashboard::theme::{ResultColors, ThemeColors};

/// A card with a coloured status dot, a title and a detail line
pub struct StatusCard {
    pub title: String,
    pub detail: Option<String>,
    pub color: Color32,
}

impl StatusCard {
    pub fn new(title: impl Into<String>, color: Color32) -> Self {
        Self {
            title: title.into(),
            detail: None,
            color,
        }
    }

    /// Card for a capture status, coloured from the result palette
    pub fn for_status(status: CaptureStatus, colors: &ResultColors) -> Self {
        let color = match status {
            CaptureStatus::Capture => ThemeColors::TEXT_MUTED,
            CaptureStatus::Monitor | CaptureStatus::Detect => ThemeColors::WARNING,
            CaptureStatus::Success => colors.success,
            CaptureStatus::Errored => colors.failure,
        };
        Self::new(status.label(), color)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn show(&self, ui: &mut egui::Ui) {
        egui::Frame::none()
            .fill(ThemeColors::BG_MEDIUM)
            .rounding(Rounding::same(8.0))
            .inner_margin(12.0)
            .show(ui, |ui| {
                ui.set_min_width(240.0);
                ui.horizontal(|ui| {
                    let dot = ui.cursor().left_top() + Vec2::new(6.0, 11.0);
                    ui.painter().circle_filled(dot, 5.0, self.color);
                    ui.add_space(18.0);

                    ui.vertical(|ui| {
                        ui.label(RichText::new(&self.title).heading().color(self.color));
                        if let Some(detail) = &self.detail {
                            ui.label(RichText::new(detail).color(ThemeColors::TEXT_PRIMARY));
                        }
                    });
                });
            });
    }
}
