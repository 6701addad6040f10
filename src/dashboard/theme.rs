//! Dashboard theme and styling
//!
//! Dark desk theme; result colours come from the configured palette.

use egui::{Color32, FontFamily, FontId, Rounding, Stroke, TextStyle, Visuals};

use crate::vision::Palette;

/// Fixed UI colours
pub struct ThemeColors;

impl ThemeColors {
    pub const BG_DARK: Color32 = Color32::from_rgb(20, 20, 24);
    pub const BG_MEDIUM: Color32 = Color32::from_rgb(30, 30, 36);
    pub const BG_LIGHT: Color32 = Color32::from_rgb(42, 42, 50);

    pub const ACCENT: Color32 = Color32::from_rgb(88, 166, 255);
    pub const WARNING: Color32 = Color32::from_rgb(255, 193, 7);

    pub const TEXT_PRIMARY: Color32 = Color32::from_rgb(240, 240, 245);
    pub const TEXT_MUTED: Color32 = Color32::from_rgb(120, 120, 135);

    pub const BORDER: Color32 = Color32::from_rgb(50, 50, 65);
}

/// Convert a palette entry to an egui colour
pub fn palette_color(rgb: [u8; 3]) -> Color32 {
    Color32::from_rgb(rgb[0], rgb[1], rgb[2])
}

/// Colours for status and result text
#[derive(Debug, Clone, Copy)]
pub struct ResultColors {
    pub success: Color32,
    pub failure: Color32,
    pub neutral: Color32,
}

impl From<&Palette> for ResultColors {
    fn from(palette: &Palette) -> Self {
        Self {
            success: palette_color(palette.success),
            failure: palette_color(palette.failure),
            neutral: palette_color(palette.neutral),
        }
    }
}

/// Apply the theme, with result text scaled by `text_scale`
pub fn apply_theme(ctx: &egui::Context, text_scale: f32) {
    let mut style = (*ctx.style()).clone();
    let mut visuals = Visuals::dark();

    visuals.window_fill = ThemeColors::BG_MEDIUM;
    visuals.panel_fill = ThemeColors::BG_DARK;
    visuals.faint_bg_color = ThemeColors::BG_LIGHT;
    visuals.extreme_bg_color = ThemeColors::BG_DARK;

    for widget in [
        &mut visuals.widgets.noninteractive,
        &mut visuals.widgets.inactive,
        &mut visuals.widgets.hovered,
        &mut visuals.widgets.active,
        &mut visuals.widgets.open,
    ] {
        widget.rounding = Rounding::same(6.0);
        widget.fg_stroke = Stroke::new(1.0, ThemeColors::TEXT_PRIMARY);
    }
    visuals.widgets.inactive.bg_fill = ThemeColors::BG_LIGHT;
    visuals.widgets.active.bg_fill = ThemeColors::ACCENT;
    visuals.selection.stroke = Stroke::new(1.0, ThemeColors::ACCENT);
    visuals.window_stroke = Stroke::new(1.0, ThemeColors::BORDER);

    style.visuals = visuals;
    style.spacing.item_spacing = egui::vec2(8.0, 6.0);
    style.spacing.button_padding = egui::vec2(12.0, 6.0);

    let scale = text_scale.clamp(0.5, 4.0);
    style.text_styles = [
        (TextStyle::Small, FontId::new(13.0, FontFamily::Proportional)),
        (TextStyle::Body, FontId::new(16.0 * scale, FontFamily::Proportional)),
        (TextStyle::Monospace, FontId::new(15.0 * scale, FontFamily::Monospace)),
        (TextStyle::Button, FontId::new(16.0 * scale, FontFamily::Proportional)),
        (TextStyle::Heading, FontId::new(22.0 * scale, FontFamily::Proportional)),
    ]
    .into();

    ctx.set_style(style);
}
