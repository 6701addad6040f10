//! Dashboard view state
//!
//! Texture caches for the image panels and the editable result form.

use chrono::{DateTime, Local};
use image::RgbImage;

use crate::card::Card;
use crate::storage::RecordEdits;

/// One image shown in the window, backed by a reusable texture
pub struct ImagePanel {
    name: &'static str,
    texture: Option<egui::TextureHandle>,
    size: Option<(u32, u32)>,
}

impl std::fmt::Debug for ImagePanel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagePanel")
            .field("name", &self.name)
            .field("texture", &self.texture.as_ref().map(|_| "<texture>"))
            .field("size", &self.size)
            .finish()
    }
}

impl ImagePanel {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            texture: None,
            size: None,
        }
    }

    /// Upload `image`, reusing the texture when the size is unchanged
    pub fn set(&mut self, ctx: &egui::Context, image: &RgbImage) {
        let (width, height) = image.dimensions();
        let color_image = egui::ColorImage::from_rgb([width as usize, height as usize], image.as_raw());

        if self.size == Some((width, height)) {
            if let Some(texture) = &mut self.texture {
                texture.set(color_image, egui::TextureOptions::LINEAR);
                return;
            }
        }
        self.texture = Some(ctx.load_texture(self.name, color_image, egui::TextureOptions::LINEAR));
        self.size = Some((width, height));
    }

    pub fn clear(&mut self) {
        self.texture = None;
        self.size = None;
    }

    /// Draw scaled to fit `max`, or a placeholder
    pub fn show(&self, ui: &mut egui::Ui, max: egui::Vec2, placeholder: &str) {
        match &self.texture {
            Some(texture) => {
                let tex_size = texture.size_vec2();
                let scale = (max.x / tex_size.x).min(max.y / tex_size.y).min(1.0);
                ui.image((texture.id(), tex_size * scale));
            }
            None => {
                let (rect, _) = ui.allocate_exact_size(max, egui::Sense::hover());
                ui.painter().text(
                    rect.center(),
                    egui::Align2::CENTER_CENTER,
                    placeholder,
                    egui::FontId::proportional(14.0),
                    super::theme::ThemeColors::TEXT_MUTED,
                );
            }
        }
    }
}

/// Editable copy of the card values shown next to the result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultForm {
    pub full_name: String,
    pub student_id: String,
    /// Last save failure, shown until the next attempt
    pub save_error: Option<String>,
    /// Capture the form was filled from
    loaded_for: Option<DateTime<Local>>,
    original: (String, String),
}

impl ResultForm {
    /// Fill the form from `card` unless it already holds that card's values
    pub fn load(&mut self, card: &Card) {
        if self.loaded_for == Some(card.captured_at) {
            return;
        }
        let full_name = card.full_name().unwrap_or_default().to_string();
        let student_id = card.student_id.clone().unwrap_or_default();
        *self = Self {
            full_name: full_name.clone(),
            student_id: student_id.clone(),
            save_error: None,
            loaded_for: Some(card.captured_at),
            original: (full_name, student_id),
        };
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Only the values the user actually changed
    pub fn edits(&self) -> RecordEdits {
        let changed = |value: &str, original: &str| {
            let value = value.trim();
            (value != original.trim()).then(|| value.to_string())
        };
        RecordEdits {
            full_name: changed(&self.full_name, &self.original.0),
            student_id: changed(&self.student_id, &self.original.1),
        }
    }
}
