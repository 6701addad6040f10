//! Result form: read values, corrections, save and abort

use egui::RichText;

use crate::card::{Card, FieldType};
use crate::dashboard::state::ResultForm;
use crate::dashboard::theme::{ResultColors, ThemeColors};

/// What the user asked for this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultAction {
    None,
    Save,
    Abort,
}

/// Draw the form for `card`. Save is only offered when `can_save`.
pub fn render_result_panel(
    ui: &mut egui::Ui,
    card: &Card,
    form: &mut ResultForm,
    colors: &ResultColors,
    can_save: bool,
) -> ResultAction {
    let mut action = ResultAction::None;

    egui::Grid::new("result_fields")
        .num_columns(2)
        .spacing([12.0, 8.0])
        .show(ui, |ui| {
            ui.label("Name");
            ui.text_edit_singleline(&mut form.full_name);
            ui.end_row();

            ui.label("Student ID");
            ui.text_edit_singleline(&mut form.student_id);
            ui.end_row();

            for field in card
                .fields
                .iter()
                .filter(|f| !matches!(f.field_type, FieldType::Name | FieldType::StudentId))
            {
                ui.label(field.field_type.as_str());
                ui.label(&field.value);
                ui.end_row();
            }
        });

    let uncertain: Vec<&str> = card
        .fields
        .iter()
        .filter(|f| !f.is_matched())
        .map(|f| f.field_type.as_str())
        .collect();
    if !uncertain.is_empty() {
        ui.label(RichText::new(format!("Check: {}", uncertain.join(", "))).color(ThemeColors::WARNING));
    }

    if let Some(error) = &form.save_error {
        ui.label(RichText::new(format!("Not saved: {error}")).color(colors.failure));
    }

    ui.add_space(8.0);
    ui.horizontal(|ui| {
        let save = ui.add_enabled(can_save, egui::Button::new(RichText::new("Save").color(colors.success)));
        if save.clicked() {
            action = ResultAction::Save;
        }
        if ui.button(RichText::new("Abort").color(colors.failure)).clicked() {
            action = ResultAction::Abort;
        }
    });

    action
}
