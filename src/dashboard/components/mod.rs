//! Reusable UI components for the dashboard

pub mod result_panel;
pub mod status_card;

pub use result_panel::{render_result_panel, ResultAction};
pub use status_card::StatusCard;
