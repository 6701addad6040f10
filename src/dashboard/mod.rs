//! Dashboard UI Module
//!
//! Windows for live capture and for stepping through cached captures.

pub mod app;
pub mod components;
pub mod state;
pub mod theme;

pub use app::{run_live, run_replay, LiveApp, ReplayApp};
