//! Terminal call console using Ratatui.

mod app;
mod debug_log;
mod help;
pub mod indicator;
pub mod log_capture;
mod ui;

pub use app::run;
