pub mod activity;
pub mod app;
pub mod commands;
pub mod http;

pub use app::{build_router, build_state, AppState};
