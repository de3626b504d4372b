// Presentation layer - Local console HTTP API
pub mod app_state;
pub mod handlers;
