// Application layer - Console use cases and capability traits
pub mod auto_save;
pub mod backend_api;
pub mod line_source;
pub mod live_console;
pub mod progress_tracker;
pub mod recording_service;
pub mod session_monitor;

#[cfg(test)]
pub(crate) mod test_support;
