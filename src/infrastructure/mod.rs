// Infrastructure layer - External dependencies and adapters
pub mod backend_client;
pub mod config;
pub mod log_source;
pub mod nc_file;
pub mod realtime_transport;
pub mod stream_message;
pub mod subscribers;
