// Domain layer - console data model and pure logic
pub mod history;
pub mod nc_program;
pub mod session;
pub mod stream_event;
pub mod telemetry;
pub mod toolpath;
