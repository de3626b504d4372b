// Line source capability for the session monitor
use async_trait::async_trait;
use std::io;
use std::path::Path;

#[async_trait]
pub trait LineSource: Send + Sync {
    /// Last non-empty line of the log at `path`, without its line ending.
    /// `Ok(None)` means the file exists but holds no line yet.
    async fn read_last_line(&self, path: &Path) -> io::Result<Option<String>>;
}
