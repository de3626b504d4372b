// Vendor log access - file-system and in-memory line sources
use crate::application::line_source::LineSource;
use crate::domain::session::LogKind;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Bytes read from the end of a log before widening the window
const TAIL_WINDOW: u64 = 16 * 1024;

/// Daily log file layout of the machine-control software.
///
/// Each root holds `Trace/Trace_<date>.txt` and
/// `Exception/Exception_<date>.txt`; roots are tried in order.
#[derive(Debug, Clone)]
pub struct LogLayout {
    roots: Vec<PathBuf>,
}

impl LogLayout {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    pub fn candidates(&self, kind: LogKind, date: NaiveDate) -> Vec<PathBuf> {
        let (dir, prefix) = match kind {
            LogKind::Trace => ("Trace", "Trace"),
            LogKind::Exception => ("Exception", "Exception"),
        };
        let file_name = format!("{}_{}.txt", prefix, date.format("%Y-%m-%d"));
        self.roots
            .iter()
            .map(|root| root.join(dir).join(&file_name))
            .collect()
    }
}

/// Reads the tail of real log files
#[derive(Debug, Default, Clone)]
pub struct FsLineSource;

impl FsLineSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LineSource for FsLineSource {
    async fn read_last_line(&self, path: &Path) -> io::Result<Option<String>> {
        let mut file = tokio::fs::File::open(path).await?;
        let len = file.metadata().await?.len();

        let mut window = TAIL_WINDOW;
        loop {
            let start = len.saturating_sub(window);
            file.seek(SeekFrom::Start(start)).await?;
            let mut tail = Vec::with_capacity((len - start) as usize);
            file.read_to_end(&mut tail).await?;

            let text = String::from_utf8_lossy(&tail);
            let mut lines = text.lines().rev().filter(|l| !l.trim().is_empty());
            let last = lines.next();
            // The window may have cut the last line in half unless another
            // line precedes it or we read from the start of the file
            let complete = start == 0 || lines.next().is_some();
            if complete {
                return Ok(last.map(|l| l.trim_end().to_string()));
            }
            window = window.saturating_mul(2);
        }
    }
}

/// In-memory logs keyed by path, for offline runs and tests
#[derive(Debug, Default)]
pub struct MemoryLineSource {
    files: RwLock<HashMap<PathBuf, Vec<String>>>,
}

impl MemoryLineSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_line(&self, path: impl Into<PathBuf>, line: impl Into<String>) {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(path.into())
            .or_default()
            .push(line.into());
    }
}

/// Writes lines into the in-memory logs at the paths the monitor polls,
/// standing in for the machine-control software when it is not around
#[derive(Debug, Clone)]
pub struct LogInjector {
    source: Arc<MemoryLineSource>,
    layout: LogLayout,
}

impl LogInjector {
    pub fn new(source: Arc<MemoryLineSource>, layout: LogLayout) -> Self {
        Self { source, layout }
    }

    /// Append to the primary candidate for `date`; `None` without log roots
    pub fn append(&self, kind: LogKind, date: NaiveDate, line: &str) -> Option<PathBuf> {
        let path = self.layout.candidates(kind, date).into_iter().next()?;
        tracing::debug!(log = kind.name(), path = %path.display(), "log line injected");
        self.source.append_line(path.clone(), line);
        Some(path)
    }
}

#[async_trait]
impl LineSource for MemoryLineSource {
    async fn read_last_line(&self, path: &Path) -> io::Result<Option<String>> {
        let files = self.files.read().unwrap_or_else(PoisonError::into_inner);
        let lines = files
            .get(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))?;
        Ok(lines.iter().rev().find(|l| !l.trim().is_empty()).cloned())
    }
}
