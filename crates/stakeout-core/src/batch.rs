//! Multi-file import with progress reporting and cooperative cancellation.
//!
//! Files are read strictly in order and concatenated. The first failing
//! file aborts the batch, and its error names the file.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{info, warn};

use crate::error::{ParseWarning, PointError};
use crate::format::Format;
use crate::model::PointTable;
use crate::settings::ReadSettings;

/// Receives coarse progress: a percentage and a short message.
pub trait ProgressSink {
    fn report(&self, percent: u8, message: &str);
}

/// Sink that drops every report.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _percent: u8, _message: &str) {}
}

impl<F: Fn(u8, &str)> ProgressSink for F {
    fn report(&self, percent: u8, message: &str) {
        self(percent, message)
    }
}

/// Shared flag checked between files.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What one file contributed to a batch.
#[derive(Debug, Clone)]
pub struct FileReport {
    pub path: PathBuf,
    pub format: Format,
    pub rows: usize,
    pub warnings: Vec<ParseWarning>,
    pub coerced_fields: usize,
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub table: PointTable,
    pub files: Vec<FileReport>,
}

impl BatchOutcome {
    pub fn warning_count(&self) -> usize {
        self.files.iter().map(|f| f.warnings.len()).sum()
    }

    pub fn coerced_fields(&self) -> usize {
        self.files.iter().map(|f| f.coerced_fields).sum()
    }
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        100
    } else {
        (done * 100 / total) as u8
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Read `paths` in order and stack them into one table over the union of
/// their columns.
pub fn import_batch(
    paths: &[PathBuf],
    settings: &ReadSettings,
    progress: &dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<BatchOutcome, PointError> {
    let total = paths.len();
    let mut tables = Vec::with_capacity(total);
    let mut files = Vec::with_capacity(total);

    for (i, path) in paths.iter().enumerate() {
        if cancel.is_cancelled() {
            warn!(done = i, total, "import cancelled");
            return Err(PointError::Cancelled);
        }
        progress.report(percent(i, total), &format!("Reading {} ({}/{total})", file_name(path), i + 1));

        let outcome = crate::read(path, settings).map_err(|e| e.in_file(path))?;
        files.push(FileReport {
            path: path.clone(),
            format: outcome.format,
            rows: outcome.table.len(),
            warnings: outcome.warnings,
            coerced_fields: outcome.coerced_fields,
        });
        tables.push(outcome.table);
    }

    let table = PointTable::concat(tables);
    progress.report(100, &format!("Imported {} points from {total} file(s)", table.len()));
    info!(files = total, rows = table.len(), "batch import finished");
    Ok(BatchOutcome { table, files })
}

/// Messages sent from a background import to its owner.
#[derive(Debug)]
pub enum JobEvent {
    Progress { percent: u8, message: String },
    Finished(Result<BatchOutcome, PointError>),
}

struct ChannelSink(Sender<JobEvent>);

impl ProgressSink for ChannelSink {
    fn report(&self, percent: u8, message: &str) {
        let _ = self.0.send(JobEvent::Progress {
            percent,
            message: message.to_string(),
        });
    }
}

/// A batch import running on a worker thread.
pub struct ImportJob {
    cancel: CancelToken,
    events: Receiver<JobEvent>,
    handle: JoinHandle<()>,
}

impl ImportJob {
    pub fn spawn(paths: Vec<PathBuf>, settings: ReadSettings) -> ImportJob {
        let cancel = CancelToken::new();
        let (sender, events) = mpsc::channel();
        let flag = cancel.clone();
        let handle = std::thread::spawn(move || {
            let sink = ChannelSink(sender.clone());
            let result = import_batch(&paths, &settings, &sink, &flag);
            let _ = sender.send(JobEvent::Finished(result));
        });
        ImportJob {
            cancel,
            events,
            handle,
        }
    }

    /// Ask the worker to stop before the next file.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn events(&self) -> &Receiver<JobEvent> {
        &self.events
    }

    /// Block until the job finishes, forwarding progress to `progress`.
    pub fn wait(self, progress: &dyn ProgressSink) -> Result<BatchOutcome, PointError> {
        let mut result = None;
        for event in self.events.iter() {
            match event {
                JobEvent::Progress { percent, message } => progress.report(percent, &message),
                JobEvent::Finished(r) => {
                    result = Some(r);
                    break;
                }
            }
        }
        if self.handle.join().is_err() {
            warn!("import worker panicked");
        }
        result.unwrap_or_else(|| {
            Err(PointError::Io(std::io::Error::other(
                "import worker stopped without a result",
            )))
        })
    }
}
