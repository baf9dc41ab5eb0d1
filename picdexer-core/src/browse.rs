use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::sync::mpsc;
use tracing::warn;
use walkdir::WalkDir;

use crate::classify::classify;
use crate::context::PipelineContext;
use crate::error::{PicdexerError, Result};

/// One unit of pipeline work: a discovered picture and its identity.
#[derive(Debug, Clone)]
pub struct Task {
    pub path: PathBuf,
    pub file_name: String,
    pub file_size: u64,
    pub modified: SystemTime,
    pub file_id: String,
}

/// Walks input roots and feeds every discovered picture to the pipeline.
#[derive(Debug, Default)]
pub struct Browser;

impl Browser {
    pub fn new() -> Self {
        Self
    }

    /// Pre-order depth-first walk of each root. Non-directory entries are
    /// classified; pictures are emitted as [`Task`]s on `out`. Classification
    /// errors are logged and the entry skipped. A traversal error aborts the
    /// walk of that root; remaining roots are still attempted and the first
    /// failure is reported once all of them are done.
    pub async fn browse(
        &self,
        ctx: &PipelineContext,
        roots: &[PathBuf],
        out: mpsc::Sender<Task>,
    ) -> Result<()> {
        let mut first_failure: Option<PicdexerError> = None;

        'roots: for root in roots {
            for entry in WalkDir::new(root) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        let err = PicdexerError::Browse(format!(
                            "error while browsing {}: {}",
                            root.display(),
                            e
                        ));
                        warn!("{err}");
                        first_failure.get_or_insert(err);
                        continue 'roots;
                    }
                };
                if entry.file_type().is_dir() {
                    continue;
                }

                let Some(task) = self.task_for(entry.path()).await else {
                    continue;
                };

                tokio::select! {
                    _ = ctx.cancel_token().cancelled() => return Ok(()),
                    sent = out.send(task) => {
                        if sent.is_err() {
                            return Ok(());
                        }
                    }
                }
            }
        }

        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn task_for(&self, path: &Path) -> Option<Task> {
        let file_id = match classify(path).await {
            Ok(Some(id)) => id,
            Ok(None) => return None,
            Err(e) => {
                warn!(file = %path.display(), "error while classifying: {e}");
                return None;
            }
        };
        let meta = match tokio::fs::metadata(path).await {
            Ok(meta) => meta,
            Err(e) => {
                warn!(file = %path.display(), "error while reading file information: {e}");
                return None;
            }
        };
        Some(Task {
            path: path.to_path_buf(),
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            file_size: meta.len(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            file_id,
        })
    }
}
