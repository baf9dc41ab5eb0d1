//! Dropzone: a polling loop that feeds the pipeline with files that have
//! become quiescent, then deletes them.

mod watcher;

pub use watcher::{FileWatcher, WatchedItem};

use std::path::PathBuf;
use std::time::Duration;

use picdexer_config::Conf;
use tracing::{debug, error, info};

use crate::context::PipelineContext;
use crate::error::{PicdexerError, Result};
use crate::pipeline::Pipeline;

/// Periodic dropzone runner.
#[derive(Debug)]
pub struct Dropzone {
    pipeline: Pipeline,
    watcher: FileWatcher,
    period: Duration,
    file_channel_size: usize,
}

impl Dropzone {
    pub fn new(conf: Conf) -> Result<Self> {
        let fw = &conf.filewatcher;
        if fw.root.is_empty() {
            return Err(PicdexerError::Config(
                "no dropzone root configured".to_string(),
            ));
        }
        let period = fw
            .period()
            .map_err(|e| PicdexerError::Config(e.to_string()))?;
        let root = PathBuf::from(&fw.root);
        let file_channel_size = fw.file_channel_size();
        Ok(Self {
            pipeline: Pipeline::new(conf),
            watcher: FileWatcher::new(root),
            period,
            file_channel_size,
        })
    }

    /// Polls until cancelled. Each stable set triggers one full pipeline run
    /// followed by a best-effort deletion of the processed files. Watch and
    /// pipeline errors are logged; the loop keeps going.
    pub async fn run(&mut self, ctx: &PipelineContext) -> Result<()> {
        info!(root = %self.watcher.root().display(), "Dropzone started");
        loop {
            debug!("Watching iteration...");
            match self.watcher.poll() {
                Err(e) => error!("Error while watching: {e}"),
                Ok(items) if !items.is_empty() => {
                    let paths: Vec<PathBuf> = items.into_iter().map(|i| i.path).collect();
                    info!("Processing {} stable file(s)", paths.len());
                    if let Err(e) = self
                        .pipeline
                        .run_full_sized(ctx, &paths, Some(self.file_channel_size))
                        .await
                    {
                        error!("Error while running pipeline: {e}");
                    }
                    for path in &paths {
                        if let Err(e) = std::fs::remove_file(path) {
                            error!(file = %path.display(), "Error while deleting: {e}");
                        }
                    }
                }
                Ok(_) => {}
            }

            tokio::select! {
                _ = ctx.cancel_token().cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.period) => {}
            }
        }
    }
}
