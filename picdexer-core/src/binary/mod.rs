//! Binary branch: resize through the external converter and upload to the
//! blob store, or simply drain the queue in lazy mode.

mod resize;
mod upload;

pub use resize::{ConvertResizer, NopResizer, Resizer};
pub use upload::{BinaryPusher, HttpBinaryPusher, NopPusher};

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info};

use crate::browse::Task;
use crate::context::PipelineContext;
use crate::error::{PicdexerError, Result};

/// Worker pool over the binary queue.
///
/// Modes: lazy (drain only), push-only (`NopResizer` + upload) and
/// resize+push. A temporary working directory is acquired when no explicit
/// one is configured and removed once the pool completes.
pub struct BinaryManager {
    thread_count: usize,
    mode: Mode,
}

enum Mode {
    Lazy,
    Active {
        resizer: Arc<dyn Resizer>,
        pusher: Arc<dyn BinaryPusher>,
    },
}

impl fmt::Debug for BinaryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryManager")
            .field("thread_count", &self.thread_count)
            .field("lazy", &matches!(self.mode, Mode::Lazy))
            .finish()
    }
}

impl BinaryManager {
    pub fn new(
        thread_count: usize,
        resizer: Arc<dyn Resizer>,
        pusher: Arc<dyn BinaryPusher>,
    ) -> Result<Self> {
        if thread_count == 0 {
            return Err(PicdexerError::Config(format!(
                "threadCount should be >0 ({thread_count})"
            )));
        }
        Ok(Self {
            thread_count,
            mode: Mode::Active { resizer, pusher },
        })
    }

    /// A manager that consumes its queue without resizing or uploading.
    pub fn lazy() -> Self {
        Self {
            thread_count: 1,
            mode: Mode::Lazy,
        }
    }

    /// Runs the pool until the input closes or the run is cancelled.
    /// Per-file failures are logged and the file dropped.
    pub async fn store(
        &self,
        ctx: &PipelineContext,
        mut input: mpsc::Receiver<Task>,
        working_dir: Option<PathBuf>,
    ) -> Result<()> {
        let (resizer, pusher) = match &self.mode {
            Mode::Lazy => {
                loop {
                    tokio::select! {
                        _ = ctx.cancel_token().cancelled() => return Ok(()),
                        task = input.recv() => {
                            if task.is_none() {
                                return Ok(());
                            }
                        }
                    }
                }
            }
            Mode::Active { resizer, pusher } => (Arc::clone(resizer), Arc::clone(pusher)),
        };

        // Keeps an owned temp dir alive for the whole pool, removed on drop.
        let mut scratch_guard = None;
        let work_dir = match working_dir {
            Some(dir) => dir,
            None => {
                let tmp = tempfile::Builder::new().prefix("picdexer").tempdir()?;
                let dir = tmp.path().to_path_buf();
                debug!("Resized pictures temporary folder: {}", dir.display());
                scratch_guard = Some(tmp);
                dir
            }
        };

        let input = Arc::new(Mutex::new(input));
        let mut workers = Vec::with_capacity(self.thread_count);
        for worker_id in 0..self.thread_count {
            let ctx = ctx.clone();
            let input = Arc::clone(&input);
            let resizer = Arc::clone(&resizer);
            let pusher = Arc::clone(&pusher);
            let work_dir = work_dir.clone();
            workers.push(tokio::spawn(async move {
                binary_worker(worker_id, ctx, input, resizer, pusher, work_dir).await;
            }));
        }

        for worker in workers {
            worker
                .await
                .map_err(|e| PicdexerError::Internal(format!("binary worker failed: {e}")))?;
        }
        drop(scratch_guard);
        Ok(())
    }
}

async fn binary_worker(
    worker_id: usize,
    ctx: PipelineContext,
    input: Arc<Mutex<mpsc::Receiver<Task>>>,
    resizer: Arc<dyn Resizer>,
    pusher: Arc<dyn BinaryPusher>,
    work_dir: PathBuf,
) {
    debug!("binary worker {worker_id} started");
    loop {
        let task = {
            let mut rx = input.lock().await;
            tokio::select! {
                _ = ctx.cancel_token().cancelled() => break,
                task = rx.recv() => task,
            }
        };
        let Some(task) = task else { break };

        info!(file = %task.path.display(), "Resizing...");
        let produced = match resizer.resize(&task.path, &work_dir, &task.file_id).await {
            Ok(produced) => produced,
            Err(e) => {
                error!(file = %task.path.display(), "Error while resizing: {e}");
                continue;
            }
        };

        info!(file = %task.path.display(), resized_file = %produced.display(), "Pushing...");
        if let Err(e) = pusher.push(&produced, &task.file_id).await {
            error!(
                file = %task.path.display(),
                resized_file = %produced.display(),
                "Error while pushing: {e}"
            );
        }

        if let Err(e) = resizer.cleanup(&produced).await {
            error!(resized_file = %produced.display(), "Error while cleaning up: {e}");
        }
    }
    debug!("binary worker {worker_id} completed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex as StdMutex;
    use std::time::SystemTime;

    fn task(name: &str) -> Task {
        Task {
            path: PathBuf::from(format!("/photos/{name}")),
            file_name: name.to_string(),
            file_size: 10,
            modified: SystemTime::UNIX_EPOCH,
            file_id: format!("id_{name}"),
        }
    }

    #[derive(Debug, Default)]
    struct RecordingPusher {
        keys: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl BinaryPusher for RecordingPusher {
        async fn push(&self, _bin: &Path, key: &str) -> Result<()> {
            self.keys.lock().expect("lock").push(key.to_string());
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct RecordingResizer {
        cleaned: StdMutex<Vec<PathBuf>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl Resizer for RecordingResizer {
        async fn resize(&self, from: &Path, work_dir: &Path, file_id: &str) -> Result<PathBuf> {
            if let Some(fail) = &self.fail_on {
                if from.to_string_lossy().contains(fail.as_str()) {
                    return Err(PicdexerError::Resize("converter chatter".to_string()));
                }
            }
            Ok(work_dir.join(file_id))
        }

        async fn cleanup(&self, produced: &Path) -> Result<()> {
            self.cleaned.lock().expect("lock").push(produced.to_path_buf());
            Ok(())
        }
    }

    async fn run_store(manager: &BinaryManager, tasks: Vec<Task>) -> Result<()> {
        let ctx = PipelineContext::new("test");
        let (tx, rx) = mpsc::channel(16);
        for t in tasks {
            tx.send(t).await.expect("send task");
        }
        drop(tx);
        manager.store(&ctx, rx, None).await
    }

    #[tokio::test]
    async fn lazy_mode_drains_the_queue() {
        let manager = BinaryManager::lazy();
        run_store(&manager, vec![task("a.jpg"), task("b.jpg")])
            .await
            .expect("store");
    }

    #[tokio::test]
    async fn active_mode_resizes_pushes_and_cleans_up() {
        let resizer = Arc::new(RecordingResizer::default());
        let pusher = Arc::new(RecordingPusher::default());
        let manager = BinaryManager::new(2, Arc::clone(&resizer) as _, Arc::clone(&pusher) as _)
            .expect("manager");

        run_store(&manager, vec![task("a.jpg"), task("b.jpg")])
            .await
            .expect("store");

        let mut keys = pusher.keys.lock().expect("lock").clone();
        keys.sort();
        assert_eq!(keys, vec!["id_a.jpg", "id_b.jpg"]);
        assert_eq!(resizer.cleaned.lock().expect("lock").len(), 2);
    }

    #[tokio::test]
    async fn resize_failures_drop_the_file_but_not_the_run() {
        let resizer = Arc::new(RecordingResizer {
            cleaned: StdMutex::new(Vec::new()),
            fail_on: Some("bad".to_string()),
        });
        let pusher = Arc::new(RecordingPusher::default());
        let manager = BinaryManager::new(1, Arc::clone(&resizer) as _, Arc::clone(&pusher) as _)
            .expect("manager");

        run_store(&manager, vec![task("bad.jpg"), task("good.jpg")])
            .await
            .expect("store");

        assert_eq!(
            pusher.keys.lock().expect("lock").as_slice(),
            ["id_good.jpg"]
        );
    }

    #[test]
    fn zero_thread_count_is_rejected() {
        let res = BinaryManager::new(
            0,
            Arc::new(NopResizer) as _,
            Arc::new(NopPusher) as _,
        );
        assert!(res.is_err());
    }
}
