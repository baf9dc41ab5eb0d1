use std::time::{SystemTime, UNIX_EPOCH};

use tokio_util::sync::CancellationToken;

/// Cross-cutting pipeline state: the per-run import identifier and the
/// cancellation token observed by every stage.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    import_id: String,
    cancel: CancellationToken,
}

impl PipelineContext {
    /// Builds a context for one pipeline run. An empty `import_id` is
    /// replaced by the current wall-clock timestamp in nanoseconds.
    pub fn new(import_id: &str) -> Self {
        let import_id = if import_id.is_empty() {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or_default()
                .to_string()
        } else {
            import_id.to_string()
        };
        Self {
            import_id,
            cancel: CancellationToken::new(),
        }
    }

    pub fn import_id(&self) -> &str {
        &self.import_id
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Requests a prompt stop of every stage. Cancellation is not an error;
    /// stages return cleanly without flushing in-flight buffers.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
