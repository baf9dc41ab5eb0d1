use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tokio::sync::mpsc;
use tracing::{error, info};
use url::Url;

use super::doc::EsDoc;
use crate::context::PipelineContext;
use crate::error::{PicdexerError, Result};

const BULK_SUFFIX: &str = "_bulk";
const NDJSON_MIME_TYPE: &str = "application/x-ndjson";
const PUSH_TIMEOUT: Duration = Duration::from_secs(60);

/// Destination of an assembled bulk frame.
#[async_trait]
pub trait BulkSink: Send + Sync {
    async fn flush(&self, frame: &[u8]) -> Result<()>;
}

/// Posts frames to the search backend's `_bulk` endpoint. Single attempt;
/// any non-2xx answer is a terminal pipeline error.
#[derive(Debug)]
pub struct HttpBulkSink {
    bulk_url: Url,
    client: reqwest::Client,
}

impl HttpBulkSink {
    pub fn new(base_url: &str) -> Result<Self> {
        if base_url.is_empty() {
            return Err(PicdexerError::Config(
                "no elasticsearch url configured".to_string(),
            ));
        }
        let mut bulk_url = Url::parse(base_url)?;
        bulk_url
            .path_segments_mut()
            .map_err(|_| PicdexerError::Config(format!("invalid elasticsearch url ({base_url})")))?
            .pop_if_empty()
            .push(BULK_SUFFIX);
        let client = reqwest::Client::builder()
            .timeout(PUSH_TIMEOUT)
            .build()?;
        Ok(Self { bulk_url, client })
    }
}

#[async_trait]
impl BulkSink for HttpBulkSink {
    async fn flush(&self, frame: &[u8]) -> Result<()> {
        let resp = self
            .client
            .post(self.bulk_url.clone())
            .header(CONTENT_TYPE, NDJSON_MIME_TYPE)
            .body(frame.to_vec())
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!("Response body: {body}");
            return Err(PicdexerError::UnexpectedStatus(status.as_u16()));
        }
        Ok(())
    }
}

/// Diagnostic sink that writes the raw ndjson frame to a text writer.
pub struct WriterBulkSink {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for WriterBulkSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterBulkSink").finish()
    }
}

impl WriterBulkSink {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }
}

#[async_trait]
impl BulkSink for WriterBulkSink {
    async fn flush(&self, frame: &[u8]) -> Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| PicdexerError::Internal("print sink poisoned".to_string()))?;
        writer.write_all(frame)?;
        Ok(())
    }
}

/// Accumulates bulk units into frames of `bulk_size` documents and flushes
/// them to a [`BulkSink`].
#[derive(Debug)]
pub struct EsPusher {
    bulk_size: usize,
}

impl EsPusher {
    pub fn new(bulk_size: usize) -> Result<Self> {
        if bulk_size == 0 {
            return Err(PicdexerError::Config(format!(
                "bulkSize should be >0 ({bulk_size})"
            )));
        }
        Ok(Self { bulk_size })
    }

    /// Sink loop. A partial frame is flushed when the input closes normally;
    /// nothing is flushed on cancellation.
    pub async fn push(
        &self,
        ctx: &PipelineContext,
        mut input: mpsc::Receiver<EsDoc>,
        sink: &dyn BulkSink,
    ) -> Result<()> {
        let mut buffer: Vec<u8> = Vec::new();
        let mut doc_count = 0usize;

        loop {
            tokio::select! {
                _ = ctx.cancel_token().cancelled() => return Ok(()),
                doc = input.recv() => {
                    let Some(doc) = doc else {
                        if doc_count > 0 {
                            info!("Pushing bulk ({doc_count} docs)...");
                            sink.flush(&buffer).await?;
                        }
                        return Ok(());
                    };
                    serde_json::to_writer(&mut buffer, &doc.header)?;
                    buffer.push(b'\n');
                    serde_json::to_writer(&mut buffer, &doc.body)?;
                    buffer.push(b'\n');
                    doc_count += 1;
                    if doc_count == self.bulk_size {
                        info!("Pushing bulk ({doc_count} docs)...");
                        sink.flush(&buffer).await?;
                        buffer.clear();
                        doc_count = 0;
                    }
                }
            }
        }
    }
}
