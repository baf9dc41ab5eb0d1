//! Metadata branch: the inspector handle, the tolerant field accessors and
//! the extraction worker pool.

mod exiftool;
mod fields;

pub use exiftool::Exiftool;
pub use fields::FieldMap;

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info};

use crate::browse::Task;
use crate::context::PipelineContext;
use crate::error::{PicdexerError, Result};

const APERTURE_KEY: &str = "Aperture";
const SHUTTER_KEY: &str = "ShutterSpeed";
const KEYWORDS_KEY: &str = "Keywords";
const CAMERA_KEY: &str = "Model";
const LENS_KEY: &str = "LensModel";
const MIME_TYPE_KEY: &str = "MIMEType";
const HEIGHT_KEY: &str = "ImageHeight";
const WIDTH_KEY: &str = "ImageWidth";
const CAPTURE_DATE_KEY: &str = "CreateDate";
const GPS_KEY: &str = "GPSPosition";
const ISO_KEY: &str = "ISO";

/// Decoded picture document, ready for indexing.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PictureMetadata {
    #[serde(skip)]
    pub file_id: String,
    #[serde(rename = "FileName")]
    pub file_name: String,
    #[serde(rename = "Folder")]
    pub folder: String,
    #[serde(rename = "ImportID")]
    pub import_id: String,
    #[serde(rename = "FileSize")]
    pub file_size: u64,
    #[serde(rename = "ISO", skip_serializing_if = "Option::is_none")]
    pub iso: Option<u64>,
    #[serde(rename = "Aperture", skip_serializing_if = "Option::is_none")]
    pub aperture: Option<f64>,
    #[serde(rename = "ShutterSpeed", skip_serializing_if = "Option::is_none")]
    pub shutter_speed: Option<String>,
    #[serde(rename = "Keywords", skip_serializing_if = "skip_keywords")]
    pub keywords: Option<Vec<String>>,
    #[serde(rename = "CameraModel", skip_serializing_if = "Option::is_none")]
    pub camera_model: Option<String>,
    #[serde(rename = "LensModel", skip_serializing_if = "Option::is_none")]
    pub lens_model: Option<String>,
    #[serde(rename = "MimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(rename = "Height", skip_serializing_if = "Option::is_none")]
    pub height: Option<u64>,
    #[serde(rename = "Width", skip_serializing_if = "Option::is_none")]
    pub width: Option<u64>,
    #[serde(rename = "Date", skip_serializing_if = "Option::is_none")]
    pub date: Option<u64>,
    #[serde(rename = "GPS", skip_serializing_if = "Option::is_none")]
    pub gps: Option<String>,
    #[serde(skip)]
    pub source_file: PathBuf,
}

fn skip_keywords(keywords: &Option<Vec<String>>) -> bool {
    keywords.as_ref().is_none_or(|k| k.is_empty())
}

/// Worker pool turning [`Task`]s into [`PictureMetadata`] through the shared
/// inspector handle.
#[derive(Debug)]
pub struct MetadataExtractor {
    thread_count: usize,
    exiftool: Arc<Exiftool>,
}

impl MetadataExtractor {
    pub async fn new(thread_count: usize) -> Result<Self> {
        if thread_count == 0 {
            return Err(PicdexerError::Config(format!(
                "threadCount should be >0 ({thread_count})"
            )));
        }
        Ok(Self {
            thread_count,
            exiftool: Arc::new(Exiftool::new().await?),
        })
    }

    /// Runs the pool until the input closes or the run is cancelled. The
    /// output closes exactly once, after the last worker finishes. Per-file
    /// extraction failures are logged and dropped.
    pub async fn extract_metadata(
        &self,
        ctx: &PipelineContext,
        input: mpsc::Receiver<Task>,
        out: mpsc::Sender<PictureMetadata>,
    ) -> Result<()> {
        let input = Arc::new(Mutex::new(input));
        let mut workers = Vec::with_capacity(self.thread_count);
        for worker_id in 0..self.thread_count {
            let ctx = ctx.clone();
            let input = Arc::clone(&input);
            let out = out.clone();
            let exiftool = Arc::clone(&self.exiftool);
            workers.push(tokio::spawn(async move {
                extraction_worker(worker_id, ctx, input, out, exiftool).await;
            }));
        }
        drop(out);

        for worker in workers {
            worker.await.map_err(|e| {
                PicdexerError::Internal(format!("extraction worker failed: {e}"))
            })?;
        }
        Ok(())
    }

    /// Releases the inspector process.
    pub async fn close(&self) -> Result<()> {
        self.exiftool.close().await
    }
}

async fn extraction_worker(
    worker_id: usize,
    ctx: PipelineContext,
    input: Arc<Mutex<mpsc::Receiver<Task>>>,
    out: mpsc::Sender<PictureMetadata>,
    exiftool: Arc<Exiftool>,
) {
    debug!("extraction worker {worker_id} started");
    loop {
        let task = {
            let mut rx = input.lock().await;
            tokio::select! {
                _ = ctx.cancel_token().cancelled() => break,
                task = rx.recv() => task,
            }
        };
        let Some(task) = task else { break };

        info!(file = %task.path.display(), import_id = %ctx.import_id(), "Extracting metadata...");
        match extract_from_file(&ctx, &exiftool, &task).await {
            Ok(pic) => {
                tokio::select! {
                    _ = ctx.cancel_token().cancelled() => break,
                    sent = out.send(pic) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                error!(file = %task.path.display(), "conversion error: {e}");
            }
        }
    }
    debug!("extraction worker {worker_id} completed");
}

async fn extract_from_file(
    ctx: &PipelineContext,
    exiftool: &Exiftool,
    task: &Task,
) -> Result<PictureMetadata> {
    let fields = exiftool.extract(&task.path).await?;
    Ok(project(ctx.import_id(), task, &fields))
}

/// Projects the inspector's field map into the typed document.
fn project(import_id: &str, task: &Task, fields: &FieldMap) -> PictureMetadata {
    let folder = task
        .path
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    PictureMetadata {
        file_id: task.file_id.clone(),
        file_name: task.file_name.clone(),
        folder,
        import_id: import_id.to_string(),
        file_size: task.file_size,
        iso: fields.get_u64(ISO_KEY),
        aperture: fields.get_f64(APERTURE_KEY),
        shutter_speed: fields.get_string(SHUTTER_KEY),
        keywords: fields.get_strings(KEYWORDS_KEY),
        camera_model: fields.get_string(CAMERA_KEY),
        lens_model: fields.get_string(LENS_KEY),
        mime_type: fields.get_string(MIME_TYPE_KEY),
        height: fields.get_u64(HEIGHT_KEY),
        width: fields.get_u64(WIDTH_KEY),
        date: Some(fields.get_date(CAPTURE_DATE_KEY)),
        gps: fields.get_gps(GPS_KEY),
        source_file: task.path.clone(),
    }
}
