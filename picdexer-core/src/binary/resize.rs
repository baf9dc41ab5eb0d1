use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{PicdexerError, Result};

/// Produces the binary to upload for a task: either a resized rendition in
/// the working directory or the source file untouched.
#[async_trait]
pub trait Resizer: Send + Sync {
    /// Returns the path of the binary to upload under `file_id`.
    async fn resize(&self, from: &Path, work_dir: &Path, file_id: &str) -> Result<PathBuf>;

    /// Releases the scratch file produced by `resize`, if any.
    async fn cleanup(&self, produced: &Path) -> Result<()>;
}

/// Shells out to the external converter. Files matching a fallback suffix go
/// through an embedded-preview extraction first.
#[derive(Debug)]
pub struct ConvertResizer {
    dimensions: String,
    fallback_exts: Vec<String>,
    keep_output: bool,
}

impl ConvertResizer {
    pub fn new(width: u32, height: u32, fallback_exts: &[String]) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(PicdexerError::Config(format!(
                "neither width ({width}) nor height ({height}) can equal 0"
            )));
        }
        Ok(Self {
            dimensions: format!("{width}x{height}"),
            fallback_exts: fallback_exts.iter().map(|e| e.to_lowercase()).collect(),
            keep_output: false,
        })
    }

    /// Leaves renditions on disk instead of treating them as scratch files.
    /// Used by the simulate mode, where the output directory is the point.
    pub fn keep_output(mut self) -> Self {
        self.keep_output = true;
        self
    }

    fn has_to_fallback(&self, from: &Path) -> bool {
        let lowered = from.display().to_string().to_lowercase();
        self.fallback_exts.iter().any(|ext| lowered.ends_with(ext))
    }
}

#[async_trait]
impl Resizer for ConvertResizer {
    async fn resize(&self, from: &Path, work_dir: &Path, file_id: &str) -> Result<PathBuf> {
        let to = work_dir.join(file_id);
        let output = if self.has_to_fallback(from) {
            let script = format!(
                "exiftool {} -b -previewImage | convert - -size {} {}",
                from.display(),
                self.dimensions,
                to.display()
            );
            Command::new("bash").arg("-c").arg(&script).output().await?
        } else {
            Command::new("convert")
                .arg(from)
                .args(["-quiet", "-resize"])
                .arg(&self.dimensions)
                .arg(&to)
                .output()
                .await?
        };

        // The converter stays silent on success; any chatter means failure.
        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);
        if !combined.is_empty() {
            return Err(PicdexerError::Resize(format!(
                "error on output for {}: {}",
                from.display(),
                String::from_utf8_lossy(&combined)
            )));
        }
        Ok(to)
    }

    async fn cleanup(&self, produced: &Path) -> Result<()> {
        if self.keep_output {
            return Ok(());
        }
        tokio::fs::remove_file(produced).await?;
        Ok(())
    }
}

/// Pass-through used by the push-only mode: uploads the source file as-is.
#[derive(Debug, Default)]
pub struct NopResizer;

#[async_trait]
impl Resizer for NopResizer {
    async fn resize(&self, from: &Path, _work_dir: &Path, _file_id: &str) -> Result<PathBuf> {
        Ok(from.to_path_buf())
    }

    async fn cleanup(&self, _produced: &Path) -> Result<()> {
        Ok(())
    }
}
