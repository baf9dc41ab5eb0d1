use std::fmt;
use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::debug;

use super::fields::FieldMap;
use crate::error::{PicdexerError, Result};

const READY_MARKER: &str = "{ready}";

/// Long-lived handle on the external metadata inspector.
///
/// A single `exiftool -stay_open` child serves every extraction worker;
/// invocations are serialized behind the internal mutex. The child is killed
/// on drop, so abnormal exit paths release the process too.
pub struct Exiftool {
    inner: Mutex<Inner>,
}

struct Inner {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl fmt::Debug for Exiftool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exiftool")
            .field("busy", &self.inner.try_lock().is_err())
            .finish()
    }
}

impl Exiftool {
    pub async fn new() -> Result<Self> {
        let mut child = Command::new("exiftool")
            .args(["-stay_open", "True", "-@", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                PicdexerError::Inspector(format!("error while initializing exiftool: {e}"))
            })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            PicdexerError::Inspector("exiftool stdin unavailable".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            PicdexerError::Inspector("exiftool stdout unavailable".to_string())
        })?;

        Ok(Self {
            inner: Mutex::new(Inner {
                child,
                stdin,
                stdout: BufReader::new(stdout),
            }),
        })
    }

    /// Runs the inspector on one file and returns its field map.
    pub async fn extract(&self, path: &Path) -> Result<FieldMap> {
        let mut inner = self.inner.lock().await;

        let request = format!("-j\n{}\n-execute\n", path.display());
        inner.stdin.write_all(request.as_bytes()).await?;
        inner.stdin.flush().await?;

        let mut payload = String::new();
        loop {
            let mut line = String::new();
            let n = inner.stdout.read_line(&mut line).await?;
            if n == 0 {
                return Err(PicdexerError::Inspector(
                    "exiftool terminated unexpectedly".to_string(),
                ));
            }
            if line.trim_end() == READY_MARKER {
                break;
            }
            payload.push_str(&line);
        }

        let mut records: Vec<serde_json::Map<String, serde_json::Value>> =
            serde_json::from_str(&payload).map_err(|e| {
                PicdexerError::Inspector(format!(
                    "unreadable inspector output for {}: {e}",
                    path.display()
                ))
            })?;
        if records.len() != 1 {
            return Err(PicdexerError::Inspector(format!(
                "wrong metadata count ({})",
                records.len()
            )));
        }
        let fields = records.pop().unwrap_or_default();

        Ok(FieldMap::new(path.display().to_string(), fields))
    }

    /// Asks the child to exit and waits for it. Safe to call once at the end
    /// of a run; later calls on a closed handle report an inspector error.
    pub async fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.stdin.write_all(b"-stay_open\nFalse\n").await?;
        inner.stdin.flush().await?;
        let status = inner.child.wait().await?;
        debug!("exiftool exited with {status}");
        Ok(())
    }
}
