use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{PicdexerError, Result};

/// One observed file in a dropzone snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedItem {
    pub path: PathBuf,
    pub file_size: u64,
    pub modified: SystemTime,
}

/// Two-snapshot quiescence detector.
///
/// A single snapshot cannot tell whether a file is still being written;
/// a file is only considered stable once two consecutive snapshots agree on
/// its modification time.
#[derive(Debug)]
pub struct FileWatcher {
    root: PathBuf,
    previous: HashMap<PathBuf, WatchedItem>,
    primed: bool,
}

impl FileWatcher {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            previous: HashMap::new(),
            primed: false,
        }
    }

    fn scan(&self) -> Result<HashMap<PathBuf, WatchedItem>> {
        let mut items = HashMap::new();
        for entry in WalkDir::new(&self.root) {
            let entry = entry.map_err(|e| {
                PicdexerError::Browse(format!(
                    "error while scanning folder {}: {e}",
                    self.root.display()
                ))
            })?;
            if entry.file_type().is_dir() {
                continue;
            }
            let meta = fs::metadata(entry.path())?;
            items.insert(
                entry.path().to_path_buf(),
                WatchedItem {
                    path: entry.path().to_path_buf(),
                    file_size: meta.len(),
                    modified: meta.modified()?,
                },
            );
        }
        Ok(items)
    }

    /// Takes a snapshot and returns the stable set: files present in both
    /// this snapshot and the previous one with an identical modification
    /// time. The first poll only primes the watcher. Emitted files are
    /// removed from the carried snapshot so they are reported once.
    pub fn poll(&mut self) -> Result<Vec<WatchedItem>> {
        let mut current = self.scan()?;

        if !self.primed {
            self.primed = true;
            self.previous = current;
            return Ok(Vec::new());
        }

        let mut stable = Vec::new();
        for (path, old) in &self.previous {
            if let Some(item) = current.get(path) {
                debug!(
                    "fileWatcher: {}: {:?} -> {:?}",
                    path.display(),
                    old.modified,
                    item.modified
                );
                if old.modified == item.modified {
                    debug!("fileWatcher: detected file: {}", path.display());
                    stable.push(path.clone());
                }
            }
        }

        let stable: Vec<WatchedItem> = stable
            .into_iter()
            .filter_map(|path| current.remove(&path))
            .collect();
        self.previous = current;
        Ok(stable)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
