//! Configuration records for the picdexer pipeline.
//!
//! The configuration file is a single JSON document. Every section is
//! optional; components fall back to their documented defaults when a value
//! is missing or non-positive.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

const DEFAULT_METADATA_THREAD_COUNT: usize = 4;
const DEFAULT_BULK_SIZE: usize = 30;
const DEFAULT_BINARY_THREAD_COUNT: usize = 4;
const DEFAULT_FILE_CHANNEL_SIZE: usize = 20;

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Conf {
    /// Global logging threshold (`debug`, `info`, `warn`, `error`, ...).
    pub logging_level: String,
    pub elasticsearch: ElasticsearchConf,
    pub binary: BinaryConf,
    pub filewatcher: FilewatcherConf,
}

/// Search backend settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElasticsearchConf {
    pub url: String,
    pub thread_count: i64,
    pub bulk_size: i64,
    /// Keyword -> baseline date (`YYYY:MM:DD`). Each entry produces a
    /// date-sync satellite document for matching pictures.
    pub sync_on_date: HashMap<String, String>,
}

/// Blob store and resize settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BinaryConf {
    /// Blob store base URL. Empty means the binary branch runs lazily.
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub thread_count: i64,
    /// Scratch directory for resized files. Empty means a per-run temporary
    /// directory.
    pub working_dir: String,
    /// Lowercased suffixes whose embedded preview is resized instead of the
    /// raw file.
    pub use_preview_for_extensions: Vec<String>,
}

/// Dropzone settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilewatcherConf {
    pub root: String,
    /// Polling interval, as a duration string (`10s`, `2m`, ...).
    pub period: String,
    pub file_channel_size: i64,
}

impl Conf {
    /// Loads and validates a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("error while opening configuration file {}", path.display()))?;
        let conf: Conf = serde_json::from_str(&raw).with_context(|| {
            format!("error while unmarshaling configuration file {}", path.display())
        })?;
        conf.validate()?;
        Ok(conf)
    }

    /// Checks cross-field constraints that serde cannot express.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.binary.validate()?;
        if !self.filewatcher.root.is_empty() {
            self.filewatcher.period()?;
        }
        Ok(())
    }
}

impl ElasticsearchConf {
    pub fn thread_count(&self) -> usize {
        if self.thread_count <= 0 {
            DEFAULT_METADATA_THREAD_COUNT
        } else {
            self.thread_count as usize
        }
    }

    pub fn bulk_size(&self) -> usize {
        if self.bulk_size <= 0 {
            DEFAULT_BULK_SIZE
        } else {
            self.bulk_size as usize
        }
    }
}

impl BinaryConf {
    pub fn thread_count(&self) -> usize {
        if self.thread_count <= 0 {
            DEFAULT_BINARY_THREAD_COUNT
        } else {
            self.thread_count as usize
        }
    }

    /// Resize dimensions, when resizing is enabled.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        if self.width > 0 && self.height > 0 {
            Some((self.width, self.height))
        } else {
            None
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if (self.width == 0) != (self.height == 0) {
            bail!(
                "neither width ({}) nor height ({}) can equal 0 when the other is set",
                self.width,
                self.height
            );
        }
        Ok(())
    }
}

impl FilewatcherConf {
    pub fn period(&self) -> anyhow::Result<Duration> {
        humantime::parse_duration(&self.period)
            .with_context(|| format!("error while parsing watching period ({})", self.period))
    }

    pub fn file_channel_size(&self) -> usize {
        if self.file_channel_size < 1 {
            DEFAULT_FILE_CHANNEL_SIZE
        } else {
            self.file_channel_size as usize
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_conf(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().expect("temp file");
        f.write_all(content.as_bytes()).expect("write conf");
        f
    }

    #[test]
    fn from_file_loads_every_section() {
        let f = write_conf(
            r#"{
                "loggingLevel": "debug",
                "elasticsearch": {
                    "url": "http://es:9200",
                    "threadCount": 2,
                    "bulkSize": 5,
                    "syncOnDate": {"holidays": "2020:01:01"}
                },
                "binary": {
                    "url": "http://store:8080",
                    "width": 640,
                    "height": 480,
                    "threadCount": 3,
                    "usePreviewForExtensions": [".nef"]
                },
                "filewatcher": {"root": "/tmp/drop", "period": "10s"}
            }"#,
        );

        let conf = Conf::from_file(f.path()).expect("load conf");
        assert_eq!(conf.logging_level, "debug");
        assert_eq!(conf.elasticsearch.url, "http://es:9200");
        assert_eq!(conf.elasticsearch.thread_count(), 2);
        assert_eq!(conf.elasticsearch.bulk_size(), 5);
        assert_eq!(
            conf.elasticsearch.sync_on_date.get("holidays"),
            Some(&"2020:01:01".to_string())
        );
        assert_eq!(conf.binary.dimensions(), Some((640, 480)));
        assert_eq!(conf.binary.thread_count(), 3);
        assert_eq!(conf.filewatcher.period().expect("period"), Duration::from_secs(10));
    }

    #[test]
    fn from_file_rejects_missing_file() {
        assert!(Conf::from_file("/nonexisting/conf.json").is_err());
    }

    #[test]
    fn from_file_rejects_invalid_json() {
        let f = write_conf("{ not json");
        assert!(Conf::from_file(f.path()).is_err());
    }

    #[test]
    fn defaults_apply_when_values_are_non_positive() {
        let conf: Conf =
            serde_json::from_str(r#"{"elasticsearch": {"threadCount": -1, "bulkSize": 0}}"#)
                .expect("parse");
        assert_eq!(conf.elasticsearch.thread_count(), 4);
        assert_eq!(conf.elasticsearch.bulk_size(), 30);
        assert_eq!(conf.binary.thread_count(), 4);
        assert_eq!(conf.filewatcher.file_channel_size(), 20);
    }

    #[test]
    fn validate_rejects_half_configured_resize() {
        let conf: Conf =
            serde_json::from_str(r#"{"binary": {"width": 0, "height": 1}}"#).expect("parse");
        assert!(conf.validate().is_err());
    }

    #[test]
    fn validate_accepts_disabled_resize() {
        let conf: Conf =
            serde_json::from_str(r#"{"binary": {"width": 0, "height": 0}}"#).expect("parse");
        assert!(conf.validate().is_ok());
        assert_eq!(conf.binary.dimensions(), None);
    }

    #[test]
    fn validate_rejects_unparsable_period() {
        let conf: Conf =
            serde_json::from_str(r#"{"filewatcher": {"root": "/tmp/drop", "period": "bla"}}"#)
                .expect("parse");
        assert!(conf.validate().is_err());
    }
}
