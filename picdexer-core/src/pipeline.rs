//! Pipeline orchestration: wires the five stages, runs the browser in the
//! caller and surfaces the first terminal error once everything has drained.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use picdexer_config::{BinaryConf, Conf, ElasticsearchConf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::error;

use crate::binary::{
    BinaryManager, BinaryPusher, ConvertResizer, HttpBinaryPusher, NopPusher, NopResizer, Resizer,
};
use crate::browse::Browser;
use crate::context::PipelineContext;
use crate::dispatch::dispatch_tasks;
use crate::error::{PicdexerError, Result};
use crate::index::{BulkSink, DocBuilder, EsPusher, HttpBulkSink, WriterBulkSink};
use crate::metadata::MetadataExtractor;

const SYNC_DATE_FORMAT: &str = "%Y:%m:%d";

/// One configured pipeline, reusable across runs.
#[derive(Debug, Clone)]
pub struct Pipeline {
    conf: Conf,
}

impl Pipeline {
    pub fn new(conf: Conf) -> Self {
        Self { conf }
    }

    /// Full run: metadata indexed into the search backend, binaries resized
    /// and uploaded according to the configuration.
    pub async fn run_full(&self, ctx: &PipelineContext, inputs: &[PathBuf]) -> Result<()> {
        self.run_full_sized(ctx, inputs, None).await
    }

    pub(crate) async fn run_full_sized(
        &self,
        ctx: &PipelineContext,
        inputs: &[PathBuf],
        browse_capacity: Option<usize>,
    ) -> Result<()> {
        let sink: Arc<dyn BulkSink> = Arc::new(HttpBulkSink::new(&self.conf.elasticsearch.url)?);
        let (manager, working_dir) = build_binary_manager(&self.conf.binary)?;
        self.run_topology(ctx, inputs, sink, manager, working_dir, browse_capacity)
            .await
    }

    /// Metadata branch only; the binary queue is drained lazily. With
    /// `print`, bulk frames go to stdout instead of the search backend.
    pub async fn run_metadata(
        &self,
        ctx: &PipelineContext,
        inputs: &[PathBuf],
        print: bool,
    ) -> Result<()> {
        let sink: Arc<dyn BulkSink> = if print {
            Arc::new(WriterBulkSink::stdout())
        } else {
            Arc::new(HttpBulkSink::new(&self.conf.elasticsearch.url)?)
        };
        self.run_topology(ctx, inputs, sink, BinaryManager::lazy(), None, None)
            .await
    }

    /// Binary branch only: browse and store, no metadata extraction. Without
    /// `push`, renditions are kept in `out_dir` and nothing is uploaded.
    pub async fn run_binary(
        &self,
        ctx: &PipelineContext,
        inputs: &[PathBuf],
        push: bool,
        out_dir: Option<PathBuf>,
    ) -> Result<()> {
        let c = &self.conf.binary;
        c.validate().map_err(|e| PicdexerError::Config(e.to_string()))?;
        if push && c.url.is_empty() {
            return Err(PicdexerError::Config(
                "no binary url configured".to_string(),
            ));
        }

        let resizer: Arc<dyn Resizer> = match c.dimensions() {
            Some((w, h)) => {
                let resizer = ConvertResizer::new(w, h, &c.use_preview_for_extensions)?;
                if push {
                    Arc::new(resizer)
                } else {
                    Arc::new(resizer.keep_output())
                }
            }
            None => Arc::new(NopResizer),
        };
        let pusher: Arc<dyn BinaryPusher> = if push {
            Arc::new(HttpBinaryPusher::new(&c.url)?)
        } else {
            Arc::new(NopPusher)
        };
        let manager = BinaryManager::new(c.thread_count(), resizer, pusher)?;
        let working_dir = out_dir.or_else(|| configured_working_dir(c));

        let (bin_tx, bin_rx) = mpsc::channel(c.thread_count());
        let store_task = {
            let ctx = ctx.clone();
            tokio::spawn(async move { manager.store(&ctx, bin_rx, working_dir).await })
        };

        let browse_res = Browser::new().browse(ctx, inputs, bin_tx).await;

        let mut first_err = await_stage("storing binaries", store_task).await;
        if let Err(e) = browse_res {
            error!("Error while browsing input folders: {e}");
            first_err.get_or_insert(e);
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// The five-stage topology of a full run. Stage errors are logged as
    /// they surface; the first one is returned after every stage has
    /// finished.
    async fn run_topology(
        &self,
        ctx: &PipelineContext,
        inputs: &[PathBuf],
        sink: Arc<dyn BulkSink>,
        binary_manager: BinaryManager,
        working_dir: Option<PathBuf>,
        browse_capacity: Option<usize>,
    ) -> Result<()> {
        let es_conf = &self.conf.elasticsearch;
        let meta_threads = es_conf.thread_count();
        let bin_threads = self.conf.binary.thread_count();

        let extractor = Arc::new(MetadataExtractor::new(meta_threads).await?);
        let es_pusher = EsPusher::new(es_conf.bulk_size())?;
        let doc_builder = build_doc_builder(es_conf)?;

        let (browse_tx, browse_rx) =
            mpsc::channel(browse_capacity.unwrap_or(meta_threads.max(bin_threads)));
        let (bin_tx, bin_rx) = mpsc::channel(bin_threads);
        let (meta_tx, meta_rx) = mpsc::channel(meta_threads);
        let (pic_tx, pic_rx) = mpsc::channel(meta_threads);
        let (doc_tx, doc_rx) = mpsc::channel(meta_threads);

        let push_task = {
            let ctx = ctx.clone();
            tokio::spawn(async move { es_pusher.push(&ctx, doc_rx, sink.as_ref()).await })
        };
        let build_task = {
            let ctx = ctx.clone();
            tokio::spawn(async move { doc_builder.build_docs(&ctx, pic_rx, doc_tx).await })
        };
        let extract_task = {
            let ctx = ctx.clone();
            let extractor = Arc::clone(&extractor);
            tokio::spawn(async move { extractor.extract_metadata(&ctx, meta_rx, pic_tx).await })
        };
        let store_task = {
            let ctx = ctx.clone();
            tokio::spawn(async move { binary_manager.store(&ctx, bin_rx, working_dir).await })
        };
        let dispatch_task: JoinHandle<Result<()>> = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                dispatch_tasks(&ctx, browse_rx, meta_tx, bin_tx).await;
                Ok(())
            })
        };

        let browse_res = Browser::new().browse(ctx, inputs, browse_tx).await;

        let mut first_err = None;
        for (what, task) in [
            ("pushing to Elasticsearch", push_task),
            ("converting metadata to documents", build_task),
            ("extracting metadata", extract_task),
            ("storing binaries", store_task),
            ("dispatching tasks", dispatch_task),
        ] {
            if let Some(e) = await_stage(what, task).await {
                first_err.get_or_insert(e);
            }
        }
        if let Err(e) = browse_res {
            error!("Error while browsing input folders: {e}");
            first_err.get_or_insert(e);
        }

        if let Err(e) = extractor.close().await {
            error!("error while closing exiftool: {e}");
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

async fn await_stage(what: &str, task: JoinHandle<Result<()>>) -> Option<PicdexerError> {
    match task.await {
        Ok(Ok(())) => None,
        Ok(Err(e)) => {
            error!("Error while {what}: {e}");
            Some(e)
        }
        Err(e) => {
            let e = PicdexerError::Internal(format!("{what} task failed: {e}"));
            error!("{e}");
            Some(e)
        }
    }
}

/// Builds the document builder, parsing date-sync baselines (`YYYY:MM:DD`)
/// into UNIX milliseconds.
pub fn build_doc_builder(conf: &ElasticsearchConf) -> Result<DocBuilder> {
    let mut date_sync = HashMap::with_capacity(conf.sync_on_date.len());
    for (keyword, raw) in &conf.sync_on_date {
        let date = NaiveDate::parse_from_str(raw, SYNC_DATE_FORMAT).map_err(|e| {
            PicdexerError::Config(format!("syncOnDate: error while parsing date {raw}: {e}"))
        })?;
        let ms = date
            .and_hms_opt(0, 0, 0)
            .map(|d| d.and_utc().timestamp_millis() as u64)
            .ok_or_else(|| {
                PicdexerError::Config(format!("syncOnDate: unrepresentable date {raw}"))
            })?;
        date_sync.insert(keyword.clone(), ms);
    }
    Ok(DocBuilder::new(date_sync))
}

/// Builds the binary manager for a full run: lazy without an upload URL,
/// push-only without dimensions, resize+push otherwise.
pub fn build_binary_manager(c: &BinaryConf) -> Result<(BinaryManager, Option<PathBuf>)> {
    c.validate().map_err(|e| PicdexerError::Config(e.to_string()))?;
    if c.url.is_empty() {
        return Ok((BinaryManager::lazy(), None));
    }

    let resizer: Arc<dyn Resizer> = match c.dimensions() {
        Some((w, h)) => Arc::new(ConvertResizer::new(w, h, &c.use_preview_for_extensions)?),
        None => Arc::new(NopResizer),
    };
    let pusher = Arc::new(HttpBinaryPusher::new(&c.url)?);
    let manager = BinaryManager::new(c.thread_count(), resizer, pusher)?;
    Ok((manager, configured_working_dir(c)))
}

fn configured_working_dir(c: &BinaryConf) -> Option<PathBuf> {
    if c.working_dir.is_empty() {
        None
    } else {
        Some(PathBuf::from(&c.working_dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46];

    #[test]
    fn doc_builder_parses_sync_dates() {
        let conf: ElasticsearchConf = serde_json::from_str(
            r#"{"syncOnDate": {"holidays": "2020:01:01"}}"#,
        )
        .expect("conf");
        build_doc_builder(&conf).expect("doc builder");
    }

    #[test]
    fn doc_builder_rejects_unparsable_sync_dates() {
        let conf: ElasticsearchConf =
            serde_json::from_str(r#"{"syncOnDate": {"holidays": "01/01/2020"}}"#).expect("conf");
        assert!(build_doc_builder(&conf).is_err());
    }

    #[test]
    fn binary_manager_is_lazy_without_url() {
        let conf = BinaryConf::default();
        let (manager, working_dir) = build_binary_manager(&conf).expect("manager");
        assert!(format!("{manager:?}").contains("lazy: true"));
        assert!(working_dir.is_none());
    }

    #[test]
    fn half_configured_resize_is_a_configuration_error() {
        let conf: BinaryConf =
            serde_json::from_str(r#"{"url": "http://store:8080", "width": 0, "height": 1}"#)
                .expect("conf");
        assert!(build_binary_manager(&conf).is_err());
    }

    #[tokio::test]
    async fn binary_only_run_drains_a_directory() {
        let tmp = tempfile::tempdir().expect("tempdir");
        tokio::fs::write(tmp.path().join("a.jpg"), JPEG_MAGIC)
            .await
            .expect("write picture");

        let pipeline = Pipeline::new(Conf::default());
        let ctx = PipelineContext::new("test");
        pipeline
            .run_binary(&ctx, &[tmp.path().to_path_buf()], false, None)
            .await
            .expect("binary run");
    }
}
