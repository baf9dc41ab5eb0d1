use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::context::PipelineContext;
use crate::error::Result;
use crate::metadata::PictureMetadata;

pub const PICTURE_INDEX: &str = "picdexer";
pub const SYNC_ON_DATE_INDEX: &str = "sync-on-date";

/// 2000-01-01 in UNIX milliseconds, the common origin date-synced satellites
/// are re-based onto.
pub const BASE_SYNC_DATE_MS: u64 = 946_684_800_000;

/// One bulk unit: action header plus document body.
#[derive(Debug, Clone, Serialize)]
pub struct EsDoc {
    pub header: EsHeader,
    pub body: EsBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct EsHeader {
    pub index: EsHeaderIndex,
}

#[derive(Debug, Clone, Serialize)]
pub struct EsHeaderIndex {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_id")]
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EsBody {
    Picture(PictureMetadata),
    SyncOnDate(SyncOnDateBody),
}

/// Satellite document tying a picture's capture date to a configured
/// keyword.
#[derive(Debug, Clone, Serialize)]
pub struct SyncOnDateBody {
    #[serde(rename = "Date")]
    pub date: u64,
    #[serde(rename = "SyncedDate")]
    pub synced_date: u64,
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "PicId")]
    pub pic_id: String,
}

/// Wraps picture documents into bulk units, plus one date-sync satellite per
/// matched keyword.
#[derive(Debug, Default)]
pub struct DocBuilder {
    date_sync: HashMap<String, u64>,
}

impl DocBuilder {
    /// `date_sync` maps a keyword to its baseline in UNIX milliseconds.
    pub fn new(date_sync: HashMap<String, u64>) -> Self {
        Self { date_sync }
    }

    /// Consumes picture documents until the input closes or the run is
    /// cancelled. The output closes when this returns.
    pub async fn build_docs(
        &self,
        ctx: &PipelineContext,
        mut input: mpsc::Receiver<PictureMetadata>,
        out: mpsc::Sender<EsDoc>,
    ) -> Result<()> {
        loop {
            tokio::select! {
                _ = ctx.cancel_token().cancelled() => return Ok(()),
                pic = input.recv() => {
                    let Some(pic) = pic else { return Ok(()) };
                    for doc in self.docs_for(&pic) {
                        if out.send(doc).await.is_err() {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    fn docs_for(&self, pic: &PictureMetadata) -> Vec<EsDoc> {
        let mut docs = vec![EsDoc {
            header: EsHeader {
                index: EsHeaderIndex {
                    index: PICTURE_INDEX.to_string(),
                    id: pic.file_id.clone(),
                },
            },
            body: EsBody::Picture(pic.clone()),
        }];

        let Some(date) = pic.date else {
            return docs;
        };
        let keywords = pic.keywords.as_deref().unwrap_or_default();
        for (keyword, baseline) in &self.date_sync {
            if keywords.iter().any(|k| k == keyword) {
                debug!("{} matches {keyword} keyword", pic.file_id);
                docs.push(EsDoc {
                    header: EsHeader {
                        index: EsHeaderIndex {
                            index: SYNC_ON_DATE_INDEX.to_string(),
                            id: format!("{keyword}_{}", pic.file_id),
                        },
                    },
                    body: EsBody::SyncOnDate(SyncOnDateBody {
                        date,
                        synced_date: (date as i64 - *baseline as i64 + BASE_SYNC_DATE_MS as i64)
                            as u64,
                        key: keyword.clone(),
                        pic_id: pic.file_id.clone(),
                    }),
                });
            }
        }
        docs
    }
}
