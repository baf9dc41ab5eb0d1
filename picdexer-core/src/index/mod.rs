//! Indexing branch: bulk unit assembly and the batched `_bulk` sink.

mod doc;
mod pusher;

pub use doc::{
    DocBuilder, EsBody, EsDoc, EsHeader, EsHeaderIndex, SyncOnDateBody, BASE_SYNC_DATE_MS,
    PICTURE_INDEX, SYNC_ON_DATE_INDEX,
};
pub use pusher::{BulkSink, EsPusher, HttpBulkSink, WriterBulkSink};
