//! picdexer core: a bounded, back-pressured dataflow that discovers pictures
//! on disk, extracts their metadata through an external inspector, batches
//! documents into bulk index submissions and ships resized renditions to a
//! blob store, all concurrently from a single traversal.
//!
//! The topology:
//!
//! ```text
//! Browser ─► Dispatcher ─┬─► MetadataExtractor ─► DocBuilder ─► EsPusher
//!                        └─► BinaryManager
//! ```
//!
//! Every queue is bounded; a slow stage blocks its upstream instead of
//! buffering without limit. A single [`PipelineContext`] carries the import
//! identifier and the cancellation token through every stage.

pub mod binary;
pub mod browse;
pub mod classify;
pub mod context;
pub mod dispatch;
pub mod dropzone;
pub mod error;
pub mod index;
pub mod metadata;
pub mod pipeline;
pub mod setup;

pub use browse::{Browser, Task};
pub use context::PipelineContext;
pub use dropzone::Dropzone;
pub use error::{PicdexerError, Result};
pub use metadata::{MetadataExtractor, PictureMetadata};
pub use pipeline::Pipeline;
