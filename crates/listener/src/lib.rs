//! cla-sync change-feed infrastructure.
//!
//! Turns a DynamoDB-stream style JSON batch (`{"Records": [...]}`) into
//! [`reconcile::ChangeEvent`]s:
//!
//! - [`wire`]: serde types for the stream record and its kind-tagged
//!   attribute values (`S`, `N`, `BOOL`, `L`, `M`, `NULL`, `SS`, `NS`).
//! - [`batch`]: record-by-record conversion. A malformed record is reported
//!   in [`ParsedBatch::rejected`] and does not sink the rest of the batch.
//! - [`source`]: where a batch is read from (a file or standard input).
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Wire details stay here; the engine sees only
//! [`reconcile::ChangeEvent`] and its attribute images.

pub mod batch;
pub mod source;
pub mod wire;

pub use batch::{parse_batch, table_from_arn, ListenerError, ParsedBatch, RecordError, RejectedRecord};
pub use source::BatchSource;
