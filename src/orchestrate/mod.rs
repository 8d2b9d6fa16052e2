//! Batch and multi-parser comparison workflows.
//!
//! Orchestration composes ingestion calls and status polls; it never
//! touches the queue or the worker directly, and each constituent job is
//! independent — there is no atomicity or rollback across jobs.

mod batch;
mod compare;
mod poll;

pub use batch::{upload_batch, BatchItem, BatchOutcome, UploadFile};
pub use compare::{compare, CompareError, CompareOutcome};
pub use poll::{poll_until_terminal, PollError, PollSettings};
