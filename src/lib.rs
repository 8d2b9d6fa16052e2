//! docmill - asynchronous document parsing and AI summarization service.
//!
//! Clients submit documents for parsing and summarization and poll for
//! results. Jobs travel through a durable queue with consumer-group
//! delivery; a worker pool drives each job to exactly one terminal state
//! despite at-least-once delivery, using ownership fencing against the
//! job store.

// Tag types use `from_str` methods that return Option<Self> (closed-set
// parsing), not Result<Self, Error> as std::str::FromStr requires.
#![allow(clippy::should_implement_trait)]

pub mod cli;
pub mod config;
pub mod ingest;
pub mod llm;
pub mod model;
pub mod orchestrate;
pub mod parser;
pub mod queue;
pub mod server;
pub mod store;
pub mod summarize;
pub mod worker;
