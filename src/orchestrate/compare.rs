//! Parser comparison: run one document through several strategies.
//!
//! One ingestion call per tag against the same source, then poll every
//! job to a terminal snapshot. Jobs are independent: one strategy's
//! failure shows up as an error snapshot for that tag and nothing else.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::ingest::{IngestError, IngestGateway};
use crate::model::JobSnapshot;
use crate::parser::ParserKind;
use crate::store::JobStore;

use super::poll::{poll_until_terminal, PollError, PollSettings};

#[derive(Debug, Error)]
pub enum CompareError {
    #[error("comparison requires at least two distinct parsers, got {0}")]
    TooFewParsers(usize),
    #[error("unknown parser: {0}")]
    UnknownParser(String),
    #[error(transparent)]
    Ingest(#[from] IngestError),
}

#[derive(Debug, Serialize)]
pub struct CompareOutcome {
    pub filename: String,
    /// Terminal (or last-observed, if polling gave up) snapshot per tag.
    pub results: BTreeMap<String, JobSnapshot>,
}

/// Submit the document once per parser tag and wait for every job.
pub async fn compare(
    gateway: &IngestGateway,
    store: &Arc<dyn JobStore>,
    bytes: &[u8],
    filename: &str,
    parser_tags: &[String],
    poll: &PollSettings,
) -> Result<CompareOutcome, CompareError> {
    // Deduplicate while preserving order; the tag set must name at least
    // two distinct, known strategies before any job is created.
    let mut tags: Vec<String> = Vec::new();
    for tag in parser_tags {
        if !tags.contains(tag) {
            tags.push(tag.clone());
        }
    }
    if tags.len() < 2 {
        return Err(CompareError::TooFewParsers(tags.len()));
    }
    for tag in &tags {
        if ParserKind::from_tag(tag).is_none() {
            return Err(CompareError::UnknownParser(tag.clone()));
        }
    }

    let mut submitted: Vec<(String, String)> = Vec::with_capacity(tags.len());
    for tag in &tags {
        let job_id = gateway.submit(bytes, tag, filename).await?;
        submitted.push((tag.clone(), job_id));
    }
    info!(filename, parsers = tags.len(), "comparison jobs submitted");

    let polls = submitted.iter().map(|(tag, job_id)| {
        let store = store.clone();
        async move {
            let snapshot = match poll_until_terminal(&store, job_id, poll).await {
                Ok(record) => JobSnapshot::from(&record),
                Err(PollError::TimedOut { last, .. }) => {
                    warn!(job_id, parser = %tag, "comparison poll budget exhausted");
                    JobSnapshot::from(last.as_ref())
                }
                Err(e) => return Err(e),
            };
            Ok((tag.clone(), snapshot))
        }
    });

    let mut results = BTreeMap::new();
    for outcome in futures::future::join_all(polls).await {
        match outcome {
            Ok((tag, snapshot)) => {
                results.insert(tag, snapshot);
            }
            Err(e) => {
                // A store failure mid-poll leaves that tag out of the map;
                // the other tags' snapshots still stand on their own.
                warn!(error = %e, "comparison poll failed");
            }
        }
    }

    Ok(CompareOutcome {
        filename: filename.to_string(),
        results,
    })
}
