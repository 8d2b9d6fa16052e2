//! Parser strategy abstraction.
//!
//! A closed set of strategies turns document bytes into ordered per-page
//! markdown. Strategy selection is a pure function of the job's `parser`
//! tag, resolved once per job at claim time; an unrecognized tag is
//! rejected before any strategy dispatch, and the placeholder strategy
//! fails fast without ever reaching an external service.

mod gemini;
mod placeholder;
mod text;

pub use gemini::GeminiParser;
pub use placeholder::PlaceholderParser;
pub use text::TextParser;

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::{GeminiClient, LlmError};
use crate::model::ParsedDocument;

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("{0}")]
    NotImplemented(String),
    #[error("parse failed: {0}")]
    Failed(String),
    #[error("could not read source document: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LlmError> for ParserError {
    fn from(e: LlmError) -> Self {
        ParserError::Failed(e.to_string())
    }
}

/// The closed set of parser strategy tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParserKind {
    /// Local text extraction, no external calls.
    Simple,
    /// AI-assisted markdown extraction via the external model.
    Gemini,
    /// Reserved tag that always fails fast with a not-implemented error.
    Placeholder,
}

impl ParserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParserKind::Simple => "simple",
            ParserKind::Gemini => "gemini",
            ParserKind::Placeholder => "placeholder",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_lowercase().as_str() {
            "simple" => Some(ParserKind::Simple),
            "gemini" => Some(ParserKind::Gemini),
            "placeholder" => Some(ParserKind::Placeholder),
            _ => None,
        }
    }

    pub fn all() -> &'static [ParserKind] {
        &[
            ParserKind::Simple,
            ParserKind::Gemini,
            ParserKind::Placeholder,
        ]
    }
}

impl std::fmt::Display for ParserKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A parsing strategy: source document in, ordered per-page markdown out.
#[async_trait]
pub trait Parser: Send + Sync {
    fn kind(&self) -> ParserKind;

    async fn parse(&self, source: &Path) -> Result<ParsedDocument, ParserError>;
}

/// All registered strategies, one per [`ParserKind`].
pub struct ParserSet {
    parsers: Vec<Box<dyn Parser>>,
}

impl ParserSet {
    /// Build the full strategy set. The AI strategy shares the given
    /// model client with the summarizer.
    pub fn new(client: GeminiClient) -> Self {
        Self {
            parsers: vec![
                Box::new(TextParser::new()),
                Box::new(GeminiParser::new(client)),
                Box::new(PlaceholderParser::new()),
            ],
        }
    }

    pub fn get(&self, kind: ParserKind) -> Option<&dyn Parser> {
        self.parsers
            .iter()
            .find(|p| p.kind() == kind)
            .map(|p| p.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_resolution_is_closed() {
        assert_eq!(ParserKind::from_tag("simple"), Some(ParserKind::Simple));
        assert_eq!(ParserKind::from_tag("GEMINI"), Some(ParserKind::Gemini));
        assert_eq!(
            ParserKind::from_tag("placeholder"),
            Some(ParserKind::Placeholder)
        );
        assert_eq!(ParserKind::from_tag("pypdf"), None);
        assert_eq!(ParserKind::from_tag(""), None);
    }

    #[test]
    fn set_registers_every_kind() {
        let client = GeminiClient::new(None, "gemini-2.0-flash", std::time::Duration::from_secs(5));
        let set = ParserSet::new(client);
        for kind in ParserKind::all() {
            assert!(set.get(*kind).is_some(), "missing strategy for {kind}");
        }
    }
}
