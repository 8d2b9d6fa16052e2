//! Reserved strategy tag that is accepted at ingestion but not yet
//! implemented. Fails fast; must never reach an external service.

use std::path::Path;

use async_trait::async_trait;

use crate::model::ParsedDocument;

use super::{Parser, ParserError, ParserKind};

#[derive(Default)]
pub struct PlaceholderParser;

impl PlaceholderParser {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Parser for PlaceholderParser {
    fn kind(&self) -> ParserKind {
        ParserKind::Placeholder
    }

    async fn parse(&self, _source: &Path) -> Result<ParsedDocument, ParserError> {
        Err(ParserError::NotImplemented(
            "placeholder parser is not implemented; use 'simple' or 'gemini' instead".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn always_fails_without_touching_the_source() {
        let result = PlaceholderParser::new()
            .parse(Path::new("/nonexistent/never-read.bin"))
            .await;
        match result {
            Err(ParserError::NotImplemented(message)) => {
                assert!(message.contains("not implemented"));
            }
            other => panic!("expected NotImplemented, got {other:?}"),
        }
    }
}
