//! Local text-extraction strategy.
//!
//! Decodes the source as UTF-8 (lossily) and treats form feeds as page
//! breaks, the convention text exports of paginated documents use. Each
//! page is normalized into a small markdown fragment under a `# Page N`
//! header. No external calls.

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use crate::model::{PageContent, ParsedDocument};

use super::{Parser, ParserError, ParserKind};

/// Page separator in plain-text document exports.
const PAGE_BREAK: char = '\u{0c}';

#[derive(Default)]
pub struct TextParser;

impl TextParser {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Parser for TextParser {
    fn kind(&self) -> ParserKind {
        ParserKind::Simple
    }

    async fn parse(&self, source: &Path) -> Result<ParsedDocument, ParserError> {
        let bytes = tokio::fs::read(source).await?;
        if bytes.is_empty() {
            return Err(ParserError::Failed("source document is empty".to_string()));
        }

        let text = String::from_utf8_lossy(&bytes);
        let pages: Vec<PageContent> = text
            .split(PAGE_BREAK)
            .enumerate()
            .map(|(i, page_text)| {
                let page = (i + 1) as u32;
                PageContent {
                    page,
                    content_md: page_to_markdown(page_text, page),
                }
            })
            .collect();

        debug!(pages = pages.len(), source = %source.display(), "extracted text pages");
        Ok(ParsedDocument { pages })
    }
}

/// Render one page of plain text as a markdown fragment.
fn page_to_markdown(text: &str, page: u32) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return format!("# Page {page}\n\n*No content found on this page*\n");
    }

    let mut lines = Vec::new();
    for line in trimmed.lines() {
        let line = line.trim();
        if line.is_empty() {
            lines.push(String::new());
        } else {
            // Escape characters that would change meaning in markdown.
            lines.push(
                line.replace('*', "\\*")
                    .replace('_', "\\_")
                    .replace('#', "\\#"),
            );
        }
    }

    format!("# Page {page}\n\n{}\n", lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    async fn parse_bytes(bytes: &[u8]) -> Result<ParsedDocument, ParserError> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        TextParser::new().parse(file.path()).await
    }

    #[tokio::test]
    async fn single_page_without_breaks() {
        let parsed = parse_bytes(b"hello world").await.unwrap();
        assert_eq!(parsed.page_count(), 1);
        assert!(parsed.pages[0].content_md.starts_with("# Page 1"));
        assert!(parsed.pages[0].content_md.contains("hello world"));
    }

    #[tokio::test]
    async fn form_feeds_split_pages_in_order() {
        let parsed = parse_bytes(b"first\x0csecond\x0cthird").await.unwrap();
        assert_eq!(parsed.page_count(), 3);
        let pages: Vec<u32> = parsed.pages.iter().map(|p| p.page).collect();
        assert_eq!(pages, vec![1, 2, 3]);
        assert!(parsed.pages[2].content_md.contains("third"));
    }

    #[tokio::test]
    async fn blank_page_gets_a_placeholder_body() {
        let parsed = parse_bytes(b"content\x0c  \n ").await.unwrap();
        assert_eq!(parsed.page_count(), 2);
        assert!(parsed.pages[1]
            .content_md
            .contains("No content found on this page"));
    }

    #[tokio::test]
    async fn markdown_characters_are_escaped() {
        let parsed = parse_bytes(b"5 * 3 #tag _name_").await.unwrap();
        let body = &parsed.pages[0].content_md;
        assert!(body.contains("5 \\* 3 \\#tag \\_name\\_"));
    }

    #[tokio::test]
    async fn empty_source_is_a_parse_error() {
        let result = parse_bytes(b"").await;
        assert!(matches!(result, Err(ParserError::Failed(_))));
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let result = TextParser::new()
            .parse(Path::new("/nonexistent/docmill-test.bin"))
            .await;
        assert!(matches!(result, Err(ParserError::Io(_))));
    }
}
