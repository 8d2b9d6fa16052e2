//! AI-assisted markdown extraction via the external model.
//!
//! Ships the whole document inline (base64) and asks the model for
//! markdown with explicit `# Page N` boundaries, then splits the response
//! back into per-page content. A response without page markers is kept as
//! a single page rather than discarded.

use std::path::Path;

use async_trait::async_trait;
use base64::Engine;
use regex::Regex;
use tracing::{debug, warn};

use crate::llm::{GeminiClient, GeminiPart};
use crate::model::{PageContent, ParsedDocument};

use super::{Parser, ParserError, ParserKind};

const EXTRACT_PROMPT: &str = r##"You are a document-to-Markdown parser. Extract the content from this document and convert it to markdown format.

IMPORTANT INSTRUCTIONS:
1. Process each page separately and clearly mark page boundaries
2. Use the exact format: "# Page N" (where N is the page number) as a header for each page
3. Preserve the document structure using appropriate markdown formatting
4. Convert tables to markdown table format when possible
5. Preserve headings, lists, and other formatting elements
6. If a page has no readable content, indicate this clearly
7. Do not add any commentary or explanations - just return the formatted content

Please process this document and return the markdown content with clear page separations."##;

/// AI markdown-extraction strategy.
pub struct GeminiParser {
    client: GeminiClient,
}

impl GeminiParser {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Parser for GeminiParser {
    fn kind(&self) -> ParserKind {
        ParserKind::Gemini
    }

    async fn parse(&self, source: &Path) -> Result<ParsedDocument, ParserError> {
        let bytes = tokio::fs::read(source).await?;
        let mime_type = infer::get(&bytes)
            .map(|t| t.mime_type())
            .unwrap_or("application/pdf");
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);

        debug!(source = %source.display(), mime_type, "requesting markdown extraction");
        let markdown = self
            .client
            .generate(vec![
                GeminiPart::text(EXTRACT_PROMPT),
                GeminiPart::inline(mime_type, encoded),
            ])
            .await?;

        let pages = split_by_page_markers(&markdown);
        Ok(ParsedDocument { pages })
    }
}

/// Split a model response into pages on `# Page N` markers.
fn split_by_page_markers(markdown: &str) -> Vec<PageContent> {
    let marker = Regex::new(r"(?m)^# Page\s+(\d+)\s*$").expect("static regex");

    let matches: Vec<_> = marker.find_iter(markdown).collect();
    if matches.is_empty() {
        warn!("no page markers in model response, treating as single page");
        return vec![PageContent {
            page: 1,
            content_md: markdown.trim().to_string(),
        }];
    }

    let mut pages = Vec::with_capacity(matches.len());
    for (i, m) in matches.iter().enumerate() {
        let body_start = m.end();
        let body_end = matches
            .get(i + 1)
            .map(|next| next.start())
            .unwrap_or(markdown.len());
        let content = markdown[body_start..body_end].trim();
        // Renumber sequentially: the model occasionally repeats or skips
        // page numbers and downstream consumers require document order.
        let page = (i + 1) as u32;
        pages.push(PageContent {
            page,
            content_md: format!("# Page {page}\n\n{content}"),
        });
    }
    pages
}
