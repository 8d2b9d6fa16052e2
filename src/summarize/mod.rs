//! Document-level summarization.
//!
//! The summarizer is an external capability behind a small trait so the
//! worker can be exercised without network access. A summarization
//! failure is terminal for the job: the worker records the error rather
//! than shipping a result with a missing summary.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::llm::{GeminiClient, GeminiPart, LlmError};
use crate::model::PageContent;

/// Character budget for content shipped to the model.
const MAX_CONTENT_CHARS: usize = 100_000;

const SUMMARY_PROMPT: &str = r#"Please provide a comprehensive summary of the following document. Your summary should:

1. Start with a brief overview paragraph (2-3 sentences)
2. Include key sections, topics, and main points as bullet points
3. Highlight important entities, numbers, dates, and findings
4. Capture the document's purpose and conclusions
5. Use clear, professional markdown formatting
6. Keep the summary concise but informative (aim for 200-500 words)

Document content:

{content}

Please provide only the summary in markdown format, without any additional commentary."#;

#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("document has no content to summarize")]
    EmptyDocument,
    #[error("summarization failed: {0}")]
    Model(#[from] LlmError),
}

/// Produces a document-level markdown summary from parsed pages.
#[async_trait]
pub trait Summarize: Send + Sync {
    async fn summarize(&self, pages: &[PageContent]) -> Result<String, SummarizeError>;
}

/// Gemini-backed summarizer.
pub struct GeminiSummarizer {
    client: GeminiClient,
}

impl GeminiSummarizer {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Summarize for GeminiSummarizer {
    async fn summarize(&self, pages: &[PageContent]) -> Result<String, SummarizeError> {
        if pages.iter().all(|p| p.content_md.trim().is_empty()) {
            return Err(SummarizeError::EmptyDocument);
        }

        let content = prepare_content(pages, MAX_CONTENT_CHARS);
        let prompt = SUMMARY_PROMPT.replace("{content}", &content);

        debug!(pages = pages.len(), chars = content.len(), "summarizing document");
        let summary = self
            .client
            .generate(vec![GeminiPart::text(prompt)])
            .await?;
        Ok(summary.trim().to_string())
    }
}

/// Join pages and truncate at a sensible boundary when over budget.
fn prepare_content(pages: &[PageContent], max_chars: usize) -> String {
    let full: String = pages
        .iter()
        .map(|p| p.content_md.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    if full.len() <= max_chars {
        return full;
    }

    let mut end = max_chars;
    while end > 0 && !full.is_char_boundary(end) {
        end -= 1;
    }
    let mut truncated = full[..end].to_string();

    // Prefer cutting at the end of a sentence or line when one falls in
    // the final tenth of the budget.
    let floor = max_chars * 9 / 10;
    if let Some(period) = truncated.rfind('.').filter(|&i| i > floor) {
        truncated.truncate(period + 1);
    } else if let Some(newline) = truncated.rfind('\n').filter(|&i| i > floor) {
        truncated.truncate(newline);
    }

    warn!(
        original = full.len(),
        truncated = truncated.len(),
        "document truncated for summarization"
    );
    truncated.push_str("\n\n[NOTE: Document was truncated for summarization due to length]");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(page: u32, content: &str) -> PageContent {
        PageContent {
            page,
            content_md: content.to_string(),
        }
    }

    #[test]
    fn short_content_passes_through_unchanged() {
        let pages = vec![page(1, "alpha"), page(2, "beta")];
        assert_eq!(prepare_content(&pages, 1000), "alpha\n\nbeta");
    }

    #[test]
    fn long_content_is_truncated_with_notice() {
        let pages = vec![page(1, &"x".repeat(500))];
        let content = prepare_content(&pages, 100);
        assert!(content.len() < 500);
        assert!(content.contains("[NOTE: Document was truncated"));
    }

    #[test]
    fn truncation_prefers_sentence_boundaries() {
        let body = format!("{}. tail that gets dropped", "y".repeat(95));
        let pages = vec![page(1, &body)];
        let content = prepare_content(&pages, 100);
        assert!(content.starts_with(&"y".repeat(95)));
        assert!(!content.contains("tail that"));
    }

    #[tokio::test]
    async fn empty_document_is_rejected_before_any_call() {
        let client = GeminiClient::new(None, "gemini-2.0-flash", std::time::Duration::from_secs(5));
        let summarizer = GeminiSummarizer::new(client);
        let result = summarizer.summarize(&[page(1, "   \n")]).await;
        assert!(matches!(result, Err(SummarizeError::EmptyDocument)));
    }
}
