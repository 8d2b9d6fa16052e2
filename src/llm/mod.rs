//! External model access for AI parsing and summarization.

mod client;

pub use client::{GeminiClient, GeminiPart, LlmError};
