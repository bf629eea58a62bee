//! Upstream service adapters: page reader, web search, chat completion.
//!
//! The pipeline only depends on the traits defined here; the HTTP
//! implementations are swapped for scripted fakes in tests.
//! - [`PageReader`] / [`HttpPageReader`]: fetch a URL and extract its text
//! - [`SearchProvider`] / [`GoogleSearch`]: keyword to ordered `{url, title}` hits
//! - [`CompletionProvider`] / [`ChatCompletionClient`]: prompt to raw answer text

pub mod completion;
mod guard;
pub mod page;
pub mod search;

use std::time::Duration;

use async_trait::async_trait;

use hottake_shared::{Result, SearchResult};

pub use completion::ChatCompletionClient;
pub use page::{HttpPageReader, extract_page};
pub use search::GoogleSearch;

/// User-Agent string for outgoing requests.
pub(crate) const USER_AGENT: &str = concat!("hottake/", env!("CARGO_PKG_VERSION"));

/// Text and metadata extracted from one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageContent {
    pub title: String,
    pub description: String,
    /// Visible body text, whitespace-collapsed, not truncated.
    pub text: String,
}

/// Fetches a page and extracts its text.
#[async_trait]
pub trait PageReader: Send + Sync {
    /// Read `url`, giving up after `deadline`.
    async fn read(&self, url: &str, deadline: Duration) -> Result<PageContent>;
}

/// Runs a web search.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// At most `limit` hits for `keyword`, in provider order. May be empty.
    async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<SearchResult>>;
}

/// A single-turn language model completion.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Raw answer text for `prompt`.
    async fn complete(&self, prompt: &str) -> Result<String>;
}
