//! Scripted upstream providers for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use hottake_shared::{HotTakeError, Result, SearchResult};
use hottake_upstream::{CompletionProvider, PageContent, PageReader, SearchProvider};

/// What a fake does when called.
#[derive(Debug, Clone)]
pub enum Script<T> {
    Reply(T),
    Fail(String),
    /// Never completes; only a deadline ends the call.
    Hang,
}

impl<T: Clone> Script<T> {
    async fn play(&self) -> Result<T> {
        match self {
            Self::Reply(value) => Ok(value.clone()),
            Self::Fail(message) => Err(HotTakeError::FetchFailure(message.clone())),
            Self::Hang => std::future::pending().await,
        }
    }
}

// ---------------------------------------------------------------------------
// Pages
// ---------------------------------------------------------------------------

/// Serves scripted pages by url; unknown urls fail.
#[derive(Debug, Default)]
pub struct FakePageReader {
    pages: HashMap<String, Script<PageContent>>,
    calls: Mutex<Vec<String>>,
}

impl FakePageReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, title: &str, text: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            Script::Reply(PageContent {
                title: title.to_string(),
                description: format!("About {title}"),
                text: text.to_string(),
            }),
        );
        self
    }

    pub fn script(mut self, url: &str, script: Script<PageContent>) -> Self {
        self.pages.insert(url.to_string(), script);
        self
    }

    /// Urls read so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PageReader for FakePageReader {
    async fn read(&self, url: &str, _deadline: Duration) -> Result<PageContent> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(url.to_string());
        }
        match self.pages.get(url) {
            Some(script) => script.play().await,
            None => Err(HotTakeError::FetchFailure(format!("{url}: HTTP 404"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Returns scripted hits per keyword, ignoring the limit so callers' truncation is exercised.
#[derive(Debug, Default)]
pub struct FakeSearch {
    hits: HashMap<String, Vec<SearchResult>>,
    failing: bool,
    calls: Mutex<Vec<(String, usize)>>,
}

impl FakeSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hits for `keyword`, given as `(url, title)` pairs.
    pub fn hits(mut self, keyword: &str, hits: &[(&str, &str)]) -> Self {
        self.hits.insert(
            keyword.to_string(),
            hits.iter()
                .map(|(url, title)| SearchResult {
                    url: url.to_string(),
                    title: title.to_string(),
                })
                .collect(),
        );
        self
    }

    /// Fail every search.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// `(keyword, limit)` of every search so far.
    pub fn calls(&self) -> Vec<(String, usize)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SearchProvider for FakeSearch {
    async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<SearchResult>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((keyword.to_string(), limit));
        }
        if self.failing {
            return Err(HotTakeError::UpstreamFailure("search API error (429)".into()));
        }
        Ok(self.hits.get(keyword).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

/// Answers every prompt with the same script and records the prompts.
#[derive(Debug)]
pub struct FakeCompletion {
    script: Script<String>,
    prompts: Mutex<Vec<String>>,
}

impl FakeCompletion {
    pub fn answering(answer: impl Into<String>) -> Self {
        Self::scripted(Script::Reply(answer.into()))
    }

    pub fn scripted(script: Script<String>) -> Self {
        Self {
            script,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CompletionProvider for FakeCompletion {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        match &self.script {
            Script::Fail(message) => Err(HotTakeError::UpstreamFailure(message.clone())),
            other => other.play().await,
        }
    }
}
