//! The unit of progress sent over the wire.
//!
//! An [`Event`] always names its [`Stage`]; every other field is optional and
//! only present when the sub-step that produced the event has something to say.
//! Field names are camelCase on the wire.

use serde::{Deserialize, Serialize};

use hottake_shared::{AnalysisOutput, ErrorKind, HotTakeError, PageData, SearchResult, Stage};

/// Message shown to callers instead of the underlying failure cause.
pub const GENERIC_FAILURE_MESSAGE: &str = "analysis failed";

/// One streamed progress or result record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Stage the run was in when this event was produced.
    #[serde(rename = "step")]
    pub stage: Stage,

    /// Echo of the input driving this stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<InputEcho>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_content: Option<PagePreview>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,

    /// Incremental batch of URL records, merged by url on the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_urls: Option<Vec<UrlEntry>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_count: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<usize>,

    /// Exact text sent to the synthesis provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisOutput>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDescriptor>,
}

/// Echo of the raw input for a stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputEcho {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
}

/// Preview of the target page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagePreview {
    pub title: String,
    pub description: String,
    pub content_preview: String,
    pub url: String,
}

impl From<&PageData> for PagePreview {
    fn from(page: &PageData) -> Self {
        Self {
            title: page.title.clone(),
            description: page.description.clone(),
            content_preview: hottake_shared::preview(&page.body_text),
            url: page.source_url.clone(),
        }
    }
}

/// One URL record in a FetchContents batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlEntry {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_preview: Option<String>,
}

impl From<&SearchResult> for UrlEntry {
    fn from(hit: &SearchResult) -> Self {
        Self {
            url: hit.url.clone(),
            title: Some(hit.title.clone()),
            content_preview: None,
        }
    }
}

/// Failure descriptor carried by the terminal error event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&HotTakeError> for ErrorDescriptor {
    fn from(err: &HotTakeError) -> Self {
        Self {
            kind: err.kind(),
            message: GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

impl Event {
    /// An event carrying only its stage; signals stage entry.
    pub fn stage(stage: Stage) -> Self {
        Self {
            stage,
            data: None,
            page_content: None,
            keywords: None,
            fetched_urls: None,
            fetched_count: None,
            total_count: None,
            prompt: None,
            result: None,
            error: None,
        }
    }

    /// FetchPage entry, echoing the target url.
    pub fn page_requested(url: impl Into<String>) -> Self {
        Self {
            data: Some(InputEcho {
                url: Some(url.into()),
                keywords: None,
            }),
            ..Self::stage(Stage::FetchPage)
        }
    }

    /// FetchPage completion with the page preview.
    pub fn page_fetched(page: &PageData) -> Self {
        Self {
            page_content: Some(PagePreview::from(page)),
            ..Self::stage(Stage::FetchPage)
        }
    }

    /// ExtractKeywords completion.
    pub fn keywords_extracted(keywords: &[String]) -> Self {
        Self {
            keywords: Some(keywords.to_vec()),
            ..Self::stage(Stage::ExtractKeywords)
        }
    }

    /// Search entry, echoing the keywords that drive it.
    pub fn search_started(keywords: &[String]) -> Self {
        Self {
            data: Some(InputEcho {
                url: None,
                keywords: Some(keywords.to_vec()),
            }),
            ..Self::stage(Stage::Search)
        }
    }

    /// One keyword's search results, with the progress counter pair.
    pub fn search_batch(hits: &[SearchResult], fetched: usize, total: usize) -> Self {
        Self {
            fetched_urls: Some(hits.iter().map(UrlEntry::from).collect()),
            fetched_count: Some(fetched),
            total_count: Some(total),
            ..Self::stage(Stage::FetchContents)
        }
    }

    /// Content preview for a single fetched search hit.
    pub fn content_fetched(hit: &SearchResult, content_text: &str) -> Self {
        Self {
            fetched_urls: Some(vec![UrlEntry {
                url: hit.url.clone(),
                title: Some(hit.title.clone()),
                content_preview: Some(hottake_shared::preview(content_text)),
            }]),
            ..Self::stage(Stage::FetchContents)
        }
    }

    /// The synthesis prompt, emitted before the provider call.
    pub fn prompt_prepared(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Self::stage(Stage::FinalAnalysis)
        }
    }

    /// Terminal success event.
    pub fn finished(result: AnalysisOutput) -> Self {
        Self {
            result: Some(result),
            ..Self::stage(Stage::FinalAnalysis)
        }
    }

    /// Terminal failure event.
    pub fn failed(stage: Stage, err: &HotTakeError) -> Self {
        Self {
            error: Some(ErrorDescriptor::from(err)),
            ..Self::stage(stage)
        }
    }

    /// Attach a progress counter pair.
    pub fn with_counts(mut self, fetched: usize, total: usize) -> Self {
        self.fetched_count = Some(fetched);
        self.total_count = Some(total);
        self
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        self.error.is_some() || self.result.is_some()
    }
}
