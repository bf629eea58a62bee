//! Core domain types for a hot-take analysis run.

use serde::{Deserialize, Serialize};

/// Characters of extracted text kept for a page or a search hit.
pub const BODY_CHAR_LIMIT: usize = 10_000;

/// Characters of text shown in a preview before the ellipsis.
pub const PREVIEW_CHAR_LIMIT: usize = 200;

/// Suffix appended to every preview.
pub const PREVIEW_ELLIPSIS: &str = "...";

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// One ordered step of the pipeline. Declaration order is execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    FetchPage,
    ExtractKeywords,
    Search,
    FetchContents,
    FinalAnalysis,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 5] = [
        Stage::FetchPage,
        Stage::ExtractKeywords,
        Stage::Search,
        Stage::FetchContents,
        Stage::FinalAnalysis,
    ];

    /// Wire identifier, identical to the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FetchPage => "fetch_page",
            Self::ExtractKeywords => "extract_keywords",
            Self::Search => "search",
            Self::FetchContents => "fetch_contents",
            Self::FinalAnalysis => "final_analysis",
        }
    }

    /// Human-readable progress label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::FetchPage => "Fetching page",
            Self::ExtractKeywords => "Extracting keywords",
            Self::Search => "Searching the web",
            Self::FetchContents => "Fetching search results",
            Self::FinalAnalysis => "Generating final report",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Run data
// ---------------------------------------------------------------------------

/// The target page, extracted once at the start of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageData {
    pub title: String,
    pub description: String,
    /// First [`BODY_CHAR_LIMIT`] characters of the extracted text.
    pub body_text: String,
    pub source_url: String,
}

/// One web search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
}

/// Text fetched for one search hit, tagged with the keyword that found it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRecord {
    pub keyword: String,
    pub content_text: String,
}

// ---------------------------------------------------------------------------
// Analysis output
// ---------------------------------------------------------------------------

/// What the synthesis call is asked to produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Free-form report text.
    #[default]
    Text,
    /// JSON matching [`StructuredAnalysis`].
    Structured,
}

/// The fixed schema requested in [`OutputMode::Structured`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredAnalysis {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub impression: String,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub timeline: Vec<String>,
    #[serde(default)]
    pub opinions: Vec<Opinion>,
}

/// One opinion in a structured analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opinion {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    #[serde(default)]
    pub subpoints: Vec<String>,
}

/// Final result of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalysisOutput {
    Structured(StructuredAnalysis),
    Text(String),
}

// ---------------------------------------------------------------------------
// Stream options
// ---------------------------------------------------------------------------

/// How `fetchedCount` advances during FetchContents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressGranularity {
    /// Count keywords whose search has completed; reported on batch events only.
    #[default]
    Keyword,
    /// Count attempted content fetches; reported on every FetchContents event.
    Item,
}

/// How consecutive encoded events are separated on the byte stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// One JSON value per line.
    #[default]
    Ndjson,
    /// JSON values back to back with no separator.
    Concatenated,
}

impl Framing {
    /// Media type announced for a stream in this framing.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Ndjson => "application/x-ndjson",
            Self::Concatenated => "application/stream+json",
        }
    }
}

impl std::str::FromStr for Framing {
    type Err = crate::HotTakeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ndjson" => Ok(Self::Ndjson),
            "concatenated" => Ok(Self::Concatenated),
            other => Err(crate::HotTakeError::validation(format!(
                "unknown framing '{other}': expected 'ndjson' or 'concatenated'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Text helpers
// ---------------------------------------------------------------------------

/// Keep the first `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}

/// First [`PREVIEW_CHAR_LIMIT`] characters followed by [`PREVIEW_ELLIPSIS`].
pub fn preview(text: &str) -> String {
    let mut out = truncate_chars(text, PREVIEW_CHAR_LIMIT);
    out.push_str(PREVIEW_ELLIPSIS);
    out
}
