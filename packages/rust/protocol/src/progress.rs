//! Client-side fold of events into cumulative progress state.

use serde::{Deserialize, Serialize};

use hottake_shared::{AnalysisOutput, Stage};

use crate::event::{ErrorDescriptor, Event, InputEcho, PagePreview, UrlEntry};

/// Everything a client knows about a run after the events seen so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<InputEcho>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_content: Option<PagePreview>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    /// URL records in first-seen order, unique by url.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fetched_urls: Vec<UrlEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDescriptor>,
}

impl ProgressState {
    /// Merge one event in place.
    ///
    /// Fields present on the event overwrite the state; `fetchedUrls` entries are
    /// upserted by url so a later content preview augments the earlier entry.
    pub fn apply(&mut self, event: &Event) {
        self.stage = Some(event.stage);
        overwrite(&mut self.data, &event.data);
        overwrite(&mut self.page_content, &event.page_content);
        overwrite(&mut self.keywords, &event.keywords);
        overwrite(&mut self.fetched_count, &event.fetched_count);
        overwrite(&mut self.total_count, &event.total_count);
        overwrite(&mut self.prompt, &event.prompt);
        overwrite(&mut self.result, &event.result);
        overwrite(&mut self.error, &event.error);

        if let Some(entries) = &event.fetched_urls {
            for entry in entries {
                self.upsert_url(entry);
            }
        }
    }

    fn upsert_url(&mut self, entry: &UrlEntry) {
        match self.fetched_urls.iter_mut().find(|e| e.url == entry.url) {
            Some(existing) => {
                overwrite(&mut existing.title, &entry.title);
                overwrite(&mut existing.content_preview, &entry.content_preview);
            }
            None => self.fetched_urls.push(entry.clone()),
        }
    }

    /// Whether the run has finished, successfully or not.
    pub fn is_done(&self) -> bool {
        self.result.is_some() || self.error.is_some()
    }

    /// Fraction of the FetchContents counter reached, if one has been reported.
    pub fn fraction(&self) -> Option<f64> {
        match (self.fetched_count, self.total_count) {
            (Some(done), Some(total)) if total > 0 => Some((done as f64 / total as f64).min(1.0)),
            _ => None,
        }
    }
}

fn overwrite<T: Clone>(slot: &mut Option<T>, incoming: &Option<T>) {
    if let Some(value) = incoming {
        *slot = Some(value.clone());
    }
}

/// Pure left-fold step.
pub fn reduce(mut state: ProgressState, event: &Event) -> ProgressState {
    state.apply(event);
    state
}

/// Fold a whole event sequence from the empty state.
pub fn fold<'a>(events: impl IntoIterator<Item = &'a Event>) -> ProgressState {
    events.into_iter().fold(ProgressState::default(), reduce)
}
