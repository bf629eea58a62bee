//! Terminal rendering of run progress and results.

use std::io::Write;

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};

use hottake_core::EventSink;
use hottake_protocol::{Event, EventEncoder, ProgressState};
use hottake_shared::{AnalysisOutput, HotTakeError, Result, Stage};

// ---------------------------------------------------------------------------
// Spinner
// ---------------------------------------------------------------------------

/// Folds events into a [`ProgressState`] and mirrors it on a spinner.
pub(crate) struct CliProgress {
    spinner: ProgressBar,
    state: ProgressState,
}

impl CliProgress {
    pub(crate) fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self {
            spinner,
            state: ProgressState::default(),
        }
    }

    pub(crate) fn apply(&mut self, event: &Event) {
        self.state.apply(event);
        self.spinner.set_message(status_line(&self.state));
    }

    /// Stop the spinner and hand back the reduced state.
    pub(crate) fn finish(self) -> ProgressState {
        self.spinner.finish_and_clear();
        self.state
    }
}

#[async_trait]
impl EventSink for CliProgress {
    async fn emit(&mut self, event: Event) -> Result<()> {
        self.apply(&event);
        Ok(())
    }
}

/// One-line summary of where a run is.
pub(crate) fn status_line(state: &ProgressState) -> String {
    let Some(stage) = state.stage else {
        return "Starting".to_string();
    };
    let mut line = stage.label().to_string();

    if stage == Stage::FetchContents {
        if let (Some(done), Some(total)) = (state.fetched_count, state.total_count) {
            line.push_str(&format!(" [{done}/{total}]"));
        }
        if let Some(last) = state.fetched_urls.last() {
            line.push(' ');
            line.push_str(last.title.as_deref().unwrap_or(&last.url));
        }
    }
    line
}

// ---------------------------------------------------------------------------
// Raw stream
// ---------------------------------------------------------------------------

/// Writes every event, encoded, to a byte sink (usually stdout).
pub(crate) struct RawSink<W> {
    encoder: EventEncoder,
    out: W,
}

impl<W: Write + Send> RawSink<W> {
    pub(crate) fn new(encoder: EventEncoder, out: W) -> Self {
        Self { encoder, out }
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> W {
        self.out
    }
}

#[async_trait]
impl<W: Write + Send> EventSink for RawSink<W> {
    async fn emit(&mut self, event: Event) -> Result<()> {
        let bytes = self.encoder.encode(&event)?;
        self.out
            .write_all(&bytes)
            .and_then(|()| self.out.flush())
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::BrokenPipe => HotTakeError::Cancelled,
                _ => HotTakeError::io("<stdout>", e),
            })
    }
}

// ---------------------------------------------------------------------------
// Final report
// ---------------------------------------------------------------------------

/// Human-readable report for a finished run.
pub(crate) fn report(state: &ProgressState) -> String {
    let mut out = String::new();

    if let Some(page) = &state.page_content {
        out.push_str(&format!("  Source:   {}\n", page.url));
        out.push_str(&format!("  Title:    {}\n", page.title));
    }
    if let Some(keywords) = &state.keywords {
        out.push_str(&format!("  Keywords: {}\n", keywords.join(", ")));
    }
    if !state.fetched_urls.is_empty() {
        out.push_str("  Sources:\n");
        for entry in &state.fetched_urls {
            let title = entry.title.as_deref().unwrap_or("(untitled)");
            let marker = if entry.content_preview.is_some() { "+" } else { "-" };
            out.push_str(&format!("    {marker} {title} <{}>\n", entry.url));
        }
    }
    out.push('\n');

    match &state.result {
        Some(AnalysisOutput::Text(text)) => {
            out.push_str(text);
            out.push('\n');
        }
        Some(AnalysisOutput::Structured(analysis)) => {
            out.push_str(&format!("# {}\n\n", analysis.title));
            out.push_str(&format!("{}\n\n", analysis.summary));
            out.push_str(&format!("Impression: {}\n", analysis.impression));
            push_list(&mut out, "Entities", &analysis.entities);
            push_list(&mut out, "Timeline", &analysis.timeline);
            if !analysis.opinions.is_empty() {
                out.push_str("\nOpinions:\n");
                for opinion in &analysis.opinions {
                    out.push_str(&format!("  [{}] {}\n", opinion.kind, opinion.content));
                    for point in &opinion.subpoints {
                        out.push_str(&format!("      - {point}\n"));
                    }
                }
            }
        }
        None => {}
    }
    out
}

fn push_list(out: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("\n{heading}:\n"));
    for item in items {
        out.push_str(&format!("  - {item}\n"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hottake_protocol::UrlEntry;
    use hottake_shared::{Framing, Opinion, SearchResult, StructuredAnalysis};

    #[test]
    fn status_line_follows_stage() {
        let mut state = ProgressState::default();
        assert_eq!(status_line(&state), "Starting");

        state.apply(&Event::stage(Stage::ExtractKeywords));
        assert_eq!(status_line(&state), "Extracting keywords");

        let hit = SearchResult {
            url: "https://a.example/1".into(),
            title: "Coverage".into(),
        };
        state.apply(&Event::search_batch(std::slice::from_ref(&hit), 1, 4));
        assert_eq!(status_line(&state), "Fetching search results [1/4] Coverage");
    }

    #[test]
    fn report_lists_sources_and_text() {
        let mut state = ProgressState::default();
        state.keywords = Some(vec!["delay".into(), "refund".into()]);
        state.fetched_urls = vec![
            UrlEntry {
                url: "https://a.example/1".into(),
                title: Some("A1".into()),
                content_preview: Some("x...".into()),
            },
            UrlEntry {
                url: "https://a.example/2".into(),
                title: None,
                content_preview: None,
            },
        ];
        state.result = Some(AnalysisOutput::Text("The report.".into()));

        let out = report(&state);
        assert!(out.contains("Keywords: delay, refund"));
        assert!(out.contains("+ A1 <https://a.example/1>"));
        assert!(out.contains("- (untitled) <https://a.example/2>"));
        assert!(out.ends_with("The report.\n"));
    }

    #[test]
    fn report_renders_structured_analysis() {
        let state = ProgressState {
            result: Some(AnalysisOutput::Structured(StructuredAnalysis {
                title: "Sequel delayed".into(),
                summary: "S".into(),
                impression: "negative".into(),
                entities: vec!["Studio".into()],
                timeline: vec![],
                opinions: vec![Opinion {
                    kind: "negative".into(),
                    content: "Again?".into(),
                    subpoints: vec!["Third delay".into()],
                }],
            })),
            ..ProgressState::default()
        };
        let out = report(&state);
        assert!(out.contains("# Sequel delayed"));
        assert!(out.contains("Entities:\n  - Studio"));
        assert!(!out.contains("Timeline:"));
        assert!(out.contains("  [negative] Again?\n      - Third delay"));
    }

    #[tokio::test]
    async fn raw_sink_writes_encoded_events() {
        let mut sink = RawSink::new(EventEncoder::new(Framing::Ndjson), Vec::new());
        sink.emit(Event::stage(Stage::FetchPage)).await.unwrap();
        sink.emit(Event::stage(Stage::Search)).await.unwrap();
        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(out, "{\"step\":\"fetch_page\"}\n{\"step\":\"search\"}\n");
    }
}
