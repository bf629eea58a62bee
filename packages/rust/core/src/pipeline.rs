//! End-to-end analysis run: URL → page → keywords → search → contents → synthesis.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use hottake_protocol::Event;
use hottake_shared::{
    AnalysisOutput, AppConfig, BODY_CHAR_LIMIT, ContentRecord, Deadlines, HotTakeError, OutputMode,
    PageData, ProgressGranularity, Result, RunConfig, SearchResult, Stage, truncate_chars,
};
use hottake_upstream::{
    ChatCompletionClient, CompletionProvider, GoogleSearch, HttpPageReader, PageReader,
    SearchProvider,
};

use crate::parse;
use crate::prompts::{self, SynthesisTemplate};
use crate::sink::EventSink;

/// The upstream services a run talks to.
#[derive(Clone)]
pub struct Upstreams {
    pub page_reader: Arc<dyn PageReader>,
    pub search: Arc<dyn SearchProvider>,
    pub keyword_completion: Arc<dyn CompletionProvider>,
    pub synthesis_completion: Arc<dyn CompletionProvider>,
}

impl Upstreams {
    /// HTTP implementations configured from the app config and the environment.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let completion = &config.completion;
        Ok(Self {
            page_reader: Arc::new(HttpPageReader::new()?),
            search: Arc::new(GoogleSearch::from_config(&config.search)?),
            keyword_completion: Arc::new(ChatCompletionClient::from_config(
                completion,
                &completion.keyword_model,
            )?),
            synthesis_completion: Arc::new(ChatCompletionClient::from_config(
                completion,
                &completion.synthesis_model,
            )?),
        })
    }
}

/// Settings shared by every run of a [`Pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub deadlines: Deadlines,
    pub output_mode: OutputMode,
    pub granularity: ProgressGranularity,
    pub template: SynthesisTemplate,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            deadlines: Deadlines::default(),
            output_mode: OutputMode::Text,
            granularity: ProgressGranularity::Keyword,
            template: SynthesisTemplate::builtin(OutputMode::Text),
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let output_mode = config.defaults.output_mode;
        let template = match &config.synthesis.template_path {
            Some(path) => SynthesisTemplate::from_file(Path::new(path))?,
            None => SynthesisTemplate::builtin(output_mode),
        };

        Ok(Self {
            deadlines: Deadlines::from(&config.timeouts),
            output_mode,
            granularity: config.defaults.progress_granularity,
            template,
        })
    }
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// State accumulated by one run. Dropped when the stream closes.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub url: String,
    pub config: RunConfig,
    stage: Option<Stage>,
    pub page: Option<PageData>,
    pub keywords: Vec<String>,
    pub search_results: Vec<SearchResult>,
    pub contents: Vec<ContentRecord>,
    pub output: Option<AnalysisOutput>,
}

impl PipelineRun {
    fn new(url: &str, config: RunConfig) -> Self {
        Self {
            url: url.to_string(),
            config,
            stage: None,
            page: None,
            keywords: Vec::new(),
            search_results: Vec::new(),
            contents: Vec::new(),
            output: None,
        }
    }

    /// Stage the run is in, `None` before the first stage starts.
    pub fn stage(&self) -> Option<Stage> {
        self.stage
    }

    fn enter(&mut self, stage: Stage) {
        debug_assert!(
            self.stage.is_none_or(|current| current <= stage),
            "stage {stage} entered after {:?}",
            self.stage
        );
        if self.stage != Some(stage) {
            debug!(%stage, "entering stage");
            self.stage = Some(stage);
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Runs the five stages for one URL at a time, emitting events as it goes.
#[derive(Clone)]
pub struct Pipeline {
    upstreams: Upstreams,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(upstreams: Upstreams, settings: PipelineSettings) -> Self {
        Self {
            upstreams,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run the full pipeline for `url`.
    ///
    /// Every event goes to `sink`. A failing stage emits one error event and
    /// ends the run; nothing is retried. If the sink's consumer goes away the
    /// run stops with [`HotTakeError::Cancelled`] and emits nothing more.
    #[instrument(skip_all, fields(run_id = %uuid::Uuid::now_v7(), url = %url))]
    pub async fn run(
        &self,
        url: &str,
        config: RunConfig,
        sink: &mut dyn EventSink,
    ) -> Result<PipelineRun> {
        let start = Instant::now();
        info!(
            keyword_count = config.keyword_count,
            results_per_keyword = config.results_per_keyword,
            "starting analysis run"
        );

        let mut run = PipelineRun::new(url, config);
        match self.execute(&mut run, sink).await {
            Ok(()) => {
                info!(
                    keywords = run.keywords.len(),
                    contents = run.contents.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "analysis run complete"
                );
                Ok(run)
            }
            Err(HotTakeError::Cancelled) => {
                info!(stage = ?run.stage, "consumer disconnected, run cancelled");
                Err(HotTakeError::Cancelled)
            }
            Err(e) => {
                let stage = run.stage.unwrap_or(Stage::FetchPage);
                warn!(%stage, error = %e, "analysis run failed");
                // Best effort: the consumer may already be gone.
                let _ = sink.emit(Event::failed(stage, &e)).await;
                Err(e)
            }
        }
    }

    async fn execute(&self, run: &mut PipelineRun, sink: &mut dyn EventSink) -> Result<()> {
        self.fetch_page(run, sink).await?;
        self.extract_keywords(run, sink).await?;
        self.announce_search(run, sink).await?;
        self.fetch_contents(run, sink).await?;
        self.final_analysis(run, sink).await
    }

    // --- Stage 1: FetchPage ---
    async fn fetch_page(&self, run: &mut PipelineRun, sink: &mut dyn EventSink) -> Result<()> {
        run.enter(Stage::FetchPage);
        sink.emit(Event::page_requested(&run.url)).await?;

        let deadline = self.settings.deadlines.page_fetch;
        checkpoint(sink)?;
        let content = with_deadline(
            "page fetch",
            deadline,
            self.upstreams.page_reader.read(&run.url, deadline),
        )
        .await?;

        let page = PageData {
            title: content.title,
            description: content.description,
            body_text: truncate_chars(&content.text, BODY_CHAR_LIMIT),
            source_url: run.url.clone(),
        };
        sink.emit(Event::page_fetched(&page)).await?;
        run.page = Some(page);
        Ok(())
    }

    // --- Stage 2: ExtractKeywords ---
    async fn extract_keywords(&self, run: &mut PipelineRun, sink: &mut dyn EventSink) -> Result<()> {
        run.enter(Stage::ExtractKeywords);
        sink.emit(Event::stage(Stage::ExtractKeywords)).await?;

        let page = run.page.as_ref().ok_or_else(missing_page)?;
        let prompt = prompts::keyword_prompt(page, run.config.keyword_count);

        checkpoint(sink)?;
        let raw = with_deadline(
            "keyword completion",
            self.settings.deadlines.completion,
            self.upstreams.keyword_completion.complete(&prompt),
        )
        .await?;

        run.keywords = parse::parse_keywords(&raw, run.config.keyword_count)?;
        info!(keywords = ?run.keywords, "keywords extracted");
        sink.emit(Event::keywords_extracted(&run.keywords)).await
    }

    // --- Stage 3: Search ---
    async fn announce_search(&self, run: &mut PipelineRun, sink: &mut dyn EventSink) -> Result<()> {
        run.enter(Stage::Search);
        sink.emit(Event::search_started(&run.keywords)).await
    }

    // --- Stage 4: FetchContents ---
    async fn fetch_contents(&self, run: &mut PipelineRun, sink: &mut dyn EventSink) -> Result<()> {
        run.enter(Stage::FetchContents);

        let limit = run.config.results_per_keyword;
        let total = run.keywords.len() * limit;
        let deadlines = self.settings.deadlines;
        let mut attempted = 0usize;

        let keywords = run.keywords.clone();
        for (index, keyword) in keywords.iter().enumerate() {
            checkpoint(sink)?;
            let hits = with_deadline(
                "search",
                deadlines.search,
                self.upstreams.search.search(keyword, limit),
            )
            .await?;
            let hits = dedupe_hits(hits, limit);
            debug!(%keyword, hits = hits.len(), "search results");

            let batch = match self.settings.granularity {
                ProgressGranularity::Keyword => Event::search_batch(&hits, index + 1, total),
                ProgressGranularity::Item => Event::search_batch(&hits, attempted, total),
            };
            sink.emit(batch).await?;

            for hit in &hits {
                checkpoint(sink)?;
                attempted += 1;
                let fetched = with_deadline(
                    &format!("fetch {}", hit.url),
                    deadlines.content_fetch,
                    self.upstreams
                        .page_reader
                        .read(&hit.url, deadlines.content_fetch),
                )
                .await;

                let content = match fetched {
                    Ok(content) => content,
                    Err(e) => {
                        warn!(url = %hit.url, %keyword, error = %e, "content fetch failed, skipping");
                        continue;
                    }
                };

                let content_text = truncate_chars(&content.text, BODY_CHAR_LIMIT);
                let mut event = Event::content_fetched(hit, &content_text);
                if self.settings.granularity == ProgressGranularity::Item {
                    event = event.with_counts(attempted, total);
                }
                run.contents.push(ContentRecord {
                    keyword: keyword.clone(),
                    content_text,
                });
                sink.emit(event).await?;
            }

            run.search_results.extend(hits);
        }

        info!(
            search_results = run.search_results.len(),
            contents = run.contents.len(),
            "contents fetched"
        );
        Ok(())
    }

    // --- Stage 5: FinalAnalysis ---
    async fn final_analysis(&self, run: &mut PipelineRun, sink: &mut dyn EventSink) -> Result<()> {
        run.enter(Stage::FinalAnalysis);

        let page = run.page.as_ref().ok_or_else(missing_page)?;
        let prompt = self.settings.template.render(&run.url, page, &run.contents);
        sink.emit(Event::prompt_prepared(prompt.clone())).await?;

        checkpoint(sink)?;
        let raw = with_deadline(
            "synthesis completion",
            self.settings.deadlines.completion,
            self.upstreams.synthesis_completion.complete(&prompt),
        )
        .await?;

        let output = parse::parse_analysis(&raw, self.settings.output_mode)?;
        sink.emit(Event::finished(output.clone())).await?;
        run.output = Some(output);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Bound an upstream call by `deadline`.
async fn with_deadline<T>(
    operation: &str,
    deadline: Duration,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(HotTakeError::timeout(operation, deadline)),
    }
}

/// Stop before the next upstream call if nobody is listening.
fn checkpoint(sink: &dyn EventSink) -> Result<()> {
    if sink.is_closed() {
        return Err(HotTakeError::Cancelled);
    }
    Ok(())
}

/// Keep the first hit per url, at most `limit` hits.
fn dedupe_hits(hits: Vec<SearchResult>, limit: usize) -> Vec<SearchResult> {
    let mut kept: Vec<SearchResult> = Vec::with_capacity(limit);
    for hit in hits {
        if kept.len() == limit {
            break;
        }
        if !kept.iter().any(|k| k.url == hit.url) {
            kept.push(hit);
        }
    }
    kept
}

fn missing_page() -> HotTakeError {
    HotTakeError::validation("page data missing before keyword extraction")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeCompletion, FakePageReader, FakeSearch, Script};
    use crate::sink::CollectingSink;
    use hottake_protocol::{ErrorDescriptor, GENERIC_FAILURE_MESSAGE, fold};
    use hottake_shared::{ErrorKind, StructuredAnalysis};

    const ARTICLE: &str = "https://news.example/sequel";

    struct Fixture {
        reader: Arc<FakePageReader>,
        search: Arc<FakeSearch>,
        keywords: Arc<FakeCompletion>,
        synthesis: Arc<FakeCompletion>,
    }

    impl Fixture {
        fn new(
            reader: FakePageReader,
            search: FakeSearch,
            keywords: FakeCompletion,
            synthesis: FakeCompletion,
        ) -> Self {
            Self {
                reader: Arc::new(reader),
                search: Arc::new(search),
                keywords: Arc::new(keywords),
                synthesis: Arc::new(synthesis),
            }
        }

        fn standard() -> Self {
            Self::new(
                standard_reader(),
                standard_search(),
                FakeCompletion::answering(r#"{"keywords":["delay","refund"]}"#),
                FakeCompletion::answering("The report."),
            )
        }

        fn pipeline(&self, settings: PipelineSettings) -> Pipeline {
            Pipeline::new(
                Upstreams {
                    page_reader: self.reader.clone(),
                    search: self.search.clone(),
                    keyword_completion: self.keywords.clone(),
                    synthesis_completion: self.synthesis.clone(),
                },
                settings,
            )
        }
    }

    fn standard_reader() -> FakePageReader {
        FakePageReader::new()
            .page(ARTICLE, "Studio delays sequel", "The sequel slips to next year.")
            .page("https://a.example/1", "A1", "Delay coverage one")
            .page("https://a.example/2", "A2", "Delay coverage two")
            .page("https://b.example/1", "B1", "Refund coverage")
    }

    fn standard_search() -> FakeSearch {
        FakeSearch::new()
            .hits(
                "delay",
                &[
                    ("https://a.example/1", "A1"),
                    ("https://a.example/2", "A2"),
                    ("https://a.example/3", "A3"),
                ],
            )
            .hits("refund", &[("https://b.example/1", "B1")])
    }

    fn run_config(k: usize, r: usize) -> RunConfig {
        RunConfig {
            keyword_count: k,
            results_per_keyword: r,
        }
    }

    fn assert_monotonic(events: &[Event]) {
        for pair in events.windows(2) {
            assert!(
                pair[0].stage <= pair[1].stage,
                "{:?} after {:?}",
                pair[1].stage,
                pair[0].stage
            );
        }
    }

    #[tokio::test]
    async fn happy_path_event_sequence() {
        let fixture = Fixture::standard();
        let mut sink = CollectingSink::new();
        let run = fixture
            .pipeline(PipelineSettings::default())
            .run(ARTICLE, run_config(5, 2), &mut sink)
            .await
            .unwrap();

        let events = sink.into_events();
        let stages: Vec<Stage> = events.iter().map(|e| e.stage).collect();
        assert_eq!(
            stages,
            vec![
                Stage::FetchPage,
                Stage::FetchPage,
                Stage::ExtractKeywords,
                Stage::ExtractKeywords,
                Stage::Search,
                Stage::FetchContents, // delay batch
                Stage::FetchContents, // a.example/1
                Stage::FetchContents, // a.example/2
                Stage::FetchContents, // refund batch
                Stage::FetchContents, // b.example/1
                Stage::FinalAnalysis, // prompt
                Stage::FinalAnalysis, // result
            ]
        );
        assert_monotonic(&events);

        assert_eq!(events[0].data.as_ref().unwrap().url.as_deref(), Some(ARTICLE));
        let preview = events[1].page_content.as_ref().unwrap();
        assert_eq!(preview.title, "Studio delays sequel");
        assert_eq!(preview.content_preview, "The sequel slips to next year....");
        assert!(events[2].keywords.is_none());
        assert_eq!(
            events[3].keywords.as_deref(),
            Some(&["delay".to_string(), "refund".to_string()][..])
        );
        assert_eq!(
            events[4].data.as_ref().unwrap().keywords.as_ref().unwrap().len(),
            2
        );

        let first_batch = &events[5];
        assert_eq!(first_batch.fetched_urls.as_ref().unwrap().len(), 2);
        assert_eq!(first_batch.fetched_count, Some(1));
        assert_eq!(first_batch.total_count, Some(4));
        assert_eq!(events[8].fetched_count, Some(2));
        assert!(events[6].fetched_count.is_none());

        assert!(events.last().unwrap().is_terminal());
        assert_eq!(
            events.last().unwrap().result,
            Some(AnalysisOutput::Text("The report.".into()))
        );
        assert_eq!(run.contents.len(), 3);
        assert_eq!(run.contents[2].keyword, "refund");
        assert_eq!(run.search_results.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn page_timeout_emits_single_error_and_stops() {
        let fixture = Fixture::new(
            FakePageReader::new().script("http://example.invalid", Script::Hang),
            standard_search(),
            FakeCompletion::answering(r#"{"keywords":["x"]}"#),
            FakeCompletion::answering("unused"),
        );
        let mut sink = CollectingSink::new();
        let err = fixture
            .pipeline(PipelineSettings::default())
            .run("http://example.invalid", run_config(5, 2), &mut sink)
            .await
            .unwrap_err();

        match err {
            HotTakeError::TransportTimeout { after, .. } => {
                assert_eq!(after, Duration::from_secs(10))
            }
            other => panic!("expected timeout, got {other}"),
        }

        let events = sink.into_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], Event::page_requested("http://example.invalid"));
        assert_eq!(
            events[1].error,
            Some(ErrorDescriptor {
                kind: ErrorKind::TransportTimeout,
                message: GENERIC_FAILURE_MESSAGE.into(),
            })
        );
        assert_eq!(events.iter().filter(|e| e.error.is_some()).count(), 1);
        assert!(fixture.keywords.prompts().is_empty());
        assert!(fixture.search.calls().is_empty());
    }

    #[tokio::test]
    async fn fenced_keywords_drive_one_search_each() {
        let fixture = Fixture::new(
            standard_reader(),
            FakeSearch::new(),
            FakeCompletion::answering("```json\n{\"keywords\":[\"A\",\"B\"]}\n```"),
            FakeCompletion::answering("done"),
        );
        let mut sink = CollectingSink::new();
        let run = fixture
            .pipeline(PipelineSettings::default())
            .run(ARTICLE, run_config(5, 3), &mut sink)
            .await
            .unwrap();

        assert_eq!(run.keywords, vec!["A", "B"]);
        assert_eq!(
            fixture.search.calls(),
            vec![("A".to_string(), 3), ("B".to_string(), 3)]
        );
    }

    #[tokio::test]
    async fn respects_keyword_and_result_limits() {
        let fixture = Fixture::new(
            standard_reader(),
            standard_search().hits(
                "k1",
                &[
                    ("https://a.example/1", "dup"),
                    ("https://a.example/1", "dup again"),
                    ("https://a.example/2", "A2"),
                ],
            ),
            FakeCompletion::answering(r#"["k1","k2","k3","k4","k5","k6"]"#),
            FakeCompletion::answering("done"),
        );
        let mut sink = CollectingSink::new();
        let run = fixture
            .pipeline(PipelineSettings::default())
            .run(ARTICLE, run_config(3, 2), &mut sink)
            .await
            .unwrap();

        assert_eq!(run.keywords.len(), 3);
        assert_eq!(fixture.search.calls().len(), 3);
        assert!(run.contents.len() <= run.config.max_contents());

        let events = sink.into_events();
        for event in &events {
            if let Some(urls) = &event.fetched_urls {
                assert!(urls.len() <= 2);
            }
        }
        let first_batch = events
            .iter()
            .find(|e| e.fetched_count.is_some())
            .and_then(|e| e.fetched_urls.clone())
            .unwrap();
        let urls: Vec<&str> = first_batch.iter().map(|u| u.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.example/1", "https://a.example/2"]);
    }

    #[tokio::test]
    async fn limits_hold_for_every_allowed_config() {
        let keywords: Vec<String> = (1..=12).map(|i| format!("k{i}")).collect();
        let answer = serde_json::json!({ "keywords": keywords }).to_string();

        for k in 1..=10 {
            for r in 1..=5 {
                let mut reader = FakePageReader::new().page(ARTICLE, "Article", "Body text.");
                let mut search = FakeSearch::new();
                for keyword in &keywords {
                    let urls: Vec<String> = (1..=7)
                        .map(|j| format!("https://{keyword}.example/{j}"))
                        .collect();
                    for url in &urls {
                        reader = reader.page(url, "Hit", "Coverage");
                    }
                    let hits: Vec<(&str, &str)> =
                        urls.iter().map(|u| (u.as_str(), "Hit")).collect();
                    search = search.hits(keyword, &hits);
                }

                let fixture = Fixture::new(
                    reader,
                    search,
                    FakeCompletion::answering(&answer),
                    FakeCompletion::answering("done"),
                );
                let mut sink = CollectingSink::new();
                let run = fixture
                    .pipeline(PipelineSettings::default())
                    .run(ARTICLE, run_config(k, r), &mut sink)
                    .await
                    .unwrap();

                assert_eq!(run.keywords.len(), k, "K={k} R={r}");
                assert_eq!(run.search_results.len(), k * r, "K={k} R={r}");
                assert_eq!(run.contents.len(), k * r, "K={k} R={r}");

                for event in sink.into_events() {
                    if let Some(list) = &event.keywords {
                        assert!(list.len() <= k, "K={k} R={r}");
                    }
                    if let Some(urls) = &event.fetched_urls {
                        assert!(urls.len() <= r, "K={k} R={r}");
                    }
                }
            }
        }
    }

    #[tokio::test]
    async fn failed_content_fetch_is_skipped() {
        let fixture = Fixture::new(
            standard_reader()
                .script("https://a.example/1", Script::Fail("connection reset".into())),
            standard_search(),
            FakeCompletion::answering(r#"{"keywords":["delay"]}"#),
            FakeCompletion::answering("done"),
        );
        let mut sink = CollectingSink::new();
        let run = fixture
            .pipeline(PipelineSettings::default())
            .run(ARTICLE, run_config(5, 2), &mut sink)
            .await
            .unwrap();

        assert_eq!(run.contents.len(), 1);
        assert_eq!(run.contents[0].content_text, "Delay coverage two");
        let events = sink.into_events();
        assert!(events.iter().all(|e| e.error.is_none()));
        assert!(events.last().unwrap().result.is_some());
        assert_eq!(
            fixture.reader.calls(),
            vec![ARTICLE, "https://a.example/1", "https://a.example/2"]
        );
    }

    #[tokio::test]
    async fn malformed_keywords_fail_in_extract_stage() {
        let fixture = Fixture::new(
            standard_reader(),
            standard_search(),
            FakeCompletion::answering("delay, refund"),
            FakeCompletion::answering("unused"),
        );
        let mut sink = CollectingSink::new();
        let err = fixture
            .pipeline(PipelineSettings::default())
            .run(ARTICLE, run_config(5, 2), &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, HotTakeError::MalformedProviderOutput { .. }));

        let events = sink.into_events();
        let last = events.last().unwrap();
        assert_eq!(last.stage, Stage::ExtractKeywords);
        assert_eq!(last.error.as_ref().unwrap().kind, ErrorKind::MalformedProviderOutput);
        assert!(events.iter().all(|e| e.stage <= Stage::ExtractKeywords));
    }

    #[tokio::test]
    async fn search_failure_aborts_in_fetch_contents() {
        let fixture = Fixture::new(
            standard_reader(),
            FakeSearch::new().failing(),
            FakeCompletion::answering(r#"{"keywords":["delay"]}"#),
            FakeCompletion::answering("unused"),
        );
        let mut sink = CollectingSink::new();
        let err = fixture
            .pipeline(PipelineSettings::default())
            .run(ARTICLE, run_config(5, 2), &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, HotTakeError::UpstreamFailure(_)));

        let last = sink.events().last().unwrap().clone();
        assert_eq!(last.stage, Stage::FetchContents);
        assert_eq!(last.error.unwrap().kind, ErrorKind::UpstreamFailure);
        assert!(fixture.synthesis.prompts().is_empty());
    }

    #[tokio::test]
    async fn prompt_event_matches_synthesis_input() {
        let fixture = Fixture::standard();
        let mut sink = CollectingSink::new();
        fixture
            .pipeline(PipelineSettings::default())
            .run(ARTICLE, run_config(5, 2), &mut sink)
            .await
            .unwrap();

        let prompt_event = sink
            .events()
            .iter()
            .find(|e| e.prompt.is_some())
            .unwrap()
            .clone();
        let sent = fixture.synthesis.prompts();
        assert_eq!(sent.len(), 1);
        assert_eq!(prompt_event.prompt.as_deref(), Some(sent[0].as_str()));
        assert!(sent[0].contains("Studio delays sequel"));
        assert!(sent[0].contains("Refund coverage"));
        assert!(sent[0].contains(ARTICLE));
    }

    #[tokio::test]
    async fn item_granularity_counts_attempts() {
        let fixture = Fixture::new(
            standard_reader()
                .script("https://a.example/2", Script::Fail("reset".into())),
            standard_search(),
            FakeCompletion::answering(r#"{"keywords":["delay","refund"]}"#),
            FakeCompletion::answering("done"),
        );
        let settings = PipelineSettings {
            granularity: ProgressGranularity::Item,
            ..PipelineSettings::default()
        };
        let mut sink = CollectingSink::new();
        fixture
            .pipeline(settings)
            .run(ARTICLE, run_config(5, 2), &mut sink)
            .await
            .unwrap();

        let counts: Vec<(usize, usize)> = sink
            .events()
            .iter()
            .filter(|e| e.stage == Stage::FetchContents)
            .map(|e| (e.fetched_count.unwrap(), e.total_count.unwrap()))
            .collect();
        // delay batch, a/1, (a/2 failed), refund batch, b/1
        assert_eq!(counts, vec![(0, 4), (1, 4), (2, 4), (3, 4)]);
    }

    #[tokio::test]
    async fn structured_mode_parses_schema() {
        let answer = "```json\n{\"title\":\"Sequel delayed\",\"summary\":\"S\",\"impression\":\"negative\",\
                      \"entities\":[\"Studio\"],\"timeline\":[\"Announcement\"],\
                      \"opinions\":[{\"type\":\"negative\",\"content\":\"Again?\",\"subpoints\":[]}]}\n```";
        let fixture = Fixture::new(
            standard_reader(),
            standard_search(),
            FakeCompletion::answering(r#"{"keywords":["delay"]}"#),
            FakeCompletion::answering(answer),
        );
        let settings = PipelineSettings {
            output_mode: OutputMode::Structured,
            template: SynthesisTemplate::builtin(OutputMode::Structured),
            ..PipelineSettings::default()
        };
        let mut sink = CollectingSink::new();
        let run = fixture
            .pipeline(settings)
            .run(ARTICLE, run_config(5, 2), &mut sink)
            .await
            .unwrap();

        let Some(AnalysisOutput::Structured(StructuredAnalysis { title, opinions, .. })) =
            run.output
        else {
            panic!("expected structured output");
        };
        assert_eq!(title, "Sequel delayed");
        assert_eq!(opinions[0].content, "Again?");
    }

    #[tokio::test]
    async fn structured_mode_rejects_prose() {
        let fixture = Fixture::new(
            standard_reader(),
            standard_search(),
            FakeCompletion::answering(r#"{"keywords":["delay"]}"#),
            FakeCompletion::answering("I think the delay is bad."),
        );
        let settings = PipelineSettings {
            output_mode: OutputMode::Structured,
            ..PipelineSettings::default()
        };
        let mut sink = CollectingSink::new();
        fixture
            .pipeline(settings)
            .run(ARTICLE, run_config(5, 2), &mut sink)
            .await
            .unwrap_err();

        let events = sink.into_events();
        let last = events.last().unwrap();
        assert_eq!(last.stage, Stage::FinalAnalysis);
        assert!(last.result.is_none());
        assert_eq!(last.error.as_ref().unwrap().kind, ErrorKind::MalformedProviderOutput);
        // The prompt was still observable before the failure.
        assert!(events.iter().any(|e| e.prompt.is_some()));
    }

    /// Accepts a fixed number of events, then behaves like a dropped receiver.
    struct HangUpAfter {
        remaining: usize,
        events: Vec<Event>,
    }

    #[async_trait::async_trait]
    impl EventSink for HangUpAfter {
        async fn emit(&mut self, event: Event) -> Result<()> {
            if self.remaining == 0 {
                return Err(HotTakeError::Cancelled);
            }
            self.remaining -= 1;
            self.events.push(event);
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.remaining == 0
        }
    }

    #[tokio::test]
    async fn disconnect_cancels_without_error_event() {
        let fixture = Fixture::standard();
        let mut sink = HangUpAfter {
            remaining: 4,
            events: Vec::new(),
        };
        let err = fixture
            .pipeline(PipelineSettings::default())
            .run(ARTICLE, run_config(5, 2), &mut sink)
            .await
            .unwrap_err();

        assert!(matches!(err, HotTakeError::Cancelled));
        assert_eq!(sink.events.len(), 4);
        assert!(sink.events.iter().all(|e| e.error.is_none()));
        // Stopped before the first search.
        assert!(fixture.search.calls().is_empty());
    }

    #[tokio::test]
    async fn channel_consumer_dropping_cancels_run() {
        let fixture = Fixture::standard();
        let (mut tx, mut rx) = tokio::sync::mpsc::channel(1);
        let pipeline = fixture.pipeline(PipelineSettings::default());
        let handle = tokio::spawn(async move {
            pipeline.run(ARTICLE, run_config(5, 2), &mut tx).await
        });

        let first = rx.recv().await.unwrap();
        assert_eq!(first.stage, Stage::FetchPage);
        drop(rx);

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(HotTakeError::Cancelled)));
        assert!(fixture.synthesis.prompts().is_empty());
    }

    #[tokio::test]
    async fn reduced_events_merge_urls() {
        let fixture = Fixture::standard();
        let mut sink = CollectingSink::new();
        fixture
            .pipeline(PipelineSettings::default())
            .run(ARTICLE, run_config(5, 2), &mut sink)
            .await
            .unwrap();

        let state = fold(sink.events());
        assert!(state.is_done());
        let urls: Vec<&str> = state.fetched_urls.iter().map(|u| u.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://a.example/1",
                "https://a.example/2",
                "https://b.example/1"
            ]
        );
        let first = &state.fetched_urls[0];
        assert_eq!(first.title.as_deref(), Some("A1"));
        assert_eq!(first.content_preview.as_deref(), Some("Delay coverage one..."));
    }

    #[test]
    fn dedupe_keeps_first_and_limits() {
        let hit = |url: &str| SearchResult {
            url: url.into(),
            title: String::new(),
        };
        let hits = vec![hit("a"), hit("a"), hit("b"), hit("c")];
        let kept: Vec<String> = dedupe_hits(hits, 2).into_iter().map(|h| h.url).collect();
        assert_eq!(kept, vec!["a", "b"]);
    }

    #[test]
    fn settings_from_default_config() {
        let settings = PipelineSettings::from_config(&AppConfig::default()).unwrap();
        assert_eq!(settings.deadlines.page_fetch, Duration::from_secs(10));
        assert_eq!(settings.granularity, ProgressGranularity::Keyword);
        assert_eq!(settings.template, SynthesisTemplate::builtin(OutputMode::Text));
    }
}
