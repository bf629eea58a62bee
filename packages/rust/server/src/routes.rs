//! Request handlers.

use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};
use url::Url;

use hottake_protocol::{Event, EventEncoder};
use hottake_shared::{Framing, HotTakeError, RunConfig, RunOverrides};

use crate::AppState;
use crate::error::ApiError;

/// Events buffered between the run and a slow client.
const EVENT_BUFFER: usize = 32;

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub url: String,
    #[serde(default)]
    pub config: Option<RunOverrides>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StreamParams {
    #[serde(default)]
    pub framing: Option<Framing>,
}

/// Start a run and stream its events.
///
/// Validation failures are answered with 400 before any event is sent. Once the
/// stream has started, failures arrive as the terminal error event instead.
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StreamParams>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Response, ApiError> {
    let url = validate_target(&req.url)?;
    let run_config = RunConfig::resolve(&state.defaults, &state.limits, req.config)?;
    let encoder = EventEncoder::new(params.framing.unwrap_or(state.defaults.framing));
    let content_type = encoder.content_type();

    info!(
        %url,
        keyword_count = run_config.keyword_count,
        results_per_keyword = run_config.results_per_keyword,
        framing = ?encoder.framing(),
        "analysis requested"
    );

    let (tx, rx) = mpsc::channel::<Event>(EVENT_BUFFER);
    let pipeline = Arc::clone(&state.pipeline);
    tokio::spawn(async move {
        let mut tx = tx;
        if let Err(e) = pipeline.run(&url, run_config, &mut tx).await {
            debug!(error = %e, "run ended without a result");
        }
    });

    let stream = ReceiverStream::new(rx).map(move |event| encoder.encode(&event));
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Returns the trimmed url as sent; the parsed form is only used for checking.
fn validate_target(raw: &str) -> Result<String, HotTakeError> {
    let trimmed = raw.trim();
    let url = Url::parse(trimmed)
        .map_err(|e| HotTakeError::validation(format!("invalid url '{raw}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(trimmed.to_string()),
        other => Err(HotTakeError::validation(format!(
            "unsupported url scheme '{other}'"
        ))),
    }
}
