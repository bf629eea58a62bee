//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use futures::StreamExt;
use tokio::net::TcpListener;
use tracing::{info, warn};
use url::Url;

use hottake_core::{EventSink, Pipeline, PipelineSettings, Upstreams};
use hottake_protocol::{Event, EventEncoder, StreamDemux};
use hottake_server::AppState;
use hottake_shared::{
    AppConfig, Framing, HotTakeError, OutputMode, ProgressGranularity, RunConfig, RunOverrides,
    init_config, load_config, load_config_from, validate_credentials,
};

use crate::render::{CliProgress, RawSink, report};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// hottake: streamed hot-take analysis of a news article.
#[derive(Parser, Debug)]
#[command(
    name = "hottake",
    version,
    about = "Fetch an article, research its keywords, and stream an LLM hot take.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.hottake/hottake.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum ModeArg {
    Text,
    Structured,
}

impl From<ModeArg> for OutputMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Text => OutputMode::Text,
            ModeArg::Structured => OutputMode::Structured,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum GranularityArg {
    Keyword,
    Item,
}

impl From<GranularityArg> for ProgressGranularity {
    fn from(g: GranularityArg) -> Self {
        match g {
            GranularityArg::Keyword => ProgressGranularity::Keyword,
            GranularityArg::Item => ProgressGranularity::Item,
        }
    }
}

/// Per-run sizing flags shared by `analyze` and `watch`.
#[derive(clap::Args, Debug, Clone, Copy, Default)]
pub(crate) struct RunArgs {
    /// Maximum number of keywords to search for.
    #[arg(short, long)]
    pub keywords: Option<u32>,

    /// Search results fetched per keyword.
    #[arg(short, long)]
    pub results: Option<u32>,
}

impl From<RunArgs> for RunOverrides {
    fn from(args: RunArgs) -> Self {
        RunOverrides {
            keyword_count: args.keywords,
            results_per_keyword: args.results,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Run the analysis in this process.
    Analyze {
        /// Article URL to analyze.
        url: String,

        #[command(flatten)]
        run: RunArgs,

        /// Report format produced by the final step.
        #[arg(long)]
        mode: Option<ModeArg>,

        /// How finely fetch progress is counted.
        #[arg(long)]
        granularity: Option<GranularityArg>,

        /// Stream framing used with --raw: ndjson or concatenated.
        #[arg(long)]
        framing: Option<Framing>,

        /// Write the encoded event stream to stdout instead of a report.
        #[arg(long)]
        raw: bool,
    },

    /// Start a run on a hottake server and follow its stream.
    Watch {
        /// Article URL to analyze.
        url: String,

        /// Base URL of the server.
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        server: String,

        #[command(flatten)]
        run: RunArgs,

        /// Stream framing to request: ndjson or concatenated.
        #[arg(long)]
        framing: Option<Framing>,

        /// Copy the received bytes to stdout instead of a report.
        #[arg(long)]
        raw: bool,
    },

    /// Serve the streaming HTTP API.
    Serve {
        /// Address to bind (overrides `server.bind`).
        #[arg(long)]
        bind: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr so stdout stays
/// clean for reports and raw streams.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "hottake=info",
        1 => "hottake=debug",
        _ => "hottake=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Analyze {
            url,
            run,
            mode,
            granularity,
            framing,
            raw,
        } => {
            let mut config = resolve_config(config_path.as_deref())?;
            apply_local_flags(&mut config, mode, granularity, framing);
            cmd_analyze(&config, &url, run, raw).await
        }
        Command::Watch {
            url,
            server,
            run,
            framing,
            raw,
        } => {
            let config = resolve_config(config_path.as_deref())?;
            let framing = framing.unwrap_or(config.defaults.framing);
            cmd_watch(&server, &url, run, framing, raw).await
        }
        Command::Serve { bind } => {
            let config = resolve_config(config_path.as_deref())?;
            cmd_serve(&config, bind).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path.as_deref()).await,
        },
    }
}

fn resolve_config(path: Option<&std::path::Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

fn apply_local_flags(
    config: &mut AppConfig,
    mode: Option<ModeArg>,
    granularity: Option<GranularityArg>,
    framing: Option<Framing>,
) {
    if let Some(mode) = mode {
        config.defaults.output_mode = mode.into();
    }
    if let Some(granularity) = granularity {
        config.defaults.progress_granularity = granularity.into();
    }
    if let Some(framing) = framing {
        config.defaults.framing = framing;
    }
}

fn parse_target(url: &str) -> Result<Url> {
    let parsed = Url::parse(url).map_err(|e| eyre!("invalid URL '{url}': {e}"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(eyre!("unsupported URL scheme '{other}': expected http or https")),
    }
}

fn build_pipeline(config: &AppConfig) -> Result<Pipeline> {
    validate_credentials(config)?;
    let upstreams = Upstreams::from_config(config)?;
    let settings = PipelineSettings::from_config(config)?;
    Ok(Pipeline::new(upstreams, settings))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_analyze(config: &AppConfig, url: &str, run: RunArgs, raw: bool) -> Result<()> {
    let target = parse_target(url)?;
    let run_config = RunConfig::resolve(&config.defaults, &config.limits, Some(run.into()))?;
    let pipeline = build_pipeline(config)?;

    info!(
        url = %target,
        keyword_count = run_config.keyword_count,
        results_per_keyword = run_config.results_per_keyword,
        "analyzing article"
    );

    if raw {
        let mut sink = RawSink::new(EventEncoder::new(config.defaults.framing), std::io::stdout());
        return match run_with_interrupt(&pipeline, target.as_str(), run_config, &mut sink).await {
            Ok(()) | Err(HotTakeError::Cancelled) => Ok(()),
            Err(e) => Err(e.into()),
        };
    }

    let mut progress = CliProgress::new();
    let outcome = run_with_interrupt(&pipeline, target.as_str(), run_config, &mut progress).await;
    let state = progress.finish();

    match outcome {
        Ok(()) => {
            println!();
            print!("{}", report(&state));
            Ok(())
        }
        Err(HotTakeError::Cancelled) => Err(eyre!("analysis interrupted")),
        Err(e) => {
            let stage = state.stage.map(|s| s.label()).unwrap_or("Starting");
            Err(eyre!("analysis failed while {}: {e}", stage.to_lowercase()))
        }
    }
}

/// Drive one run, abandoning it on Ctrl-C.
async fn run_with_interrupt(
    pipeline: &Pipeline,
    url: &str,
    run_config: RunConfig,
    sink: &mut dyn EventSink,
) -> std::result::Result<(), HotTakeError> {
    tokio::select! {
        outcome = pipeline.run(url, run_config, sink) => outcome.map(|_| ()),
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, abandoning run");
            Err(HotTakeError::Cancelled)
        }
    }
}

async fn cmd_watch(
    server: &str,
    url: &str,
    run: RunArgs,
    framing: Framing,
    raw: bool,
) -> Result<()> {
    let target = parse_target(url)?;
    let endpoint = analyze_endpoint(server, framing)?;
    let body = serde_json::json!({
        "url": target.as_str(),
        "config": RunOverrides::from(run),
    });

    info!(%endpoint, url = %target, "requesting analysis");

    let resp = reqwest::Client::new()
        .post(endpoint)
        .json(&body)
        .send()
        .await
        .map_err(|e| eyre!("request to {server} failed: {e}"))?;

    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(eyre!("server rejected the run ({status}): {text}"));
    }

    let mut demux: StreamDemux<Event> = StreamDemux::new(framing);
    let mut progress = (!raw).then(CliProgress::new);
    let mut chunks = resp.bytes_stream();

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|e| eyre!("stream interrupted: {e}"))?;
        if raw {
            use std::io::Write;
            let mut out = std::io::stdout();
            out.write_all(&chunk)?;
            out.flush()?;
        }
        for event in demux.push(&chunk)? {
            if let Some(progress) = progress.as_mut() {
                progress.apply(&event);
            }
        }
    }
    if let Some(last) = demux.finish()? {
        if let Some(progress) = progress.as_mut() {
            progress.apply(&last);
        }
    }

    let Some(progress) = progress else {
        return Ok(());
    };
    let state = progress.finish();

    if let Some(error) = &state.error {
        return Err(eyre!("{} ({:?})", error.message, error.kind));
    }
    if !state.is_done() {
        return Err(eyre!("stream ended before the analysis finished"));
    }
    println!();
    print!("{}", report(&state));
    Ok(())
}

fn analyze_endpoint(server: &str, framing: Framing) -> Result<Url> {
    let base = Url::parse(server).map_err(|e| eyre!("invalid server URL '{server}': {e}"))?;
    let mut endpoint = base.join("api/analyze")?;
    let framing = match framing {
        Framing::Ndjson => "ndjson",
        Framing::Concatenated => "concatenated",
    };
    endpoint.query_pairs_mut().append_pair("framing", framing);
    Ok(endpoint)
}

async fn cmd_serve(config: &AppConfig, bind: Option<String>) -> Result<()> {
    let pipeline = build_pipeline(config)?;
    let state = Arc::new(AppState::new(pipeline, config));
    let addr = bind.unwrap_or_else(|| config.server.bind.clone());

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| eyre!("failed to bind {addr}: {e}"))?;
    hottake_server::serve(listener, state).await?;
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(path: Option<&std::path::Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
