//! Application configuration for hottake.
//!
//! User config lives at `~/.hottake/hottake.toml`.
//! Per-request overrides are resolved against it into an immutable [`RunConfig`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HotTakeError, Result};
use crate::types::{Framing, OutputMode, ProgressGranularity};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "hottake.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".hottake";

// ---------------------------------------------------------------------------
// Config structs (matching hottake.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Per-run defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Upper bounds for caller overrides.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Deadlines for upstream calls.
    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    /// Chat-completion provider.
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Web search provider.
    #[serde(default)]
    pub search: SearchConfig,

    /// Synthesis prompt settings.
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Maximum keywords extracted from the page.
    #[serde(default = "default_keyword_count")]
    pub keyword_count: u32,

    /// Search results fetched per keyword.
    #[serde(default = "default_results_per_keyword")]
    pub results_per_keyword: u32,

    /// Synthesis output: text or structured.
    #[serde(default)]
    pub output_mode: OutputMode,

    /// What `fetchedCount` counts during FetchContents.
    #[serde(default)]
    pub progress_granularity: ProgressGranularity,

    /// Event stream framing.
    #[serde(default)]
    pub framing: Framing,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            keyword_count: default_keyword_count(),
            results_per_keyword: default_results_per_keyword(),
            output_mode: OutputMode::default(),
            progress_granularity: ProgressGranularity::default(),
            framing: Framing::default(),
        }
    }
}

fn default_keyword_count() -> u32 {
    5
}
fn default_results_per_keyword() -> u32 {
    2
}

/// `[limits]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_keyword_count")]
    pub max_keyword_count: u32,

    #[serde(default = "default_max_results_per_keyword")]
    pub max_results_per_keyword: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_keyword_count: default_max_keyword_count(),
            max_results_per_keyword: default_max_results_per_keyword(),
        }
    }
}

fn default_max_keyword_count() -> u32 {
    10
}
fn default_max_results_per_keyword() -> u32 {
    5
}

/// `[timeouts]` section, all in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_page_fetch_secs")]
    pub page_fetch_secs: u64,

    #[serde(default = "default_search_secs")]
    pub search_secs: u64,

    #[serde(default = "default_content_fetch_secs")]
    pub content_fetch_secs: u64,

    #[serde(default = "default_completion_secs")]
    pub completion_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            page_fetch_secs: default_page_fetch_secs(),
            search_secs: default_search_secs(),
            content_fetch_secs: default_content_fetch_secs(),
            completion_secs: default_completion_secs(),
        }
    }
}

fn default_page_fetch_secs() -> u64 {
    10
}
fn default_search_secs() -> u64 {
    15
}
fn default_content_fetch_secs() -> u64 {
    20
}
fn default_completion_secs() -> u64 {
    120
}

/// `[completion]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`).
    #[serde(default = "default_completion_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_completion_key_env")]
    pub api_key_env: String,

    /// Model used for keyword extraction.
    #[serde(default = "default_keyword_model")]
    pub keyword_model: String,

    /// Model used for the final synthesis.
    #[serde(default = "default_synthesis_model")]
    pub synthesis_model: String,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: default_completion_base_url(),
            api_key_env: default_completion_key_env(),
            keyword_model: default_keyword_model(),
            synthesis_model: default_synthesis_model(),
        }
    }
}

fn default_completion_base_url() -> String {
    "https://ark.cn-beijing.volces.com/api/v3".into()
}
fn default_completion_key_env() -> String {
    "ARK_API_KEY".into()
}
fn default_keyword_model() -> String {
    "deepseek-v3".into()
}
fn default_synthesis_model() -> String {
    "deepseek-r1".into()
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Custom Search JSON API endpoint.
    #[serde(default = "default_search_base_url")]
    pub base_url: String,

    /// Env var holding the search API key.
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,

    /// Env var holding the search engine id.
    #[serde(default = "default_search_engine_env")]
    pub engine_id_env: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: default_search_base_url(),
            api_key_env: default_search_key_env(),
            engine_id_env: default_search_engine_env(),
        }
    }
}

fn default_search_base_url() -> String {
    "https://www.googleapis.com/customsearch/v1".into()
}
fn default_search_key_env() -> String {
    "GOOGLE_KEY".into()
}
fn default_search_engine_env() -> String {
    "GOOGLE_CX".into()
}

/// `[synthesis]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// File replacing the built-in synthesis prompt template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_path: Option<String>,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".into()
}

// ---------------------------------------------------------------------------
// Run config (runtime, merged from config + caller overrides)
// ---------------------------------------------------------------------------

/// Caller-supplied overrides for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOverrides {
    #[serde(default, alias = "keywordsCount")]
    pub keyword_count: Option<u32>,
    #[serde(default, alias = "searchResultsPerKeyword")]
    pub results_per_keyword: Option<u32>,
}

/// Immutable per-run configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    /// Maximum keywords (K).
    pub keyword_count: usize,
    /// Search results per keyword (R).
    pub results_per_keyword: usize,
}

impl RunConfig {
    /// Merge overrides onto the defaults, rejecting values outside `[1, cap]`.
    pub fn resolve(
        defaults: &DefaultsConfig,
        limits: &LimitsConfig,
        overrides: Option<RunOverrides>,
    ) -> Result<Self> {
        let overrides = overrides.unwrap_or_default();
        let keyword_count = check_range(
            "keywordCount",
            overrides.keyword_count.unwrap_or(defaults.keyword_count),
            limits.max_keyword_count,
        )?;
        let results_per_keyword = check_range(
            "resultsPerKeyword",
            overrides
                .results_per_keyword
                .unwrap_or(defaults.results_per_keyword),
            limits.max_results_per_keyword,
        )?;

        Ok(Self {
            keyword_count,
            results_per_keyword,
        })
    }

    /// Upper bound on content fetches for the run (K × R).
    pub fn max_contents(&self) -> usize {
        self.keyword_count * self.results_per_keyword
    }
}

fn check_range(name: &str, value: u32, cap: u32) -> Result<usize> {
    if value == 0 || value > cap {
        return Err(HotTakeError::validation(format!(
            "{name} must be between 1 and {cap}, got {value}"
        )));
    }
    Ok(value as usize)
}

/// Upstream deadlines as durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadlines {
    pub page_fetch: Duration,
    pub search: Duration,
    pub content_fetch: Duration,
    pub completion: Duration,
}

impl From<&TimeoutsConfig> for Deadlines {
    fn from(t: &TimeoutsConfig) -> Self {
        Self {
            page_fetch: Duration::from_secs(t.page_fetch_secs),
            search: Duration::from_secs(t.search_secs),
            content_fetch: Duration::from_secs(t.content_fetch_secs),
            completion: Duration::from_secs(t.completion_secs),
        }
    }
}

impl Default for Deadlines {
    fn default() -> Self {
        Self::from(&TimeoutsConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.hottake/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| HotTakeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.hottake/hottake.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| HotTakeError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| HotTakeError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| HotTakeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| HotTakeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| HotTakeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a secret from the env var named in the config.
pub fn read_secret(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(HotTakeError::config(format!(
            "credential not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Check that every credential the pipeline needs is present.
pub fn validate_credentials(config: &AppConfig) -> Result<()> {
    read_secret(&config.completion.api_key_env)?;
    read_secret(&config.search.api_key_env)?;
    read_secret(&config.search.engine_id_env)?;
    Ok(())
}
