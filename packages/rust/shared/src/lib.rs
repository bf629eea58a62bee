//! Shared types, error model, and configuration for hottake.
//!
//! This crate is the foundation depended on by all other hottake crates.
//! It provides:
//! - [`HotTakeError`]: the unified error type
//! - Domain types ([`Stage`], [`PageData`], [`SearchResult`], [`ContentRecord`])
//! - Configuration ([`AppConfig`], [`RunConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CompletionConfig, Deadlines, DefaultsConfig, LimitsConfig, RunConfig,
    RunOverrides, SearchConfig, ServerConfig, SynthesisConfig, TimeoutsConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, read_secret,
    validate_credentials,
};
pub use error::{ErrorKind, HotTakeError, Result};
pub use types::{
    AnalysisOutput, BODY_CHAR_LIMIT, ContentRecord, Framing, Opinion, OutputMode, PREVIEW_CHAR_LIMIT,
    PREVIEW_ELLIPSIS, PageData, ProgressGranularity, SearchResult, Stage, StructuredAnalysis,
    preview, truncate_chars,
};
