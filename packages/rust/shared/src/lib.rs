//! Shared types, error model, and configuration for StudyKit.
//!
//! This crate is the foundation depended on by all other StudyKit crates.
//! It provides:
//! - [`StudyKitError`] — the unified error type
//! - Domain types ([`QuestionRecord`], [`VoteEntry`], [`DisputeTier`], [`Explanation`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, GeminiConfig, PacingConfig, RunConfig, TranslateConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, resolve_api_key,
    validate_config,
};
pub use error::{Result, StudyKitError};
pub use types::{
    DisputeTier, Explanation, ExplanationTier, MISSING_ID, NO_ANSWER, PluralityRule,
    QuestionRecord, RunMode, SPLIT_MAJORITY_PCT, TranslatedChoice, Translation,
    TranslationOutcome, VoteEntry, sort_records,
};
