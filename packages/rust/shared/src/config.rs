//! Application configuration for StudyKit.
//!
//! User config lives at `~/.studykit/studykit.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, StudyKitError};
use crate::types::{PluralityRule, RunMode};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "studykit.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".studykit";

// ---------------------------------------------------------------------------
// Config structs (matching studykit.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Per-run settings.
    #[serde(default)]
    pub run: RunConfig,

    /// Gemini explanation backend.
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Translation backend.
    #[serde(default)]
    pub translate: TranslateConfig,

    /// Retry and courtesy-delay timings.
    #[serde(default)]
    pub pacing: PacingConfig,
}

/// `[run]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Which records get an AI explanation.
    #[serde(default)]
    pub mode: RunMode,

    /// Stop after this many records have been processed. Absent = unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_limit: Option<usize>,

    /// Translation target language code.
    #[serde(default = "default_target_lang")]
    pub target_lang: String,

    /// Language the explanation should be written in (used in prompts).
    #[serde(default = "default_output_language")]
    pub output_language: String,

    /// Exam name used in prompts and the document title.
    #[serde(default = "default_exam_name")]
    pub exam_name: String,

    /// How the community answer is chosen from the vote bars.
    #[serde(default)]
    pub plurality: PluralityRule,

    /// Rewrite the artifact after this many enriched records (0 disables checkpoints).
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::default(),
            process_limit: None,
            target_lang: default_target_lang(),
            output_language: default_output_language(),
            exam_name: default_exam_name(),
            plurality: PluralityRule::default(),
            checkpoint_every: default_checkpoint_every(),
        }
    }
}

fn default_target_lang() -> String {
    "ja".into()
}
fn default_output_language() -> String {
    "Japanese".into()
}
fn default_exam_name() -> String {
    "ServiceNow CIS-CSM".into()
}
fn default_checkpoint_every() -> usize {
    10
}

/// `[gemini]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// API root.
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,

    /// Model for the fast tier.
    #[serde(default = "default_fast_model")]
    pub fast_model: String,

    /// Model for the detailed tier.
    #[serde(default = "default_detailed_model")]
    pub detailed_model: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_gemini_base_url(),
            fast_model: default_fast_model(),
            detailed_model: default_detailed_model(),
        }
    }
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com".into()
}
fn default_fast_model() -> String {
    "models/gemini-2.5-flash".into()
}
fn default_detailed_model() -> String {
    "models/gemini-2.5-pro".into()
}

/// `[translate]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateConfig {
    /// Google Translate `translate_a/single` endpoint.
    #[serde(default = "default_translate_endpoint")]
    pub endpoint: String,
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            endpoint: default_translate_endpoint(),
        }
    }
}

fn default_translate_endpoint() -> String {
    "https://translate.googleapis.com/translate_a/single".into()
}

/// `[pacing]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Attempts per explanation call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Rate-limit backoff unit for the fast tier (multiplied by the attempt number).
    #[serde(default = "default_fast_base_wait")]
    pub fast_base_wait_ms: u64,

    /// Rate-limit backoff unit for the detailed tier.
    #[serde(default = "default_detailed_base_wait")]
    pub detailed_base_wait_ms: u64,

    /// Pause after every explanation call.
    #[serde(default = "default_explain_delay")]
    pub explain_delay_ms: u64,

    /// Pause after every translation sub-call.
    #[serde(default = "default_translate_delay")]
    pub translate_delay_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            fast_base_wait_ms: default_fast_base_wait(),
            detailed_base_wait_ms: default_detailed_base_wait(),
            explain_delay_ms: default_explain_delay(),
            translate_delay_ms: default_translate_delay(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_fast_base_wait() -> u64 {
    10_000
}
fn default_detailed_base_wait() -> u64 {
    20_000
}
fn default_explain_delay() -> u64 {
    5_000
}
fn default_translate_delay() -> u64 {
    200
}

impl PacingConfig {
    pub fn fast_base_wait(&self) -> Duration {
        Duration::from_millis(self.fast_base_wait_ms)
    }

    pub fn detailed_base_wait(&self) -> Duration {
        Duration::from_millis(self.detailed_base_wait_ms)
    }

    pub fn explain_delay(&self) -> Duration {
        Duration::from_millis(self.explain_delay_ms)
    }

    pub fn translate_delay(&self) -> Duration {
        Duration::from_millis(self.translate_delay_ms)
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.studykit/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| StudyKitError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.studykit/studykit.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| StudyKitError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        StudyKitError::parse(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| StudyKitError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| StudyKitError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| StudyKitError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject settings that would make a run meaningless.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.pacing.max_attempts == 0 {
        return Err(StudyKitError::config("pacing.max_attempts must be at least 1"));
    }
    if config.run.target_lang.trim().is_empty() {
        return Err(StudyKitError::config("run.target_lang must not be empty"));
    }
    for (key, value) in [
        ("gemini.base_url", &config.gemini.base_url),
        ("translate.endpoint", &config.translate.endpoint),
    ] {
        Url::parse(value)
            .map_err(|e| StudyKitError::config(format!("{key} is not a valid URL ({value}): {e}")))?;
    }
    Ok(())
}

/// Read the Gemini API key from the configured env var.
pub fn resolve_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.gemini.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(StudyKitError::config(format!(
            "Gemini API key not found. Set the {var_name} environment variable.\n\
             Get a key at https://aistudio.google.com/apikey"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("disputed_only"));
        assert!(toml_str.contains("GEMINI_API_KEY"));
        assert!(!toml_str.contains("process_limit"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.pacing.max_attempts, 3);
        assert_eq!(parsed.run.mode, RunMode::DisputedOnly);
        assert_eq!(parsed.gemini.detailed_model, "models/gemini-2.5-pro");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[run]
mode = "all"
process_limit = 25
plurality = "highest_share"

[pacing]
detailed_base_wait_ms = 30000
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.run.mode, RunMode::All);
        assert_eq!(config.run.process_limit, Some(25));
        assert_eq!(config.run.plurality, PluralityRule::HighestShare);
        assert_eq!(config.run.target_lang, "ja");
        assert_eq!(config.pacing.detailed_base_wait(), Duration::from_secs(30));
        assert_eq!(config.pacing.fast_base_wait(), Duration::from_secs(10));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = std::env::temp_dir().join(format!("sk-config-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("studykit.toml");
        std::fs::write(&path, "[run\nmode = ").unwrap();

        let err = load_config_from(&path).unwrap_err();
        assert!(matches!(err, StudyKitError::Parse { .. }), "got {err:?}");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn validation_rejects_zero_attempts() {
        let mut config = AppConfig::default();
        config.pacing.max_attempts = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn validation_rejects_bad_url() {
        let mut config = AppConfig::default();
        config.translate.endpoint = "not a url".into();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("translate.endpoint"));
    }

    #[test]
    fn api_key_missing() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.gemini.api_key_env = "SK_TEST_NONEXISTENT_KEY_12345".into();
        let result = resolve_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
