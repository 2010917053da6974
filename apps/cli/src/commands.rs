//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use studykit_core::{
    BuildConfig, DEFAULT_SCRUB_PHRASES, ProgressReporter, RunReport, TokioPacer, run_study_kit,
    scrub_artifact,
};
use studykit_services::{GeminiClient, GoogleTranslator, ProbeStatus, probe_models};
use studykit_shared::{
    AppConfig, PluralityRule, RunMode, StudyKitError, init_config, load_config, load_config_from,
    resolve_api_key,
};

/// Models tried by `models probe` when no candidate is given.
const DEFAULT_PROBE_CANDIDATES: [&str; 6] = [
    "models/gemini-2.5-pro",
    "models/gemini-3-pro-preview",
    "models/gemini-2.5-flash",
    "models/gemini-2.0-flash-exp",
    "models/gemini-2.0-flash",
    "models/gemini-flash-latest",
];

/// Pause between probe requests.
const PROBE_DELAY: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// StudyKit — turn captured exam discussions into a bilingual study document.
#[derive(Parser)]
#[command(
    name = "studykit",
    version,
    about = "Turn captured exam-discussion pages into a bilingual, AI-annotated study document.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.studykit/studykit.toml.
    #[arg(long, global = true, env = "STUDYKIT_CONFIG")]
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

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Build the study document from a capture file.
    Build {
        /// Capture document (one `question-card` per question).
        capture: PathBuf,

        /// Output file (defaults to `<capture>.study.html`).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Which questions get an AI explanation: all, disputed_only, or none.
        #[arg(short, long)]
        mode: Option<RunMode>,

        /// Stop after this many questions.
        #[arg(short, long)]
        limit: Option<usize>,

        /// Document title (defaults to "<exam name> Study Kit").
        #[arg(short, long)]
        title: Option<String>,

        /// Pick the community answer by highest vote share instead of first listed.
        #[arg(long)]
        highest_share: bool,
    },

    /// Remove leftover vote-tally phrases from a written study document.
    Scrub {
        /// Study document to clean.
        input: PathBuf,

        /// Output file (defaults to `<input>.fixed.html`).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Phrase to remove (repeatable). Defaults to the built-in list.
        #[arg(long = "phrase")]
        phrases: Vec<String>,
    },

    /// Inspect the explanation models available to the configured key.
    Models {
        #[command(subcommand)]
        action: ModelsAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Model subcommands.
#[derive(Subcommand)]
pub(crate) enum ModelsAction {
    /// List every Gemini model visible to the API key.
    List,
    /// Send a short prompt to candidate models until one answers.
    Probe {
        /// Candidate model id (repeatable). Defaults to a built-in list.
        #[arg(long = "candidate")]
        candidates: Vec<String>,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "studykit=info",
        1 => "studykit=debug",
        _ => "studykit=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
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
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Build {
            capture,
            out,
            mode,
            limit,
            title,
            highest_share,
        } => {
            let overrides = BuildOverrides {
                mode,
                limit,
                highest_share,
            };
            cmd_build(config_path, capture, out, title, overrides).await
        }
        Command::Scrub { input, out, phrases } => cmd_scrub(&input, out, phrases),
        Command::Models { action } => match action {
            ModelsAction::List => cmd_models_list(config_path).await,
            ModelsAction::Probe { candidates } => cmd_models_probe(config_path, candidates).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig, StudyKitError> {
    match path {
        Some(p) => load_config_from(p),
        None => load_config(),
    }
}

/// `<dir>/<stem><suffix>` next to `path`.
fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "studykit".into());
    path.with_file_name(format!("{stem}{suffix}"))
}

// ---------------------------------------------------------------------------
// build
// ---------------------------------------------------------------------------

/// CLI flags that override the `[run]` section.
struct BuildOverrides {
    mode: Option<RunMode>,
    limit: Option<usize>,
    highest_share: bool,
}

async fn cmd_build(
    config_path: Option<&Path>,
    capture: PathBuf,
    out: Option<PathBuf>,
    title: Option<String>,
    overrides: BuildOverrides,
) -> Result<()> {
    let mut app = resolve_config(config_path)?;
    if let Some(mode) = overrides.mode {
        app.run.mode = mode;
    }
    if let Some(limit) = overrides.limit {
        app.run.process_limit = Some(limit);
    }
    if overrides.highest_share {
        app.run.plurality = PluralityRule::HighestShare;
    }

    // Only a run that can request explanations needs the key.
    let api_key = if app.run.mode.uses_explanations() {
        resolve_api_key(&app)?
    } else {
        String::new()
    };

    let translator = GoogleTranslator::from_config(&app.translate)?;
    let explainer = GeminiClient::from_config(&app.gemini, api_key)?;

    let output_path = out.unwrap_or_else(|| sibling_path(&capture, ".study.html"));
    info!(
        capture = %capture.display(),
        output = %output_path.display(),
        mode = %app.run.mode,
        "building study document"
    );

    let config = BuildConfig {
        capture_path: capture,
        output_path,
        title,
        app,
    };

    let reporter = CliProgress::new();
    let report = run_study_kit(&config, &translator, &explainer, &TokioPacer, &reporter).await?;

    print_report(&report);
    Ok(())
}

fn print_report(report: &RunReport) {
    println!();
    println!("  Study document written!");
    println!("  Questions:     {} (of {} in capture)", report.records, report.blocks_found);
    println!(
        "  Disputed:      {} ({} site vs community, {} split)",
        report.disputed(),
        report.site_vs_community,
        report.community_split
    );
    println!(
        "  Explanations:  {} detailed, {} fast, {} failed",
        report.detailed_explanations, report.fast_explanations, report.explanation_failures
    );
    println!("  Translations:  {} failed", report.translation_failures);
    println!("  Path:          {}", report.artifact.path.display());
    println!("  SHA-256:       {}", report.artifact.sha256);
    println!("  Time:          {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .expect("valid progress template")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn record_enriched(&self, id: u32, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Enriching [{current}/{total}] Question {id}"));
    }

    fn checkpoint(&self, written: usize, total: usize) {
        self.spinner
            .println(format!("  checkpoint saved ({written}/{total})"));
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// scrub
// ---------------------------------------------------------------------------

fn cmd_scrub(input: &Path, out: Option<PathBuf>, phrases: Vec<String>) -> Result<()> {
    let html = std::fs::read_to_string(input)
        .wrap_err_with(|| format!("cannot read {}", input.display()))?;

    let phrases = if phrases.is_empty() {
        DEFAULT_SCRUB_PHRASES.iter().map(|p| p.to_string()).collect()
    } else {
        phrases
    };

    let (cleaned, changed) = scrub_artifact(&html, &phrases);
    let output = out.unwrap_or_else(|| sibling_path(input, ".fixed.html"));
    let meta = studykit_core::write_artifact(&output, &cleaned)?;

    println!("Removed phrases from {changed} text node(s).");
    println!("Saved to: {}", meta.path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// models
// ---------------------------------------------------------------------------

fn gemini_client(config_path: Option<&Path>) -> Result<GeminiClient> {
    let app = resolve_config(config_path)?;
    let key = resolve_api_key(&app)?;
    Ok(GeminiClient::from_config(&app.gemini, key)?)
}

async fn cmd_models_list(config_path: Option<&Path>) -> Result<()> {
    let client = gemini_client(config_path)?;
    let models = client.list_models().await?;

    if models.is_empty() {
        println!("No models containing 'gemini' were found.");
        return Ok(());
    }

    println!("{:<40} | Display name", "Model id");
    println!("{}", "-".repeat(80));
    for m in &models {
        println!("{:<40} | {}", m.name, m.display_name);
    }
    println!("{}", "-".repeat(80));
    println!("{} Gemini model(s) found.", models.len());
    Ok(())
}

async fn cmd_models_probe(config_path: Option<&Path>, candidates: Vec<String>) -> Result<()> {
    let client = gemini_client(config_path)?;
    let candidates = if candidates.is_empty() {
        DEFAULT_PROBE_CANDIDATES.iter().map(|c| c.to_string()).collect()
    } else {
        candidates
    };

    let results = probe_models(&client, &candidates, PROBE_DELAY).await;
    for r in &results {
        let status = match &r.status {
            ProbeStatus::Available => "available".to_string(),
            ProbeStatus::NotFound => "not found (404)".to_string(),
            ProbeStatus::RateLimited => "over quota (429)".to_string(),
            ProbeStatus::Failed(e) => format!("error: {e}"),
        };
        println!("  {:<32} {status}", r.model);
    }

    match results.iter().find(|r| r.status == ProbeStatus::Available) {
        Some(r) => {
            println!();
            println!("Use this model id: {}", r.model);
            Ok(())
        }
        None => Err(eyre!("no candidate model answered")),
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
