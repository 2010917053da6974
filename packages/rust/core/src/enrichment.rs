//! Enrichment orchestrator.
//!
//! Adds a translation and an explanation to each extracted record, one record
//! at a time. Service failures never abort the run: they degrade into markers
//! stored on the record.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use studykit_extract::question_parts;
use studykit_services::{Explainer, ServiceError, Translator};
use studykit_shared::{
    AppConfig, DisputeTier, Explanation, ExplanationTier, QuestionRecord, RunMode,
    TranslatedChoice, Translation, TranslationOutcome,
};

/// Explanation text for records the run mode did not select.
pub const NOT_SELECTED_TEXT: &str = "(No AI explanation for this question)";

/// Explanation text after every attempt was rate limited.
pub const GENERATION_FAILED_TEXT: &str = "Generation failed";

/// Prefix of the explanation text for a non-retryable service error.
pub const ERROR_PREFIX: &str = "Error: ";

/// Source language passed to the translator.
const SOURCE_LANG: &str = "auto";

// ---------------------------------------------------------------------------
// Pacing
// ---------------------------------------------------------------------------

/// Waits between service calls. Abstracted so tests can observe waits.
pub trait Pacer {
    fn pause(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPacer;

impl Pacer for TokioPacer {
    async fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator config
// ---------------------------------------------------------------------------

/// Settings the orchestrator needs, flattened from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    pub mode: RunMode,
    /// Translation target language code.
    pub target_lang: String,
    /// Language the explanation is written in.
    pub output_language: String,
    pub exam_name: String,
    pub fast_model: String,
    pub detailed_model: String,
    /// Attempts per explanation, including the first.
    pub max_attempts: u32,
    pub fast_base_wait: Duration,
    pub detailed_base_wait: Duration,
    /// Courtesy pause after every explanation call.
    pub explain_delay: Duration,
    /// Courtesy pause after every translation sub-call.
    pub translate_delay: Duration,
}

impl EnrichmentConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            mode: config.run.mode,
            target_lang: config.run.target_lang.clone(),
            output_language: config.run.output_language.clone(),
            exam_name: config.run.exam_name.clone(),
            fast_model: config.gemini.fast_model.clone(),
            detailed_model: config.gemini.detailed_model.clone(),
            max_attempts: config.pacing.max_attempts.max(1),
            fast_base_wait: config.pacing.fast_base_wait(),
            detailed_base_wait: config.pacing.detailed_base_wait(),
            explain_delay: config.pacing.explain_delay(),
            translate_delay: config.pacing.translate_delay(),
        }
    }

    fn model(&self, tier: ExplanationTier) -> &str {
        match tier {
            ExplanationTier::Detailed => &self.detailed_model,
            _ => &self.fast_model,
        }
    }

    fn base_wait(&self, tier: ExplanationTier) -> Duration {
        match tier {
            ExplanationTier::Detailed => self.detailed_base_wait,
            _ => self.fast_base_wait,
        }
    }
}

// ---------------------------------------------------------------------------
// Tier selection and prompts
// ---------------------------------------------------------------------------

/// Which explanation tier (if any) a record gets under `mode`.
pub fn select_tier(mode: RunMode, dispute: DisputeTier) -> ExplanationTier {
    match (mode, dispute.is_disputed()) {
        (RunMode::All, true) | (RunMode::DisputedOnly, true) => ExplanationTier::Detailed,
        (RunMode::All, false) => ExplanationTier::Fast,
        (RunMode::DisputedOnly, false) | (RunMode::None, _) => ExplanationTier::None,
    }
}

/// Prompt for one question at the given tier.
pub fn build_prompt(
    tier: ExplanationTier,
    exam_name: &str,
    output_language: &str,
    question_text: &str,
) -> String {
    match tier {
        ExplanationTier::Detailed => format!(
            "You are an expert who holds the {exam_name} certification.\n\
             For the exam question below, the site's official answer and the community vote disagree.\n\
             Work out logically which answer is correct, or whether the question itself is outdated, and explain.\n\
             \n\
             Requirements:\n\
             1. Write the whole answer in {output_language}.\n\
             2. Explain why that choice is correct based on how the platform actually works.\n\
             \n\
             Output format:\n\
             Answer: [the answer you consider correct]\n\
             Explanation: [reasoning and analysis]\n\
             \n\
             --- Question ---\n\
             {question_text}\n"
        ),
        _ => format!(
            "You are an expert who holds the {exam_name} certification.\n\
             Give the correct answer to the exam question below with a short explanation.\n\
             Write the whole answer in {output_language}.\n\
             \n\
             Output format:\n\
             Answer: [correct answer]\n\
             Explanation: [two or three sentences]\n\
             \n\
             --- Question ---\n\
             {question_text}\n"
        ),
    }
}

// ---------------------------------------------------------------------------
// Translation
// ---------------------------------------------------------------------------

/// Translate the stem and every non-empty choice body of a record.
///
/// Returns `None` when the body has nothing to translate. Choice letters are
/// carried over untranslated. The first failing sub-call fails the record.
pub async fn translate_record<T: Translator, P: Pacer>(
    record: &QuestionRecord,
    translator: &T,
    pacer: &P,
    config: &EnrichmentConfig,
) -> Option<TranslationOutcome> {
    if record.plain_text.is_empty() {
        return None;
    }
    let parts = question_parts(&record.body_html);
    if parts.is_empty() {
        return None;
    }

    let result = async {
        let stem = match &parts.stem {
            Some(stem) => Some(translate_paced(stem, translator, pacer, config).await?),
            None => None,
        };

        let mut choices = Vec::with_capacity(parts.choices.len());
        for choice in &parts.choices {
            let text = if choice.body.is_empty() {
                String::new()
            } else {
                translate_paced(&choice.body, translator, pacer, config).await?
            };
            choices.push(TranslatedChoice {
                letter: choice.letter.clone(),
                classes: choice.classes.clone(),
                text,
            });
        }

        Ok::<_, ServiceError>(Translation { stem, choices })
    }
    .await;

    Some(match result {
        Ok(translation) => TranslationOutcome::Translated(translation),
        Err(e) => {
            warn!(id = record.id, error = %e, "translation failed");
            TranslationOutcome::Failed {
                detail: e.to_string(),
            }
        }
    })
}

/// One translation sub-call followed by the courtesy pause, whatever the outcome.
async fn translate_paced<T: Translator, P: Pacer>(
    text: &str,
    translator: &T,
    pacer: &P,
    config: &EnrichmentConfig,
) -> Result<String, ServiceError> {
    let result = translator.translate(text, SOURCE_LANG, &config.target_lang).await;
    pacer.pause(config.translate_delay).await;
    result
}

// ---------------------------------------------------------------------------
// Explanation
// ---------------------------------------------------------------------------

/// Result of one explanation request after retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExplainOutcome {
    Generated(String),
    /// Error marker text to store instead of an explanation.
    Failed(String),
}

impl ExplainOutcome {
    pub fn into_text(self) -> String {
        match self {
            Self::Generated(text) | Self::Failed(text) => text,
        }
    }
}

/// Call the explainer, retrying rate-limited attempts with a linear backoff.
///
/// The wait before attempt `n + 1` is `base_wait(tier) × n`; there is no wait
/// after the final attempt. Any other error ends the request immediately.
pub async fn explain_with_retry<E: Explainer, P: Pacer>(
    explainer: &E,
    pacer: &P,
    config: &EnrichmentConfig,
    tier: ExplanationTier,
    prompt: &str,
) -> ExplainOutcome {
    let model = config.model(tier);
    let base_wait = config.base_wait(tier);

    for attempt in 1..=config.max_attempts {
        match explainer.explain(model, prompt).await {
            Ok(text) => return ExplainOutcome::Generated(text),
            Err(e) if e.is_rate_limited() => {
                if attempt < config.max_attempts {
                    let wait = base_wait * attempt;
                    warn!(attempt, wait_ms = wait.as_millis() as u64, %model, "rate limited, backing off");
                    pacer.pause(wait).await;
                } else {
                    warn!(attempt, %model, "rate limited on final attempt");
                }
            }
            Err(e) => {
                warn!(attempt, %model, error = %e, "explanation failed");
                return ExplainOutcome::Failed(format!("{ERROR_PREFIX}{e}"));
            }
        }
    }

    ExplainOutcome::Failed(GENERATION_FAILED_TEXT.to_string())
}

// ---------------------------------------------------------------------------
// Per-record orchestration
// ---------------------------------------------------------------------------

/// What happened to one record during enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSummary {
    pub tier: ExplanationTier,
    pub explanation_failed: bool,
    pub translation_failed: bool,
}

/// Translate and (when selected) explain one record in place.
#[instrument(skip_all, fields(id = record.id))]
pub async fn enrich_record<T: Translator, E: Explainer, P: Pacer>(
    record: &mut QuestionRecord,
    translator: &T,
    explainer: &E,
    pacer: &P,
    config: &EnrichmentConfig,
) -> RecordSummary {
    let translation = translate_record(record, translator, pacer, config).await;
    let translation_failed = matches!(translation, Some(TranslationOutcome::Failed { .. }));
    record.translation = translation;

    let dispute = record.dispute_tier();
    let tier = match select_tier(config.mode, dispute) {
        ExplanationTier::None => ExplanationTier::None,
        _ if record.plain_text.is_empty() => {
            debug!("selected for explanation but body is empty");
            ExplanationTier::None
        }
        selected => selected,
    };

    if tier == ExplanationTier::None {
        record.explanation = Some(Explanation {
            tier,
            text: NOT_SELECTED_TEXT.to_string(),
        });
        return RecordSummary {
            tier,
            explanation_failed: false,
            translation_failed,
        };
    }

    let prompt = build_prompt(tier, &config.exam_name, &config.output_language, &record.plain_text);
    let outcome = explain_with_retry(explainer, pacer, config, tier, &prompt).await;
    pacer.pause(config.explain_delay).await;

    let explanation_failed = matches!(outcome, ExplainOutcome::Failed(_));
    info!(
        tier = tier.as_str(),
        ?dispute,
        failed = explanation_failed,
        "explanation done"
    );

    record.explanation = Some(Explanation {
        tier,
        text: outcome.into_text(),
    });

    RecordSummary {
        tier,
        explanation_failed,
        translation_failed,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory collaborators shared by the core tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Records every pause instead of sleeping.
    #[derive(Default)]
    pub struct RecordingPacer {
        pub pauses: Mutex<Vec<Duration>>,
    }

    impl RecordingPacer {
        pub fn pauses(&self) -> Vec<Duration> {
            self.pauses.lock().unwrap().clone()
        }
    }

    impl Pacer for RecordingPacer {
        async fn pause(&self, duration: Duration) {
            self.pauses.lock().unwrap().push(duration);
        }
    }

    /// Prefixes the target language; fails on any text containing `fail_on`.
    #[derive(Default)]
    pub struct FakeTranslator {
        pub fail_on: Option<String>,
        pub calls: Mutex<Vec<String>>,
    }

    impl Translator for FakeTranslator {
        async fn translate(&self, text: &str, _source: &str, target: &str) -> Result<String, ServiceError> {
            self.calls.lock().unwrap().push(text.to_string());
            if self.fail_on.as_deref().is_some_and(|f| text.contains(f)) {
                return Err(ServiceError::Http {
                    status: 503,
                    body: "unavailable".into(),
                });
            }
            Ok(format!("[{target}] {text}"))
        }
    }

    /// Replays scripted responses; answers "ok" once the script runs out.
    #[derive(Default)]
    pub struct ScriptedExplainer {
        pub script: Mutex<VecDeque<Result<String, ServiceError>>>,
        pub calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedExplainer {
        pub fn with(script: Vec<Result<String, ServiceError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::default(),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl Explainer for ScriptedExplainer {
        async fn explain(&self, model: &str, prompt: &str) -> Result<String, ServiceError> {
            self.calls
                .lock()
                .unwrap()
                .push((model.to_string(), prompt.to_string()));
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("ok".into()))
        }
    }

    pub fn fast_config(mode: RunMode) -> EnrichmentConfig {
        let mut app = AppConfig::default();
        app.run.mode = mode;
        EnrichmentConfig::from_app(&app)
    }
}
