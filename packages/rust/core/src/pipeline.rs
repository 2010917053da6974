//! End-to-end `build` pipeline: capture → blocks → records → enrichment → document.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use studykit_extract::{build_record, split_blocks};
use studykit_services::{Explainer, Translator};
use studykit_shared::{
    AppConfig, DisputeTier, ExplanationTier, QuestionRecord, Result, StudyKitError, sort_records,
};

use crate::assembler::{ArtifactMeta, RenderOptions, render_document, write_artifact};
use crate::enrichment::{EnrichmentConfig, Pacer, enrich_record};

/// Configuration for one `build` run.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Capture document produced by the harvesting step.
    pub capture_path: PathBuf,
    /// Where the study document is written.
    pub output_path: PathBuf,
    /// Document title; defaults to the exam name.
    pub title: Option<String>,
    /// Resolved application config (file + CLI overrides).
    pub app: AppConfig,
}

impl BuildConfig {
    fn render_options(&self) -> RenderOptions {
        RenderOptions {
            title: self
                .title
                .clone()
                .unwrap_or_else(|| format!("{} Study Kit", self.app.run.exam_name)),
            lang: self.app.run.target_lang.clone(),
        }
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunReport {
    pub artifact: ArtifactMeta,
    /// Blocks found in the capture.
    pub blocks_found: usize,
    /// Records processed (bounded by `process_limit`).
    pub records: usize,
    pub site_vs_community: usize,
    pub community_split: usize,
    pub fast_explanations: usize,
    pub detailed_explanations: usize,
    pub explanation_failures: usize,
    pub translation_failures: usize,
    /// Intermediate writes before the final one.
    pub checkpoints: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn disputed(&self) -> usize {
        self.site_vs_community + self.community_split
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each record is enriched.
    fn record_enriched(&self, id: u32, current: usize, total: usize);
    /// Called after each intermediate write.
    fn checkpoint(&self, written: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn record_enriched(&self, _id: u32, _current: usize, _total: usize) {}
    fn checkpoint(&self, _written: usize, _total: usize) {}
    fn done(&self, _report: &RunReport) {}
}

/// Run the full `build` pipeline.
///
/// 1. Read and split the capture
/// 2. Extract, classify and sanitize each block (up to `process_limit`)
/// 3. Enrich records one at a time, checkpointing the document
/// 4. Sort and write the final document
///
/// Only reading the capture and writing the document can fail the run.
#[instrument(skip_all, fields(capture = %config.capture_path.display(), mode = %config.app.run.mode))]
pub async fn run_study_kit<T: Translator, E: Explainer, P: Pacer>(
    config: &BuildConfig,
    translator: &T,
    explainer: &E,
    pacer: &P,
    progress: &dyn ProgressReporter,
) -> Result<RunReport> {
    let start = Instant::now();
    let started_at = Utc::now();
    let render_opts = config.render_options();
    let enrichment = EnrichmentConfig::from_app(&config.app);

    // --- Phase 1: Read capture ---
    progress.phase("Reading capture");
    let capture = std::fs::read_to_string(&config.capture_path)
        .map_err(|e| StudyKitError::io(&config.capture_path, e))?;
    let blocks = split_blocks(&capture);
    if blocks.is_empty() {
        warn!("capture contains no question cards");
    }

    // --- Phase 2: Extract ---
    progress.phase("Extracting questions");
    let limit = config.app.run.process_limit.unwrap_or(usize::MAX);
    if blocks.len() > limit {
        info!(limit, found = blocks.len(), "process limit reached, remaining blocks skipped");
    }
    let mut records: Vec<QuestionRecord> = blocks
        .iter()
        .take(limit)
        .map(|b| build_record(b, config.app.run.plurality))
        .collect();

    let site_vs_community = count_tier(&records, DisputeTier::SiteVsCommunity);
    let community_split = count_tier(&records, DisputeTier::CommunitySplit);
    info!(
        records = records.len(),
        site_vs_community, community_split, "extraction complete"
    );

    // --- Phase 3: Enrich ---
    progress.phase("Translating and explaining");
    let total = records.len();
    let mut fast_explanations = 0;
    let mut detailed_explanations = 0;
    let mut explanation_failures = 0;
    let mut translation_failures = 0;
    let mut checkpoints = 0;

    for i in 0..total {
        let summary = enrich_record(&mut records[i], translator, explainer, pacer, &enrichment).await;
        match summary.tier {
            ExplanationTier::Fast => fast_explanations += 1,
            ExplanationTier::Detailed => detailed_explanations += 1,
            ExplanationTier::None => {}
        }
        explanation_failures += usize::from(summary.explanation_failed);
        translation_failures += usize::from(summary.translation_failed);
        progress.record_enriched(records[i].id, i + 1, total);

        let done = i + 1;
        let every = config.app.run.checkpoint_every;
        if every > 0 && done % every == 0 && done < total {
            // The final write decides the run's result.
            match write_artifact(&config.output_path, &render_document(&render_opts, &records)) {
                Ok(_) => {
                    checkpoints += 1;
                    progress.checkpoint(done, total);
                }
                Err(e) => warn!(done, total, error = %e, "checkpoint write failed"),
            }
        }
    }

    // --- Phase 4: Final document ---
    progress.phase("Writing study document");
    sort_records(&mut records);
    let artifact = write_artifact(&config.output_path, &render_document(&render_opts, &records))?;

    let report = RunReport {
        artifact,
        blocks_found: blocks.len(),
        records: total,
        site_vs_community,
        community_split,
        fast_explanations,
        detailed_explanations,
        explanation_failures,
        translation_failures,
        checkpoints,
        started_at,
        finished_at: Utc::now(),
        elapsed: start.elapsed(),
    };

    info!(
        records = report.records,
        disputed = report.disputed(),
        explanation_failures,
        translation_failures,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "build complete"
    );

    progress.done(&report);
    Ok(report)
}

fn count_tier(records: &[QuestionRecord], tier: DisputeTier) -> usize {
    records.iter().filter(|r| r.dispute_tier() == tier).count()
}
