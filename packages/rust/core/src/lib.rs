//! Core pipeline orchestration for StudyKit.
//!
//! This crate ties together extraction, enrichment and document assembly
//! into end-to-end workflows (e.g., [`run_study_kit`]).

pub mod assembler;
pub mod enrichment;
pub mod pipeline;
pub mod scrub;

pub use assembler::{ArtifactMeta, RenderOptions, render_document, render_pending_card, write_artifact};
pub use enrichment::{EnrichmentConfig, Pacer, TokioPacer, enrich_record};
pub use pipeline::{BuildConfig, ProgressReporter, RunReport, SilentProgress, run_study_kit};
pub use scrub::{DEFAULT_SCRUB_PHRASES, scrub_artifact};
