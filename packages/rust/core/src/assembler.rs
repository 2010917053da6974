//! Document assembler: renders enriched records into one self-contained
//! bilingual HTML study document and writes it atomically.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{info, instrument};

use studykit_extract::escape_html;
use studykit_shared::{
    DisputeTier, Explanation, ExplanationTier, QuestionRecord, Result, StudyKitError,
    TranslationOutcome, VoteEntry,
};

use crate::enrichment::NOT_SELECTED_TEXT;

const STYLE: &str = r#"body{font-family:"Segoe UI","Hiragino Sans",sans-serif;background:#f0f2f5;padding:20px;color:#333}
h1{text-align:center}.summary{text-align:center;color:#666;margin-bottom:30px}
.question-card{background:#fff;max-width:850px;margin:0 auto 30px;padding:25px;border-radius:10px;box-shadow:0 2px 8px rgba(0,0,0,.1)}
.question-card.pending{opacity:.6}
.q-header{display:flex;justify-content:space-between;border-bottom:2px solid #eee;padding-bottom:15px;margin-bottom:15px}
.q-title{font-weight:bold;color:#0056b3}
.badge-conflict{color:#d9534f;background:#fce8e6;padding:2px 8px;border-radius:4px;font-size:.9em;margin-left:10px;font-weight:bold}
.badge-split{color:#8a6d3b;background:#fcf8e3;padding:2px 8px;border-radius:4px;font-size:.9em;margin-left:10px;font-weight:bold}
.pending-tag{color:#999;margin-left:10px;font-size:.9em}
.btn-group{display:flex;gap:10px}
.toggle-btn{border:1px solid #ccc;background:#fff;padding:5px 15px;border-radius:20px;cursor:pointer}
.answer-btn{background:#e3f2fd;color:#1565c0;font-weight:bold}
.tr-choices li{padding:8px;margin-bottom:5px;background:#f8f9fa;border-radius:5px;list-style:none}
.tr-letter{font-weight:bold;color:#0056b3;margin-right:10px}
.tr-failed,.tr-empty{color:#999;font-style:italic}
.answer-section{margin-top:20px;padding-top:15px;border-top:1px solid #eee;display:flex;gap:15px;flex-wrap:wrap}
.ans-box{background:#f8f9fa;padding:10px;border:1px solid #ddd;border-radius:5px;text-align:center;min-width:80px}
.community-box{background:#e6f9ed;border-color:#c3e6cb;border-left:4px solid #28a745}
.vote-detail{display:block;font-size:.8em;color:#666}
.ai-box{background:#f3e5f5;border-color:#e1bee7;border-left:4px solid #8e44ad;text-align:left;flex:1;min-width:250px}
.ans-label{display:block;font-size:.8em;color:#666}
.ans-value{font-weight:bold;font-size:1.2em}
.ans-value-sm{font-size:.95em;line-height:1.4}
.ai-muted{color:#999;font-size:.9em}
.ref-link{margin-left:auto;align-self:center;text-decoration:none;color:#007bff}"#;

const SCRIPT: &str = r#"function toggleLang(n){var t=document.getElementById('tr-area-'+n),o=document.getElementById('orig-area-'+n);if(t.style.display==='none'){t.style.display='block';o.style.display='none'}else{t.style.display='none';o.style.display='block'}}
function toggleAns(n,b){var a=document.getElementById('ans-area-'+n);if(a.style.display==='none'){a.style.display='flex';b.innerText='Hide answer'}else{a.style.display='none';b.innerText='Show answer'}}"#;

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Document-level settings.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub title: String,
    /// `lang` attribute of the document (the translation target).
    pub lang: String,
}

/// Render the full document.
///
/// Records are ordered by id (stable), so the output depends only on the
/// record set and the options. Records without an explanation yet are
/// rendered as pending cards.
pub fn render_document(opts: &RenderOptions, records: &[QuestionRecord]) -> String {
    let mut ordered: Vec<&QuestionRecord> = records.iter().collect();
    ordered.sort_by_key(|r| r.id);

    let disputed = ordered.iter().filter(|r| r.dispute_tier().is_disputed()).count();

    let mut out = String::with_capacity(4096 + records.len() * 2048);
    let _ = write!(
        out,
        "<!DOCTYPE html>\n<html lang=\"{lang}\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n<style>\n{STYLE}\n</style>\n<script>\n{SCRIPT}\n</script>\n\
         </head>\n<body>\n<h1>{title}</h1>\n\
         <p class=\"summary\">{total} questions · {disputed} disputed</p>\n",
        lang = escape_html(&opts.lang),
        title = escape_html(&opts.title),
        total = ordered.len(),
    );

    for (n, record) in ordered.iter().enumerate() {
        if record.explanation.is_some() {
            out.push_str(&render_card(n, record));
        } else {
            out.push_str(&render_pending_card(n, record));
        }
    }

    out.push_str("</body>\n</html>\n");
    out
}

/// One enriched record. `n` is the card's position, used for element ids
/// because question ids are not unique (see `MISSING_ID`).
pub fn render_card(n: usize, record: &QuestionRecord) -> String {
    format!(
        r#"<div class="question-card" id="card-{n}" data-question="{id}">
<div class="q-header">
<div class="q-title-group"><span class="q-title">Question {id}</span>{badge}</div>
<div class="btn-group">
<button class="toggle-btn answer-btn" onclick="toggleAns({n}, this)">Show answer</button>
<button class="toggle-btn" onclick="toggleLang({n})">Translated / Original</button>
</div>
</div>
<div id="tr-area-{n}" class="q-content tr-area">{translated}</div>
<div id="orig-area-{n}" class="q-content orig-area" style="display:none;">{original}</div>
<div id="ans-area-{n}" class="answer-section" style="display:none;">
<div class="ans-box"><span class="ans-label">Site answer</span><span class="ans-value">{suggested}</span></div>
<div class="ans-box community-box"><span class="ans-label">Community</span><span class="ans-value">{community}</span>{votes}</div>
<div class="ans-box ai-box"><span class="ans-label">AI explanation</span><span class="ans-value-sm">{explanation}</span></div>
<a href="{url}" target="_blank" rel="noopener" class="ref-link">Discussion ↗</a>
</div>
</div>
"#,
        id = record.id,
        badge = dispute_badge(record.dispute_tier()),
        translated = render_translation(record.translation.as_ref()),
        original = record.body_html,
        suggested = escape_html(&record.suggested_answer),
        community = escape_html(&record.community_answer),
        votes = render_votes(&record.votes),
        explanation = render_explanation(record.explanation.as_ref()),
        url = escape_html(&record.source_url),
    )
}

/// Placeholder for a record whose enrichment has not run yet: original body only.
pub fn render_pending_card(n: usize, record: &QuestionRecord) -> String {
    format!(
        r#"<div class="question-card pending" id="card-{n}" data-question="{id}">
<div class="q-header">
<div class="q-title-group"><span class="q-title">Question {id}</span><span class="pending-tag">enrichment pending</span></div>
</div>
<div class="q-content orig-area">{original}</div>
</div>
"#,
        id = record.id,
        original = record.body_html,
    )
}

fn dispute_badge(tier: DisputeTier) -> &'static str {
    match tier {
        DisputeTier::SiteVsCommunity => {
            r#"<span class="badge-conflict" title="Community answer differs from the site answer">⚠️ Site vs community</span>"#
        }
        DisputeTier::CommunitySplit => {
            r#"<span class="badge-split" title="Community vote is split">Community split</span>"#
        }
        DisputeTier::None => "",
    }
}

fn render_votes(votes: &[VoteEntry]) -> String {
    if votes.is_empty() {
        return String::new();
    }
    let detail = votes
        .iter()
        .map(|v| format!("{} {}%", escape_html(&v.letters), v.percentage))
        .collect::<Vec<_>>()
        .join(" · ");
    format!(r#"<span class="vote-detail">{detail}</span>"#)
}

fn render_translation(outcome: Option<&TranslationOutcome>) -> String {
    let translation = match outcome {
        None => return r#"<p class="tr-empty">No data</p>"#.to_string(),
        Some(TranslationOutcome::Failed { detail }) => {
            return format!(
                r#"<p class="tr-failed" title="{}">Translation failed</p>"#,
                escape_html(detail)
            );
        }
        Some(TranslationOutcome::Translated(t)) => t,
    };

    let mut out = String::new();
    if let Some(stem) = &translation.stem {
        let _ = write!(out, r#"<p class="tr-text">{}</p>"#, escape_html(stem));
    }
    if !translation.choices.is_empty() {
        out.push_str(r#"<ul class="tr-choices">"#);
        for choice in &translation.choices {
            let _ = write!(
                out,
                r#"<li class="{}"><span class="tr-letter">{}</span> {}</li>"#,
                escape_html(&choice.classes),
                escape_html(&choice.letter),
                escape_html(&choice.text),
            );
        }
        out.push_str("</ul>");
    }
    if out.is_empty() {
        out.push_str(r#"<p class="tr-empty">No data</p>"#);
    }
    out
}

fn render_explanation(explanation: Option<&Explanation>) -> String {
    match explanation {
        Some(e) if e.tier != ExplanationTier::None => escape_html(&e.text).replace('\n', "<br>"),
        Some(e) => format!(r#"<span class="ai-muted">{}</span>"#, escape_html(&e.text)),
        None => format!(r#"<span class="ai-muted">{}</span>"#, escape_html(NOT_SELECTED_TEXT)),
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Metadata for a written artifact.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ArtifactMeta {
    pub path: PathBuf,
    pub sha256: String,
    pub size_bytes: usize,
}

/// Write `content` to `path` atomically (temp file in the same directory, then rename).
#[instrument(skip_all, fields(path = %path.display()))]
pub fn write_artifact(path: &Path, content: &str) -> Result<ArtifactMeta> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| StudyKitError::io(&dir, e))?;

    let filename = path
        .file_name()
        .ok_or_else(|| StudyKitError::validation(format!("output path has no file name: {}", path.display())))?
        .to_string_lossy();
    let temp = dir.join(format!(".{filename}.tmp"));

    std::fs::write(&temp, content).map_err(|e| StudyKitError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| StudyKitError::io(path, e))?;

    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let sha256 = format!("{:x}", hasher.finalize());

    info!(size = content.len(), %sha256, "artifact written");

    Ok(ArtifactMeta {
        path: path.to_path_buf(),
        sha256,
        size_bytes: content.len(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use studykit_shared::{MISSING_ID, NO_ANSWER, TranslatedChoice, Translation};

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sk-assembler-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn opts() -> RenderOptions {
        RenderOptions {
            title: "CIS-CSM Study Kit".into(),
            lang: "ja".into(),
        }
    }

    fn record(id: u32, suggested: &str, community: &str, votes: Vec<VoteEntry>) -> QuestionRecord {
        QuestionRecord {
            id,
            source_url: format!("https://example.com/d/{id}?a=1&b=2"),
            suggested_answer: suggested.into(),
            votes,
            community_answer: community.into(),
            body_html: format!(r#"<p class="card-text">Original question {id}</p>"#),
            plain_text: format!("Original question {id}"),
            translation: Some(TranslationOutcome::Translated(Translation {
                stem: Some(format!("翻訳された質問 {id}")),
                choices: vec![TranslatedChoice {
                    letter: "A.".into(),
                    classes: "multi-choice-item".into(),
                    text: "<script>x</script>".into(),
                }],
            })),
            explanation: Some(Explanation {
                tier: ExplanationTier::Detailed,
                text: "Answer: B\nReason: <b>csm_case</b>".into(),
            }),
        }
    }

    fn sample() -> Vec<QuestionRecord> {
        vec![
            record(MISSING_ID, NO_ANSWER, NO_ANSWER, vec![]),
            record(2, "C", "C", vec![VoteEntry::new("C", 50), VoteEntry::new("D", 50)]),
            record(1, "A", "B", vec![VoteEntry::new("B", 55), VoteEntry::new("A", 45)]),
            record(3, "A", "A", vec![VoteEntry::new("A", 70), VoteEntry::new("B", 30)]),
        ]
    }

    fn card_positions(html: &str, needles: &[&str]) -> Vec<usize> {
        needles
            .iter()
            .map(|n| html.find(n).unwrap_or_else(|| panic!("{n} not rendered")))
            .collect()
    }

    #[test]
    fn render_is_deterministic_and_order_independent() {
        let records = sample();
        let mut reversed = records.clone();
        reversed.reverse();

        let a = render_document(&opts(), &records);
        let b = render_document(&opts(), &records);
        let c = render_document(&opts(), &reversed);
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn cards_sorted_by_id_with_missing_last() {
        let html = render_document(&opts(), &sample());
        let pos = card_positions(
            &html,
            &[
                r#"data-question="1""#,
                r#"data-question="2""#,
                r#"data-question="3""#,
                r#"data-question="9999""#,
            ],
        );
        assert!(pos.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn badges_follow_dispute_tier() {
        let html = render_document(&opts(), &sample());
        assert_eq!(html.matches(r#"<span class="badge-conflict""#).count(), 1);
        assert_eq!(html.matches(r#"<span class="badge-split""#).count(), 1);
    }

    #[test]
    fn default_toggle_state_hides_original_and_answers() {
        let card = render_card(0, &sample()[1]);
        assert!(card.contains(r#"<div id="tr-area-0" class="q-content tr-area">"#));
        assert!(card.contains(r#"<div id="orig-area-0" class="q-content orig-area" style="display:none;">"#));
        assert!(card.contains(r#"<div id="ans-area-0" class="answer-section" style="display:none;">"#));
    }

    #[test]
    fn collaborator_text_is_escaped() {
        let card = render_card(0, &sample()[2]);
        assert!(card.contains("&lt;script&gt;x&lt;/script&gt;"));
        assert!(card.contains("Answer: B<br>Reason: &lt;b&gt;csm_case&lt;/b&gt;"));
        assert!(card.contains("https://example.com/d/1?a=1&amp;b=2"));
        assert!(card.contains("B 55% · A 45%"));
    }

    #[test]
    fn failed_and_missing_translations_render_markers() {
        let mut r = sample()[1].clone();
        r.translation = Some(TranslationOutcome::Failed {
            detail: "HTTP 503".into(),
        });
        assert!(render_card(0, &r).contains("Translation failed"));

        r.translation = None;
        assert!(render_card(0, &r).contains(r#"<p class="tr-empty">No data</p>"#));
    }

    #[test]
    fn unselected_explanation_is_muted() {
        let mut r = sample()[3].clone();
        r.explanation = Some(Explanation {
            tier: ExplanationTier::None,
            text: NOT_SELECTED_TEXT.into(),
        });
        assert!(render_card(0, &r).contains(r#"<span class="ai-muted">(No AI explanation for this question)</span>"#));
    }

    #[test]
    fn unenriched_records_render_as_pending() {
        let mut records = sample();
        records[0].explanation = None;
        let html = render_document(&opts(), &records);
        assert_eq!(html.matches("question-card pending").count(), 1);
        assert!(html.contains("enrichment pending"));
    }

    #[test]
    fn write_artifact_is_atomic_and_hashed() {
        let tmp = temp_dir();
        let path = tmp.join("out").join("study.html");
        let html = render_document(&opts(), &sample());

        let first = write_artifact(&path, &html).unwrap();
        let second = write_artifact(&path, &html).unwrap();

        assert_eq!(first.sha256, second.sha256);
        assert_eq!(first.size_bytes, html.len());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), html);
        assert!(!tmp.join("out").join(".study.html.tmp").exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
