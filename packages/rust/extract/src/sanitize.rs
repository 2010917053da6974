//! Content sanitizer for question bodies.
//!
//! Each pass detaches matching nodes from the fragment tree, so removed
//! content can reach neither the bilingual view nor the explanation prompt.
//! Passes run in a fixed order; later passes see the output of earlier ones.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

/// Literal capture artifact removed by the final pass.
pub const MOST_VOTED: &str = "Most Voted";

// ---------------------------------------------------------------------------
// Selectors, one per pass
// ---------------------------------------------------------------------------

/// Pass 1: executable, style and interactive elements.
static STRUCTURAL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script, style, button, form").expect("valid selector"));

/// Pass 2: answer-reveal, vote-tally and vote-bar UI.
static VOTING_UI_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        ".question-answer, .reveal-solution, .hide-solution, .voting-summary, \
         .voted-answers-tally, .vote-bar, .vote-distribution-bar",
    )
    .expect("valid selector")
});

/// Pass 3: "most voted" badges.
static BADGE_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".most-voted-answer-badge, .badge").expect("valid selector")
});

/// Sanitized body in both output forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    /// Cleaned markup, still holding the stem and choices.
    pub html: String,
    /// Trimmed text nodes joined by newlines.
    pub text: String,
}

/// Run all passes over a body fragment.
pub fn sanitize(body_html: &str) -> Sanitized {
    let mut doc = Html::parse_fragment(body_html);

    let structural = detach_matching(&mut doc, &STRUCTURAL_SEL);
    let voting_ui = detach_matching(&mut doc, &VOTING_UI_SEL);
    let badges = detach_matching(&mut doc, &BADGE_SEL);
    let noise_text = detach_text_containing(&mut doc, MOST_VOTED);

    debug!(structural, voting_ui, badges, noise_text, "body sanitized");

    // Detaching leaves neighbouring text nodes split; re-parse so the text
    // matches what the cleaned markup reads as.
    let html = doc.root_element().inner_html();
    let text = plain_text(Html::parse_fragment(&html).root_element());
    Sanitized { html, text }
}

/// Newline-joined, trimmed, non-empty text nodes under `el`.
pub(crate) fn plain_text(el: ElementRef) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Detach every element matching `sel`. Returns how many matched.
fn detach_matching(doc: &mut Html, sel: &Selector) -> usize {
    let ids: Vec<_> = doc.select(sel).map(|el| el.id()).collect();
    for id in &ids {
        if let Some(mut node) = doc.tree.get_mut(*id) {
            node.detach();
        }
    }
    ids.len()
}

/// Detach every attached text node containing `needle`.
fn detach_text_containing(doc: &mut Html, needle: &str) -> usize {
    let ids: Vec<_> = doc
        .root_element()
        .descendants()
        .filter(|n| n.value().as_text().is_some_and(|t| t.contains(needle)))
        .map(|n| n.id())
        .collect();
    for id in &ids {
        if let Some(mut node) = doc.tree.get_mut(*id) {
            node.detach();
        }
    }
    ids.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"<div class="discussion-header-container">
        <p class="card-text">Which table stores cases?</p>
        <ul>
            <li class="multi-choice-item"><span class="multi-choice-letter">A.</span> csm_case <span class="badge most-voted-answer-badge">Most Voted</span></li>
            <li class="multi-choice-item"><span class="multi-choice-letter">B.</span> task</li>
        </ul>
        <p class="card-text question-answer">Suggested Answer: A</p>
        <div class="voting-summary"><div class="vote-bar">A (90%)</div></div>
        <script>track()</script>
        <style>.x{}</style>
        <form><input name="q"></form>
        <button class="btn">Reveal Solution</button>
        <span>Most Voted leftover</span>
    </div>"#;

    #[test]
    fn removes_every_noise_class() {
        let s = sanitize(BODY);
        for gone in ["track()", ".x{}", "<form", "Reveal Solution", "Suggested Answer", "A (90%)", "Most Voted"] {
            assert!(!s.html.contains(gone), "html still contains {gone:?}");
            assert!(!s.text.contains(gone), "text still contains {gone:?}");
        }
    }

    #[test]
    fn keeps_stem_and_choices() {
        let s = sanitize(BODY);
        assert!(s.html.contains("Which table stores cases?"));
        assert!(s.html.contains("multi-choice-item"));
        assert!(s.text.contains("csm_case"));
        assert!(s.text.contains("task"));
    }

    #[test]
    fn plain_text_is_line_per_text_node() {
        let s = sanitize(r#"<p>Stem  </p><ul><li><span>A.</span> one</li></ul>"#);
        assert_eq!(s.text, "Stem\nA.\none");
    }

    #[test]
    fn sanitizing_twice_is_a_no_op() {
        let once = sanitize(BODY);
        let twice = sanitize(&once.html);
        assert_eq!(once, twice);
    }

    #[test]
    fn inline_removal_keeps_the_sentence_on_one_line() {
        let once = sanitize(
            r#"<p class="card-text">Which table<span class="badge">Most Voted</span> stores cases?</p>"#,
        );
        assert_eq!(once.text, "Which table stores cases?");

        let twice = sanitize(&once.html);
        assert_eq!(once, twice);
    }

    #[test]
    fn inline_button_removal_is_idempotent() {
        let once = sanitize(r#"<li>B. csm_case<button>Reveal</button> table</li>"#);
        assert_eq!(once.text, "B. csm_case table");
        assert_eq!(sanitize(&once.html), once);
    }

    #[test]
    fn clean_input_passes_through() {
        let s = sanitize(r#"<p class="card-text">Nothing to remove</p>"#);
        assert_eq!(s.html, r#"<p class="card-text">Nothing to remove</p>"#);
        assert_eq!(s.text, "Nothing to remove");
    }

    #[test]
    fn loose_most_voted_text_is_removed_without_its_parent() {
        let s = sanitize(r#"<li>B. csm_case<em>Most Voted</em></li>"#);
        assert!(s.html.contains("csm_case"));
        assert!(s.html.contains("<em></em>"));
        assert!(!s.text.contains("Most Voted"));
    }
}
