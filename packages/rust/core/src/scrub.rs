//! Post-hoc cleanup of an already written study document.
//!
//! Removes leftover vote-tally phrases (in the source language or translated)
//! from text nodes, leaving scripts and styles untouched.

use scraper::{Html, Node};
use tracing::{debug, info};

/// Phrases removed by default.
pub const DEFAULT_SCRUB_PHRASES: [&str; 4] =
    ["最も投票された", "Most Voted", "voted answers", "投票された回答"];

/// Remove every occurrence of `phrases` from the document's text nodes.
///
/// Returns the rewritten document and the number of text nodes changed.
/// Changed nodes are trimmed.
pub fn scrub_artifact<S: AsRef<str>>(html: &str, phrases: &[S]) -> (String, usize) {
    let mut doc = Html::parse_document(html);

    let edits: Vec<_> = doc
        .tree
        .nodes()
        .filter(|node| {
            !node
                .parent()
                .and_then(|p| p.value().as_element())
                .is_some_and(|el| matches!(el.name(), "script" | "style"))
        })
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let mut cleaned = text.to_string();
            for phrase in phrases {
                let phrase = phrase.as_ref();
                if !phrase.is_empty() && cleaned.contains(phrase) {
                    cleaned = cleaned.replace(phrase, "");
                }
            }
            (cleaned != **text).then(|| (node.id(), cleaned.trim().to_string()))
        })
        .collect();

    for (id, cleaned) in &edits {
        if let Some(mut node) = doc.tree.get_mut(*id) {
            if let Node::Text(text) = node.value() {
                debug!(after = %cleaned, "scrubbed text node");
                text.text = cleaned.as_str().into();
            }
        }
    }

    info!(changed = edits.len(), "scrub complete");
    (doc.html(), edits.len())
}
