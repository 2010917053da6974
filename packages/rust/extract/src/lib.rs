//! Capture parsing: raw blocks in, structured question records out.
//!
//! This crate provides:
//! - [`blocks`] — splitting a capture document into per-question raw blocks
//! - [`extractor`] — typed queries over one block (id, vendor answer, body, votes)
//! - [`votes`] — vote parsing, plurality choice and dispute classification
//! - [`sanitize`] — noise removal from the question body
//! - [`choices`] — stem/choice lookup used as translation input

pub mod blocks;
pub mod choices;
pub mod extractor;
pub mod sanitize;
pub mod votes;

use tracing::{debug, warn};

use studykit_shared::{PluralityRule, QuestionRecord};

pub use blocks::{RawBlock, split_blocks};
pub use choices::{Choice, QuestionParts, question_parts};
pub use extractor::{ExtractedBlock, QuestionBlock, extract_block, missing_body_placeholder};
pub use sanitize::{Sanitized, sanitize};
pub use votes::{Classification, VoteFragment, classify, community_answer, dispute_tier};

/// Extract, classify and sanitize one raw block into a record ready for enrichment.
///
/// Never fails: missing fields fall back to their sentinels.
pub fn build_record(block: &RawBlock, plurality: PluralityRule) -> QuestionRecord {
    let extracted = extract_block(block);
    let classification = classify(
        &extracted.suggested_answer,
        &extracted.vote_fragments,
        plurality,
    );

    let (body_html, plain_text) = match &extracted.body_html {
        Some(raw) => {
            let clean = sanitize(raw);
            (clean.html, clean.text)
        }
        None => {
            warn!(
                ordinal = block.ordinal,
                source_url = %extracted.source_url,
                "no question body found in block"
            );
            (missing_body_placeholder(&extracted.source_url), String::new())
        }
    };

    debug!(
        ordinal = block.ordinal,
        id = extracted.id,
        suggested = %extracted.suggested_answer,
        community = %classification.community_answer,
        tier = ?classification.tier,
        "block extracted"
    );

    QuestionRecord {
        id: extracted.id,
        source_url: extracted.source_url,
        suggested_answer: extracted.suggested_answer,
        votes: classification.votes,
        community_answer: classification.community_answer,
        body_html,
        plain_text,
        translation: None,
        explanation: None,
    }
}

/// Escape text for inclusion in HTML content or a quoted attribute.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use studykit_shared::{DisputeTier, MISSING_ID, NO_ANSWER};

    fn fixture_records(rule: PluralityRule) -> Vec<QuestionRecord> {
        let capture = std::fs::read_to_string("../../../fixtures/capture/sample_capture.html")
            .expect("read capture fixture");
        split_blocks(&capture)
            .iter()
            .map(|b| build_record(b, rule))
            .collect()
    }

    #[test]
    fn fixture_records_classify_as_expected() {
        let records = fixture_records(PluralityRule::FirstListed);

        // Question 3: A 70 / B 30, vendor A
        assert_eq!(records[0].id, 3);
        assert_eq!(records[0].community_answer, "A");
        assert_eq!(records[0].dispute_tier(), DisputeTier::None);

        // Question 1: hidden A (100%) skipped, B 55 / A 45, vendor A
        assert_eq!(records[1].id, 1);
        assert_eq!(records[1].votes.len(), 2);
        assert_eq!(records[1].community_answer, "B");
        assert_eq!(records[1].dispute_tier(), DisputeTier::SiteVsCommunity);

        // Question 2: C 50 / D 50, vendor C
        assert_eq!(records[4].id, 2);
        assert_eq!(records[4].dispute_tier(), DisputeTier::CommunitySplit);
    }

    #[test]
    fn fixture_bodies_are_sanitized() {
        let records = fixture_records(PluralityRule::FirstListed);
        let first = &records[0];
        assert!(first.body_html.contains("case assignment rules"));
        assert!(!first.body_html.contains("Most Voted"));
        assert!(!first.body_html.contains("vote-bar"));
        assert!(!first.body_html.contains("Reveal Solution"));
        assert!(!first.plain_text.contains("Suggested Answer"));
        assert!(first.plain_text.contains("sn_customerservice_manager"));
    }

    #[test]
    fn failed_capture_block_degrades_to_placeholder() {
        let records = fixture_records(PluralityRule::FirstListed);
        let failed = &records[3];
        assert_eq!(failed.id, MISSING_ID);
        assert_eq!(failed.suggested_answer, NO_ANSWER);
        assert_eq!(failed.community_answer, NO_ANSWER);
        assert!(failed.body_html.contains("class=\"error\""));
        assert!(failed.plain_text.is_empty());
    }

    #[test]
    fn headerless_block_keeps_its_body() {
        let records = fixture_records(PluralityRule::FirstListed);
        let headerless = &records[2];
        assert_eq!(headerless.id, MISSING_ID);
        assert_eq!(headerless.suggested_answer, "A");
        assert!(headerless.plain_text.contains("Assigned to my groups"));
    }

    #[test]
    fn escape_html_covers_markup_characters() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom's & Jerry's</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom&#39;s &amp; Jerry&#39;s&lt;/a&gt;"
        );
    }
}
