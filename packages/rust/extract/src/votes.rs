//! Vote & dispute classifier.
//!
//! Reads the community vote bars of a block, drops hidden (superseded) bars,
//! and derives the community answer and dispute tier.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::warn;

use studykit_shared::{DisputeTier, NO_ANSWER, PluralityRule, VoteEntry};

static VOTE_BAR_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".vote-bar").expect("valid selector"));

static VOTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z]+)\s*\((\d{1,3})%\)").expect("valid regex")
});

/// Text of one vote bar as captured, plus its visibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteFragment {
    pub text: String,
    pub hidden: bool,
}

/// Community answer and dispute tier derived from a block's votes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub votes: Vec<VoteEntry>,
    pub community_answer: String,
    pub tier: DisputeTier,
}

/// Collect every `.vote-bar` in the block, in document order.
pub(crate) fn vote_fragments(doc: &Html) -> Vec<VoteFragment> {
    doc.select(&VOTE_BAR_SEL)
        .map(|bar| VoteFragment {
            text: bar.text().collect::<String>().trim().to_string(),
            hidden: is_hidden(&bar),
        })
        .collect()
}

/// A bar is hidden if the bar itself is flagged "do not display".
/// Collapsed containers (answer panels) do not hide the bars inside them.
fn is_hidden(el: &ElementRef) -> bool {
    let v = el.value();
    v.attr("hidden").is_some()
        || v.classes().any(|c| c == "d-none" || c == "hidden")
        || v.attr("style").is_some_and(|s| {
            s.chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_ascii_lowercase()
                .contains("display:none")
        })
}

/// Parse visible fragments into vote entries. Non-matching text is capture noise.
pub fn parse_votes(fragments: &[VoteFragment]) -> Vec<VoteEntry> {
    fragments
        .iter()
        .filter(|f| !f.hidden)
        .filter_map(|f| {
            let caps = VOTE_RE.captures(&f.text)?;
            let percentage: u8 = caps[2].parse().ok().filter(|p| *p <= 100)?;
            Some(VoteEntry::new(caps[1].to_ascii_uppercase(), percentage))
        })
        .collect()
}

/// Pick the community answer from the vote distribution.
pub fn community_answer(votes: &[VoteEntry], rule: PluralityRule) -> String {
    let Some(first) = votes.first() else {
        return NO_ANSWER.to_string();
    };

    // max_by_key keeps the last maximum; fold keeps the earliest.
    let highest = votes
        .iter()
        .fold(first, |best, v| if v.percentage > best.percentage { v } else { best });

    match rule {
        PluralityRule::FirstListed => {
            if highest.percentage > first.percentage {
                warn!(
                    first = %first.letters,
                    first_pct = first.percentage,
                    highest = %highest.letters,
                    highest_pct = highest.percentage,
                    "first-listed vote is not the highest share"
                );
            }
            first.letters.clone()
        }
        PluralityRule::HighestShare => highest.letters.clone(),
    }
}

/// Dispute tier under the default plurality rule. Pure in its two inputs.
pub fn dispute_tier(suggested: &str, votes: &[VoteEntry]) -> DisputeTier {
    let community = community_answer(votes, PluralityRule::FirstListed);
    DisputeTier::classify(suggested, &community, votes)
}

/// Classify a block's vote fragments against the vendor answer.
pub fn classify(suggested: &str, fragments: &[VoteFragment], rule: PluralityRule) -> Classification {
    let votes = parse_votes(fragments);
    let community_answer = community_answer(&votes, rule);
    let tier = DisputeTier::classify(suggested, &community_answer, &votes);
    Classification {
        votes,
        community_answer,
        tier,
    }
}
