//! Core domain types for StudyKit question records.

use serde::{Deserialize, Serialize};

/// Sentinel id for a block whose "Question N" heading could not be found.
/// Sorts after every real question.
pub const MISSING_ID: u32 = 9999;

/// Marker for an absent answer (vendor or community).
pub const NO_ANSWER: &str = "-";

/// A multi-entry vote whose plurality share is below this is a community split.
pub const SPLIT_MAJORITY_PCT: u8 = 60;

// ---------------------------------------------------------------------------
// Run settings
// ---------------------------------------------------------------------------

/// Which records get an AI explanation in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Every record; tier follows the dispute classification.
    All,
    /// Only disputed records, always at the detailed tier.
    #[default]
    DisputedOnly,
    /// Translation only.
    None,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::DisputedOnly => "disputed_only",
            Self::None => "none",
        }
    }

    /// Whether this mode can ever call the explanation service.
    pub fn uses_explanations(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "all" => Ok(Self::All),
            "disputed_only" | "split_only" => Ok(Self::DisputedOnly),
            "none" => Ok(Self::None),
            other => Err(format!(
                "unknown run mode '{other}' (expected all, disputed_only or none)"
            )),
        }
    }
}

/// How the community answer is picked from the vote distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluralityRule {
    /// The first visible vote bar, trusting the capture's ordering.
    #[default]
    FirstListed,
    /// The entry with the largest percentage; earliest wins ties.
    HighestShare,
}

// ---------------------------------------------------------------------------
// Votes and dispute classification
// ---------------------------------------------------------------------------

/// One community vote bar: `B (55%)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteEntry {
    /// Choice letters, upper-cased (e.g. `"AC"`).
    pub letters: String,
    /// Share of the vote, 0–100.
    pub percentage: u8,
}

impl VoteEntry {
    pub fn new(letters: impl Into<String>, percentage: u8) -> Self {
        Self {
            letters: letters.into(),
            percentage,
        }
    }
}

/// How strongly the vendor answer and the community vote disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeTier {
    None,
    /// The community vote is split but its plurality agrees with the vendor.
    CommunitySplit,
    /// The community plurality differs from the vendor answer.
    SiteVsCommunity,
}

impl DisputeTier {
    /// Classify from the vendor answer, the community answer and the visible votes.
    ///
    /// `SiteVsCommunity` wins over `CommunitySplit` when both apply. A split needs
    /// more than one entry and a plurality share under [`SPLIT_MAJORITY_PCT`].
    pub fn classify(suggested: &str, community: &str, votes: &[VoteEntry]) -> Self {
        if community != NO_ANSWER && community != suggested {
            Self::SiteVsCommunity
        } else if votes.len() > 1 && plurality_share(community, votes) < SPLIT_MAJORITY_PCT {
            Self::CommunitySplit
        } else {
            Self::None
        }
    }

    pub fn is_disputed(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Share of the first entry voting for `community`, 0 when absent.
fn plurality_share(community: &str, votes: &[VoteEntry]) -> u8 {
    votes
        .iter()
        .find(|v| v.letters == community)
        .map_or(0, |v| v.percentage)
}

// ---------------------------------------------------------------------------
// Enrichment results
// ---------------------------------------------------------------------------

/// Explanation quality/cost level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplanationTier {
    /// Not requested for this record.
    None,
    Fast,
    Detailed,
}

impl ExplanationTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Fast => "fast",
            Self::Detailed => "detailed",
        }
    }
}

/// AI explanation attached to a record. Always present after enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explanation {
    pub tier: ExplanationTier,
    /// Service response, an error marker, or the not-requested placeholder.
    pub text: String,
}

/// A translated answer choice. The letter is carried over, never translated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatedChoice {
    pub letter: String,
    /// CSS classes of the source `<li>`, preserved for styling.
    pub classes: String,
    /// Translated body; empty when the source body was empty.
    pub text: String,
}

/// Translated stem and choices of one question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Translation {
    pub stem: Option<String>,
    pub choices: Vec<TranslatedChoice>,
}

/// Result of translating one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TranslationOutcome {
    Translated(Translation),
    Failed { detail: String },
}

// ---------------------------------------------------------------------------
// QuestionRecord
// ---------------------------------------------------------------------------

/// One exam question, from extraction through rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRecord {
    /// Question ordinal, or [`MISSING_ID`].
    pub id: u32,
    /// Discussion page the block was captured from (`"#"` when unknown).
    pub source_url: String,
    /// Vendor answer letters, or [`NO_ANSWER`].
    pub suggested_answer: String,
    /// Visible vote bars in display order.
    pub votes: Vec<VoteEntry>,
    /// Plurality choice chosen by the classifier, or [`NO_ANSWER`].
    pub community_answer: String,
    /// Sanitized stem + choices markup (or an error placeholder).
    pub body_html: String,
    /// Sanitized body as plain text; explanation prompt input.
    pub plain_text: String,
    /// `None` when there was no body to translate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<TranslationOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<Explanation>,
}

impl QuestionRecord {
    /// Derived dispute classification; never stored.
    pub fn dispute_tier(&self) -> DisputeTier {
        DisputeTier::classify(&self.suggested_answer, &self.community_answer, &self.votes)
    }
}

/// Stable sort by id; equal ids keep encounter order.
pub fn sort_records(records: &mut [QuestionRecord]) {
    records.sort_by_key(|r| r.id);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u32, suggested: &str, community: &str, votes: Vec<VoteEntry>) -> QuestionRecord {
        QuestionRecord {
            id,
            source_url: format!("https://example.com/q/{id}"),
            suggested_answer: suggested.into(),
            votes,
            community_answer: community.into(),
            body_html: String::new(),
            plain_text: String::new(),
            translation: None,
            explanation: None,
        }
    }

    #[test]
    fn tier_site_vs_community_takes_precedence() {
        let votes = vec![VoteEntry::new("B", 50), VoteEntry::new("A", 50)];
        let tier = DisputeTier::classify("A", "B", &votes);
        assert_eq!(tier, DisputeTier::SiteVsCommunity);
    }

    #[test]
    fn tier_split_when_plurality_agrees_narrowly() {
        let votes = vec![VoteEntry::new("C", 50), VoteEntry::new("D", 50)];
        assert_eq!(DisputeTier::classify("C", "C", &votes), DisputeTier::CommunitySplit);
    }

    #[test]
    fn tier_none_for_clear_majority() {
        let votes = vec![VoteEntry::new("A", 70), VoteEntry::new("B", 30)];
        assert_eq!(DisputeTier::classify("A", "A", &votes), DisputeTier::None);
    }

    #[test]
    fn tier_none_for_single_entry() {
        let votes = vec![VoteEntry::new("A", 40)];
        assert_eq!(DisputeTier::classify("A", "A", &votes), DisputeTier::None);
    }

    #[test]
    fn tier_none_without_votes() {
        let r = record(1, "A", NO_ANSWER, vec![]);
        assert_eq!(r.dispute_tier(), DisputeTier::None);
        assert!(!r.dispute_tier().is_disputed());
    }

    #[test]
    fn tier_none_when_vendor_missing_and_no_votes() {
        assert_eq!(DisputeTier::classify(NO_ANSWER, NO_ANSWER, &[]), DisputeTier::None);
    }

    #[test]
    fn run_mode_parses_aliases() {
        assert_eq!("all".parse::<RunMode>().unwrap(), RunMode::All);
        assert_eq!("disputed-only".parse::<RunMode>().unwrap(), RunMode::DisputedOnly);
        assert_eq!("SPLIT_ONLY".parse::<RunMode>().unwrap(), RunMode::DisputedOnly);
        assert_eq!("none".parse::<RunMode>().unwrap(), RunMode::None);
        assert!("sometimes".parse::<RunMode>().is_err());
    }

    #[test]
    fn sort_keeps_missing_ids_last_in_encounter_order() {
        let mut records = vec![
            record(MISSING_ID, "A", NO_ANSWER, vec![]),
            record(12, "A", NO_ANSWER, vec![]),
            record(MISSING_ID, "B", NO_ANSWER, vec![]),
            record(3, "A", NO_ANSWER, vec![]),
        ];
        sort_records(&mut records);

        let ids: Vec<u32> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 12, MISSING_ID, MISSING_ID]);
        assert_eq!(records[2].suggested_answer, "A");
        assert_eq!(records[3].suggested_answer, "B");
    }

    #[test]
    fn translation_outcome_serialization() {
        let failed = TranslationOutcome::Failed {
            detail: "HTTP 503".into(),
        };
        let json = serde_json::to_string(&failed).expect("serialize");
        assert!(json.contains(r#""status":"failed""#));

        let parsed: TranslationOutcome = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, failed);
    }
}
