//! Markup record extractor.
//!
//! A raw block is parsed once into an immutable fragment tree and each field
//! is read by its own query. A query that finds nothing degrades its field to
//! a sentinel; it never affects the other fields.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use studykit_shared::{MISSING_ID, NO_ANSWER};

use crate::blocks::RawBlock;
use crate::votes::{self, VoteFragment};

/// Minimum trimmed text length for a fallback body container.
pub const MIN_FALLBACK_BODY_CHARS: usize = 50;

/// `source_url` used when the block has no source link.
pub const UNKNOWN_SOURCE: &str = "#";

/// Primary body containers, most specific first.
static PRIMARY_BODY_SELS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [".question-body", ".q-text", ".discussion-header-container"]
        .iter()
        .map(|s| Selector::parse(s).expect("valid selector"))
        .collect()
});

static HEADER_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".q-header, .q-title, h1, h2, h3, h4, h5, h6").expect("valid selector")
});
static SOURCE_LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.source-link[href]").expect("valid selector"));
static FALLBACK_BODY_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div, .card-body").expect("valid selector"));

static QUESTION_NO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Question\s+(\d+)").expect("valid regex"));
static SUGGESTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Suggested Answer:\s*([A-Za-z]+)").expect("valid regex"));

/// Fields read from one raw block before classification and sanitizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedBlock {
    pub id: u32,
    pub source_url: String,
    pub suggested_answer: String,
    pub vote_fragments: Vec<VoteFragment>,
    /// Outer HTML of the body container, unsanitized. `None` if none was found.
    pub body_html: Option<String>,
}

/// A raw block as a queryable fragment tree.
pub struct QuestionBlock {
    doc: Html,
}

impl QuestionBlock {
    pub fn parse(html: &str) -> Self {
        Self {
            doc: Html::parse_fragment(html),
        }
    }

    /// "Question N" from the first heading-like element that carries one.
    pub fn question_id(&self) -> u32 {
        self.doc
            .select(&HEADER_SEL)
            .find_map(|h| {
                let text = h.text().collect::<String>();
                QUESTION_NO_RE
                    .captures(&text)
                    .and_then(|c| c[1].parse::<u32>().ok())
            })
            .unwrap_or(MISSING_ID)
    }

    /// Vendor answer letters from anywhere in the block's text, upper-cased.
    pub fn suggested_answer(&self) -> String {
        let full_text = self
            .doc
            .root_element()
            .text()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        SUGGESTED_RE
            .captures(&full_text)
            .map(|c| c[1].to_ascii_uppercase())
            .unwrap_or_else(|| NO_ANSWER.to_string())
    }

    pub fn source_url(&self) -> String {
        self.doc
            .select(&SOURCE_LINK_SEL)
            .filter_map(|a| a.value().attr("href"))
            .map(str::trim)
            .find(|href| !href.is_empty())
            .map_or_else(|| UNKNOWN_SOURCE.to_string(), str::to_string)
    }

    pub fn vote_fragments(&self) -> Vec<VoteFragment> {
        votes::vote_fragments(&self.doc)
    }

    /// The body container: a primary container if present, else the first
    /// sub-container with enough text. Tolerates markup drift between captures.
    pub fn body(&self) -> Option<ElementRef<'_>> {
        for sel in PRIMARY_BODY_SELS.iter() {
            if let Some(el) = self.doc.select(sel).next() {
                return Some(el);
            }
        }

        self.doc.select(&FALLBACK_BODY_SEL).find(|el| {
            let classes: Vec<&str> = el.value().classes().collect();
            !classes.contains(&"question-card")
                && !classes.contains(&"q-header")
                && el.text().collect::<String>().trim().chars().count() > MIN_FALLBACK_BODY_CHARS
        })
    }

    pub fn extract(&self) -> ExtractedBlock {
        ExtractedBlock {
            id: self.question_id(),
            source_url: self.source_url(),
            suggested_answer: self.suggested_answer(),
            vote_fragments: self.vote_fragments(),
            body_html: self.body().map(|el| el.html()),
        }
    }
}

/// Extract the fields of one raw block.
pub fn extract_block(block: &RawBlock) -> ExtractedBlock {
    QuestionBlock::parse(&block.html).extract()
}

/// Placeholder body for a block whose question text could not be located.
pub fn missing_body_placeholder(source_url: &str) -> String {
    format!(
        "<p class=\"error\">Question text could not be extracted (Link: {})</p>",
        crate::escape_html(source_url)
    )
}
