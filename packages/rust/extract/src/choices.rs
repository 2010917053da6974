//! Stem and choice queries over a sanitized body, used as translation input.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

/// Letter shown when a choice carries no letter marker.
pub const FALLBACK_LETTER: &str = "●";

static STEM_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p.card-text").expect("valid selector"));
static ANY_P_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p").expect("valid selector"));
static CHOICE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("li.multi-choice-item").expect("valid selector"));
static LETTER_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".multi-choice-letter").expect("valid selector"));

/// One answer choice split into its marker and body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub letter: String,
    /// Classes of the `<li>`, space-joined.
    pub classes: String,
    /// Choice text without the letter. May be empty.
    pub body: String,
}

/// The translatable parts of a question body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestionParts {
    pub stem: Option<String>,
    pub choices: Vec<Choice>,
}

impl QuestionParts {
    pub fn is_empty(&self) -> bool {
        self.stem.is_none() && self.choices.is_empty()
    }
}

/// Locate the stem paragraph and the choice list items.
pub fn question_parts(body_html: &str) -> QuestionParts {
    let doc = Html::parse_fragment(body_html);

    let stem = doc
        .select(&STEM_SEL)
        .next()
        .or_else(|| doc.select(&ANY_P_SEL).next())
        .map(spaced_text)
        .filter(|t| !t.is_empty());

    let choices = doc
        .select(&CHOICE_SEL)
        .map(|li| {
            let letter = li
                .select(&LETTER_SEL)
                .next()
                .map(|s| s.text().collect::<String>().trim().to_string())
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| FALLBACK_LETTER.to_string());
            let full = spaced_text(li);
            let body = full.replacen(&letter, "", 1).trim().to_string();
            Choice {
                letter,
                classes: li
                    .value()
                    .attr("class")
                    .unwrap_or_default()
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" "),
                body,
            }
        })
        .collect();

    QuestionParts { stem, choices }
}

/// Trimmed text nodes joined by single spaces.
fn spaced_text(el: ElementRef) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
