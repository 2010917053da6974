//! Splitting a capture document into per-question raw blocks.

use std::sync::LazyLock;

use scraper::{Html, Selector};
use tracing::debug;

static CARD_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.question-card").expect("valid selector"));

/// One question's unprocessed captured markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    /// 1-based position in the capture document. Used for logging only.
    pub ordinal: usize,
    /// Outer HTML of the question card.
    pub html: String,
}

/// Split a capture document into raw blocks, one per `div.question-card`,
/// in document order.
pub fn split_blocks(capture_html: &str) -> Vec<RawBlock> {
    let doc = Html::parse_document(capture_html);

    let blocks: Vec<RawBlock> = doc
        .select(&CARD_SEL)
        // A card nested in another card belongs to its parent's block.
        .filter(|card| {
            !card
                .ancestors()
                .filter_map(scraper::ElementRef::wrap)
                .any(|a| a.value().classes().any(|c| c == "question-card"))
        })
        .enumerate()
        .map(|(i, card)| RawBlock {
            ordinal: i + 1,
            html: card.html(),
        })
        .collect();

    debug!(blocks = blocks.len(), "capture split into blocks");
    blocks
}
