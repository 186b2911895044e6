//! Regex price extraction used when the model is unavailable or its output
//! is unusable.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::pipeline::types::ExtractionResult;
use crate::quotes::Provenance;

/// Confidence reported when a price was found.
pub const PRICE_FOUND_CONFIDENCE: u8 = 70;

/// Confidence reported when no price was found.
pub const NO_PRICE_CONFIDENCE: u8 = 30;

/// Exclusive upper bound of a plausible quote.
const MAX_PLAUSIBLE_PRICE: Decimal = dec!(100000);

/// `2.500,50`, `2500`, `2500.5` or `2500,50`.
const NUM: &str = r"\d{1,3}(?:\.\d{3})+(?:,\d{1,2})?|\d+(?:[.,]\d{1,2})?";

const CURRENCY: &str = r"\s*(?:€|eur(?:os?)?\b)";

/// Patterns in priority order; the first plausible capture wins.
static PRICE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        format!(r"(?i)presupuesto\s+(?:total\s+)?es\s+(?:de\s+)?({NUM}){CURRENCY}"),
        format!(r"(?i)precio\s+total\s+es\s+(?:de\s+)?({NUM}){CURRENCY}"),
        format!(r"(?i)({NUM}){CURRENCY}"),
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static THOUSANDS_ONLY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{1,3}(?:\.\d{3})+$").unwrap());

/// Parse a European or plain-formatted amount.
///
/// `.` followed by exactly three digits is a thousands separator; `,` is a
/// decimal separator.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '€')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let normalized = if cleaned.contains(',') && cleaned.contains('.') {
        cleaned.replace('.', "").replace(',', ".")
    } else if THOUSANDS_ONLY.is_match(&cleaned) {
        cleaned.replace('.', "")
    } else {
        cleaned.replace(',', ".")
    };
    Decimal::from_str(&normalized).ok()
}

/// First plausible price in `text`, trying each pattern in order.
pub fn find_price(text: &str) -> Option<Decimal> {
    PRICE_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures_iter(text)
            .filter_map(|caps| caps.get(1).and_then(|m| parse_amount(m.as_str())))
            .find(|amount| *amount > Decimal::ZERO && *amount < MAX_PLAUSIBLE_PRICE)
    })
}

/// Heuristic extraction over the full text blob.
pub fn extract(text: &str) -> ExtractionResult {
    let total_price = find_price(text);
    let confidence = if total_price.is_some() {
        PRICE_FOUND_CONFIDENCE
    } else {
        NO_PRICE_CONFIDENCE
    };
    let mut result = ExtractionResult::empty(confidence, Provenance::Heuristic);
    result.total_price = total_price;
    result
}
