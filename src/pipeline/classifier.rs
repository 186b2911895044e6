//! Binary gate deciding whether a message is a vendor's reply to a quote
//! request.
//!
//! A message qualifies when it carries quote vocabulary AND either a
//! reply/forward marker in the subject or an attachment mention. Quote
//! vocabulary alone matches too much vendor marketing.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

/// `re:`, `fw:` or `fwd:` as a standalone token.
static REPLY_MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\b(?:re|fwd?):").unwrap());

const ATTACHMENT_WORDS: &[&str] = &["adjunto", "adjunta", "attached", "attachment", "pdf", "documento"];

const QUOTE_WORDS: &[&str] = &[
    "presupuesto",
    "cotización",
    "cotizacion",
    "precio",
    "tarifa",
    "coste",
    "oferta",
    "propuesta",
    "quote",
    "budget",
    "estimate",
    "price",
];

/// The three signals the classifier combines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QuoteSignals {
    pub reply_marker: bool,
    pub attachment_mention: bool,
    pub quote_vocabulary: bool,
}

impl QuoteSignals {
    pub fn analyze(subject: &str, body: &str) -> Self {
        let subject = subject.to_lowercase();
        let body = body.to_lowercase();
        let either = |words: &[&str]| words.iter().any(|w| subject.contains(w) || body.contains(w));

        Self {
            reply_marker: REPLY_MARKER.is_match(&subject),
            attachment_mention: either(ATTACHMENT_WORDS),
            quote_vocabulary: either(QUOTE_WORDS),
        }
    }

    pub fn is_quote_response(&self) -> bool {
        (self.reply_marker || self.attachment_mention) && self.quote_vocabulary
    }
}

/// True when `(subject, body)` looks like a reply to a quote request.
pub fn is_quote_response(subject: &str, body: &str) -> bool {
    let signals = QuoteSignals::analyze(subject, body);
    let verdict = signals.is_quote_response();
    debug!(
        reply = signals.reply_marker,
        attachment = signals.attachment_mention,
        vocabulary = signals.quote_vocabulary,
        verdict,
        "Classified message"
    );
    verdict
}
