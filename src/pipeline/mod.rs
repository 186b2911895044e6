//! Inbound quote-reply pipeline.
//!
//! Every vendor reply flows through:
//! 1. `classifier::is_quote_response`: binary gate, no I/O
//! 2. `Matcher::find_matching_request`: registered, internet, cross-vendor
//! 3. `Extractor::analyze`: model call with regex fallback
//! 4. `InsightApplier::apply`: budgets, tasks and meetings
//!
//! `QuoteResponseProcessor` wires the four stages together.

pub mod applier;
pub mod classifier;
pub mod extractor;
pub mod fallback;
pub mod mail;
pub mod matcher;
pub mod processor;
pub mod types;

pub use applier::InsightApplier;
pub use classifier::{QuoteSignals, is_quote_response};
pub use extractor::{ExtractionInput, Extractor};
pub use mail::parse_raw_mail;
pub use matcher::{MatchQuery, MatchStrategy, Matcher};
pub use processor::{AttachmentTextSource, QuoteResponseProcessor};
pub use types::*;
