//! Shared types for the quote-response pipeline.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::quotes::{PriceItem, Provenance, QuoteRequest};

// ── Inbound mail ────────────────────────────────────────────────────

/// The parts of an inbound email the pipeline reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMail {
    /// Message store id.
    pub id: String,
    /// Sender address.
    pub sender: String,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    pub received_at: DateTime<Utc>,
    /// Text already extracted from attachments.
    #[serde(default)]
    pub attachments: Vec<AttachmentText>,
    /// Total attachments on the message, including unreadable ones.
    #[serde(default)]
    pub attachment_count: usize,
}

impl InboundMail {
    pub fn new(
        id: impl Into<String>,
        sender: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            sender: sender.into(),
            sender_name: None,
            subject: subject.into(),
            body: body.into(),
            received_at: Utc::now(),
            attachments: Vec::new(),
            attachment_count: 0,
        }
    }

    pub fn with_attachment(mut self, attachment: AttachmentText) -> Self {
        self.attachments.push(attachment);
        self.attachment_count += 1;
        self
    }
}

/// Text extracted from one attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentText {
    pub filename: String,
    #[serde(default)]
    pub mime: Option<String>,
    pub text: String,
}

// ── Matching ────────────────────────────────────────────────────────

/// Which search stage located a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    RegisteredVendor,
    InternetVendor,
    CrossVendorScan,
}

impl MatchSource {
    pub fn label(&self) -> &'static str {
        match self {
            Self::RegisteredVendor => "registered_supplier",
            Self::InternetVendor => "internet_supplier",
            Self::CrossVendorScan => "collection_group",
        }
    }
}

/// The outstanding request a message answers.
#[derive(Debug, Clone)]
pub struct MatchedRequest {
    pub request_id: String,
    pub vendor_id: Option<String>,
    pub request: QuoteRequest,
    pub source: MatchSource,
}

impl MatchedRequest {
    pub fn new(request: QuoteRequest, source: MatchSource) -> Self {
        Self {
            request_id: request.id.clone(),
            vendor_id: request.vendor_id.clone(),
            request,
            source,
        }
    }
}

// ── Extraction ──────────────────────────────────────────────────────

/// Structured price and terms pulled from a vendor reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub total_price: Option<Decimal>,
    pub price_breakdown: Vec<PriceItem>,
    pub services_included: Vec<String>,
    pub extras: Vec<String>,
    pub payment_terms: Option<String>,
    pub delivery_time: Option<String>,
    pub cancellation_policy: Option<String>,
    pub warranty: Option<String>,
    pub additional_notes: Option<String>,
    /// 0–100.
    pub confidence: u8,
    pub provenance: Provenance,
    pub analyzed_at: DateTime<Utc>,
}

impl ExtractionResult {
    /// An empty result with the given confidence and provenance.
    pub fn empty(confidence: u8, provenance: Provenance) -> Self {
        Self {
            total_price: None,
            price_breakdown: Vec::new(),
            services_included: Vec::new(),
            extras: Vec::new(),
            payment_terms: None,
            delivery_time: None,
            cancellation_policy: None,
            warranty: None,
            additional_notes: None,
            confidence,
            provenance,
            analyzed_at: Utc::now(),
        }
    }

    pub fn is_heuristic(&self) -> bool {
        self.provenance == Provenance::Heuristic
    }
}

// ── Insights ────────────────────────────────────────────────────────

/// Extracted items for the applier to act on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insights {
    #[serde(default)]
    pub budgets: Vec<BudgetInsight>,
    #[serde(default)]
    pub tasks: Vec<TaskInsight>,
    #[serde(default)]
    pub meetings: Vec<MeetingInsight>,
}

impl Insights {
    pub fn is_empty(&self) -> bool {
        self.budgets.is_empty() && self.tasks.is_empty() && self.meetings.is_empty()
    }
}

/// Budget-like data found in a message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetInsight {
    #[serde(default, alias = "concept", alias = "title")]
    pub description: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// Vendor/client name hint used for fuzzy vendor resolution.
    #[serde(default, alias = "vendor", alias = "supplier")]
    pub client: Option<String>,
}

/// An action item found in a message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInsight {
    pub title: String,
    #[serde(default)]
    pub notes: Option<String>,
    /// Free-form due date: string, epoch millis or a `{date, time}` object.
    #[serde(default, alias = "dueDate")]
    pub due: Option<serde_json::Value>,
}

/// A scheduling mention found in a message.
///
/// Extractors disagree on where the date goes, so every known field is kept
/// raw and resolved by the applier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingInsight {
    pub title: String,
    #[serde(default)]
    pub date: Option<serde_json::Value>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub when: Option<serde_json::Value>,
    #[serde(default)]
    pub start: Option<serde_json::Value>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Input of `InsightApplier::apply`.
#[derive(Debug, Clone)]
pub struct ApplyRequest {
    pub wedding_id: String,
    pub sender: String,
    pub message_id: String,
    pub insights: Insights,
    pub subject: Option<String>,
}

/// Counts of records written by the applier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplySummary {
    pub meetings: usize,
    pub tasks: usize,
    pub budgets: usize,
    pub transactions: usize,
    pub vendor_id: Option<String>,
}

// ── Outcome ─────────────────────────────────────────────────────────

/// Result of processing one inbound message end to end.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum QuoteOutcome {
    /// The classifier rejected the message.
    NotQuoteResponse,
    /// No outstanding request matches the sender.
    NoMatch,
    /// A response was already recorded for this message.
    AlreadyRecorded {
        #[serde(rename = "responseId")]
        response_id: String,
    },
    /// There was no text to extract from.
    NothingExtracted {
        #[serde(rename = "requestId")]
        request_id: String,
    },
    /// A quote response was created and propagated.
    #[serde(rename_all = "camelCase")]
    Recorded {
        request_id: String,
        response_id: String,
        source: MatchSource,
        total_price: Option<Decimal>,
        confidence: u8,
        provenance: String,
        applied: Option<ApplySummary>,
    },
}

impl QuoteOutcome {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotQuoteResponse => "not_quote_response",
            Self::NoMatch => "no_match",
            Self::AlreadyRecorded { .. } => "already_recorded",
            Self::NothingExtracted { .. } => "nothing_extracted",
            Self::Recorded { .. } => "recorded",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insights_deserialize_with_aliases() {
        let raw = r#"{
            "budgets": [{"concept": "DJ + Saxo", "amount": 900, "status": "aceptado", "vendor": "Música Viva"}],
            "tasks": [{"title": "Enviar anticipo", "dueDate": "2025-03-01"}],
            "meetings": [{"title": "Prueba de menú", "when": {"date": "2025-02-10", "time": "18:00"}}]
        }"#;
        let insights: Insights = serde_json::from_str(raw).unwrap();
        assert_eq!(insights.budgets[0].description.as_deref(), Some("DJ + Saxo"));
        assert_eq!(insights.budgets[0].client.as_deref(), Some("Música Viva"));
        assert!(insights.tasks[0].due.is_some());
        assert!(insights.meetings[0].when.is_some());
        assert!(!insights.is_empty());
    }

    #[test]
    fn outcome_serialization_is_tagged() {
        let json = serde_json::to_value(QuoteOutcome::NoMatch).unwrap();
        assert_eq!(json["outcome"], "no_match");
    }

    #[test]
    fn match_source_labels() {
        assert_eq!(MatchSource::InternetVendor.label(), "internet_supplier");
        assert_eq!(MatchSource::CrossVendorScan.label(), "collection_group");
    }

    #[test]
    fn mail_builder_counts_attachments() {
        let mail = InboundMail::new("m-1", "a@b.com", "Re: x", "y").with_attachment(AttachmentText {
            filename: "presupuesto.txt".into(),
            mime: Some("text/plain".into()),
            text: "Total 100€".into(),
        });
        assert_eq!(mail.attachment_count, 1);
    }
}
