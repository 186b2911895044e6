//! Quote requests, vendor profiles and responses.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of an outreach to a vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Quoted,
    Accepted,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Quoted => "quoted",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which store a request lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VendorOrigin {
    /// Nested under a registered vendor profile.
    Registered,
    /// Flat collection of internet-sourced vendors.
    Internet,
}

/// A registered vendor profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vendor {
    pub id: String,
    pub name: String,
    /// Contact address, stored lowercase.
    pub contact_email: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

/// Requester contact captured on the request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequesterContact {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// One outreach to one vendor for one wedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub id: String,
    pub origin: VendorOrigin,
    /// Registered vendor id; `None` for internet-sourced vendors.
    #[serde(default)]
    pub vendor_id: Option<String>,
    pub vendor_email: String,
    #[serde(default)]
    pub vendor_name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(default)]
    pub wedding_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub contact: RequesterContact,
    #[serde(default)]
    pub service_details: serde_json::Value,
    /// Single-use token for the web response form.
    #[serde(default)]
    pub response_token: Option<String>,
    pub status: RequestStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub responded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub quote_response_id: Option<String>,
}

impl QuoteRequest {
    /// Build a pending request created now.
    pub fn pending(
        origin: VendorOrigin,
        vendor_id: Option<String>,
        vendor_email: &str,
        vendor_name: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            origin,
            vendor_id,
            vendor_email: normalize_email(vendor_email),
            vendor_name: vendor_name.into(),
            category: None,
            category_name: None,
            wedding_id: None,
            user_id: None,
            contact: RequesterContact::default(),
            service_details: serde_json::Value::Null,
            response_token: Some(Uuid::new_v4().simple().to_string()),
            status: RequestStatus::Pending,
            created_at: Some(Utc::now()),
            responded_at: None,
            quote_response_id: None,
        }
    }

    pub fn with_status(mut self, status: RequestStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    pub fn with_wedding(mut self, wedding_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.wedding_id = Some(wedding_id.into());
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_category(mut self, key: impl Into<String>, name: impl Into<String>) -> Self {
        self.category = Some(key.into());
        self.category_name = Some(name.into());
        self
    }
}

/// Lowercase and trim an address for equality lookups.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// One itemized line of a quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceItem {
    pub concept: String,
    pub amount: Decimal,
}

/// Where an extraction came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Structured output of the named model.
    Model(String),
    /// Regex/heuristic fallback.
    Heuristic,
}

impl Provenance {
    pub fn label(&self) -> &str {
        match self {
            Self::Model(name) => name,
            Self::Heuristic => "manual/heuristic",
        }
    }
}

/// Review state of a quote response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Received,
    Reviewed,
    Accepted,
    Rejected,
    Negotiating,
}

impl FromStr for ResponseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "received" => Ok(Self::Received),
            "reviewed" => Ok(Self::Reviewed),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            "negotiating" => Ok(Self::Negotiating),
            other => Err(format!("unknown quote response status '{other}'")),
        }
    }
}

/// Structured result of a vendor's reply. Created once per matched message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub id: String,
    pub request_id: String,
    pub vendor_id: Option<String>,
    pub mail_id: String,
    pub vendor_email: String,
    pub vendor_name: String,
    pub wedding_id: Option<String>,
    pub user_id: Option<String>,
    pub client_name: Option<String>,
    pub client_email: Option<String>,

    pub total_price: Option<Decimal>,
    pub price_breakdown: Vec<PriceItem>,
    pub services_included: Vec<String>,
    pub extras: Vec<String>,
    pub payment_terms: Option<String>,
    pub delivery_time: Option<String>,
    pub cancellation_policy: Option<String>,
    pub warranty: Option<String>,
    pub notes: Option<String>,
    /// 0–100.
    pub confidence: u8,
    pub provenance: Provenance,
    pub analyzed_at: DateTime<Utc>,

    pub email_subject: String,
    pub has_attachments: bool,
    pub attachment_count: usize,

    pub status: ResponseStatus,
    /// Always "email_auto" for pipeline-created responses.
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rejected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status_notes: Option<String>,
}

impl QuoteResponse {
    /// Move to `status`, stamping acceptance/rejection times.
    pub fn transition(&mut self, status: ResponseStatus, notes: Option<String>) {
        let now = Utc::now();
        self.status = status;
        self.updated_at = now;
        match status {
            ResponseStatus::Accepted => self.accepted_at = Some(now),
            ResponseStatus::Rejected => self.rejected_at = Some(now),
            _ => {}
        }
        if notes.is_some() {
            self.status_notes = notes;
        }
    }
}

/// A validated extraction used as a few-shot example.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoldenExample {
    pub category: String,
    pub input_text: String,
    pub expected: serde_json::Value,
}
