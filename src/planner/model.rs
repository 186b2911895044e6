//! Wedding planner records written by the insight applier.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Smallest absolute difference still treated as the same amount.
const MIN_AMOUNT_TOLERANCE: Decimal = dec!(5);

/// Relative difference still treated as the same amount.
const RELATIVE_AMOUNT_TOLERANCE: Decimal = dec!(0.02);

/// Approval state of a budget line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStatus {
    Pending,
    Accepted,
    Rejected,
}

impl BudgetStatus {
    /// Coerce a free-text status into one of the three states.
    ///
    /// The explicit status wins; the subject is consulted only when the
    /// status is absent or blank.
    pub fn normalize(status: Option<&str>, subject: Option<&str>) -> Self {
        let source = status
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or(subject)
            .unwrap_or_default()
            .to_lowercase();

        if ["aceptad", "accepted", "acepto", "approved", "aprobad"]
            .iter()
            .any(|kw| source.contains(kw))
        {
            Self::Accepted
        } else if ["rechazad", "declin", "denegad", "rejected"]
            .iter()
            .any(|kw| source.contains(kw))
        {
            Self::Rejected
        } else {
            Self::Pending
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

/// Owner of a set of budget lines: one vendor within one wedding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetKey {
    pub wedding_id: String,
    /// `None` when the vendor could not be resolved.
    pub vendor_id: Option<String>,
}

/// A candidate line to upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetLine {
    pub description: String,
    pub amount: Option<Decimal>,
    pub currency: String,
    pub status: BudgetStatus,
    pub source_mail_id: Option<String>,
}

/// A per-vendor, per-wedding monetary line item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplierBudget {
    pub id: String,
    pub wedding_id: String,
    pub vendor_id: Option<String>,
    pub description: String,
    pub amount: Option<Decimal>,
    pub currency: String,
    pub status: BudgetStatus,
    pub source_mail_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SupplierBudget {
    pub fn from_line(key: &BudgetKey, line: BudgetLine) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            wedding_id: key.wedding_id.clone(),
            vendor_id: key.vendor_id.clone(),
            description: line.description,
            amount: line.amount,
            currency: line.currency,
            status: line.status,
            source_mail_id: line.source_mail_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Heuristic identity: equal normalized description and, when both sides
    /// carry an amount, amounts within the tolerance of the stored one.
    pub fn matches(&self, line: &BudgetLine) -> bool {
        if normalize_description(&self.description) != normalize_description(&line.description) {
            return false;
        }
        match (self.amount, line.amount) {
            (Some(stored), Some(candidate)) => {
                (stored - candidate).abs() <= amount_tolerance(stored)
            }
            _ => true,
        }
    }

    /// Merge a matching candidate into this line.
    pub fn apply(&mut self, line: BudgetLine) {
        if line.amount.is_some() {
            self.amount = line.amount;
        }
        self.currency = line.currency;
        self.status = line.status;
        if line.source_mail_id.is_some() {
            self.source_mail_id = line.source_mail_id;
        }
        self.updated_at = Utc::now();
    }
}

/// Trimmed, lowercased description used for dedup.
pub fn normalize_description(description: &str) -> String {
    description.trim().to_lowercase()
}

/// `max(5, 2% of stored)`.
pub fn amount_tolerance(stored: Decimal) -> Decimal {
    (stored.abs() * RELATIVE_AMOUNT_TOLERANCE).max(MIN_AMOUNT_TOLERANCE)
}

/// Outcome of an atomic budget upsert.
#[derive(Debug, Clone)]
pub enum BudgetUpsert {
    Inserted(SupplierBudget),
    Updated(SupplierBudget),
}

impl BudgetUpsert {
    pub fn budget(&self) -> &SupplierBudget {
        match self {
            Self::Inserted(b) | Self::Updated(b) => b,
        }
    }
}

/// A to-do owned by the wedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub wedding_id: String,
    pub title: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub due: Option<DateTime<Utc>>,
    #[serde(default)]
    pub vendor_id: Option<String>,
    pub source_mail_id: String,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(wedding_id: impl Into<String>, title: impl Into<String>, source_mail_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            wedding_id: wedding_id.into(),
            title: title.into(),
            notes: None,
            due: None,
            vendor_id: None,
            source_mail_id: source_mail_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// Calendar entry kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingKind {
    Meeting,
    /// Companion entry for a dated task.
    Reminder,
}

/// A calendar entry owned by the wedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meeting {
    pub id: String,
    pub wedding_id: String,
    pub title: String,
    pub kind: MeetingKind,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub vendor_id: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    pub source_mail_id: String,
    pub created_at: DateTime<Utc>,
}

impl Meeting {
    /// A one-hour entry starting at `start`.
    pub fn one_hour(
        wedding_id: impl Into<String>,
        title: impl Into<String>,
        kind: MeetingKind,
        start: DateTime<Utc>,
        source_mail_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            wedding_id: wedding_id.into(),
            title: title.into(),
            kind,
            start,
            end: start + Duration::hours(1),
            description: None,
            vendor_id: None,
            task_id: None,
            source_mail_id: source_mail_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// An expense recorded when a budget line is accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub wedding_id: String,
    pub vendor_id: Option<String>,
    pub budget_id: String,
    pub concept: String,
    pub amount: Option<Decimal>,
    pub currency: String,
    /// Always "expense".
    pub kind: String,
    pub source_mail_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn expense_for(budget: &SupplierBudget) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            wedding_id: budget.wedding_id.clone(),
            vendor_id: budget.vendor_id.clone(),
            budget_id: budget.id.clone(),
            concept: budget.description.clone(),
            amount: budget.amount,
            currency: budget.currency.clone(),
            kind: "expense".to_string(),
            source_mail_id: budget.source_mail_id.clone(),
            created_at: Utc::now(),
        }
    }
}

/// A vendor attached to a wedding, used to resolve who a message came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeddingSupplier {
    pub id: String,
    pub wedding_id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}
