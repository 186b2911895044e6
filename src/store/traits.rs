//! Persistence traits, one per collection family, unified under `Database`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;
use crate::planner::{BudgetKey, BudgetLine, BudgetUpsert, Meeting, SupplierBudget, Task, Transaction, WeddingSupplier};
use crate::quotes::{GoldenExample, QuoteRequest, QuoteResponse, RequestStatus, Vendor, VendorOrigin};

/// Fields stamped onto a stored mail record. `None` fields leave the stored
/// value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailLinkage {
    /// Id of the wedding supplier the sender resolved to.
    #[serde(default)]
    pub supplier_id: Option<String>,
    #[serde(default)]
    pub linked_quote_request_id: Option<String>,
    #[serde(default)]
    pub linked_quote_response_id: Option<String>,
    #[serde(default)]
    pub wedding_id: Option<String>,
    #[serde(default)]
    pub owner_uid: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl MailLinkage {
    /// Overlay the `Some` fields of `other` onto `self`.
    pub fn merge(&mut self, other: MailLinkage) {
        fn take(slot: &mut Option<String>, value: Option<String>) {
            if value.is_some() {
                *slot = value;
            }
        }
        take(&mut self.supplier_id, other.supplier_id);
        take(&mut self.linked_quote_request_id, other.linked_quote_request_id);
        take(&mut self.linked_quote_response_id, other.linked_quote_response_id);
        take(&mut self.wedding_id, other.wedding_id);
        take(&mut self.owner_uid, other.owner_uid);
        if other.updated_at.is_some() {
            self.updated_at = other.updated_at;
        }
    }
}

/// Outcome of an atomic quote-response insert.
#[derive(Debug, Clone)]
pub enum ResponseInsert {
    Inserted,
    /// A response for the same mail was already stored; nothing was written.
    Existing(QuoteResponse),
}

/// Registered vendor profiles and wedding supplier lists.
#[async_trait]
pub trait VendorStore: Send + Sync {
    /// Vendors whose contact email equals `email` (already normalized).
    async fn find_vendors_by_email(&self, email: &str, limit: usize) -> Result<Vec<Vendor>, DatabaseError>;

    /// Suppliers attached to a wedding.
    async fn find_wedding_suppliers(&self, wedding_id: &str) -> Result<Vec<WeddingSupplier>, DatabaseError>;
}

/// Outstanding and answered quote requests.
#[async_trait]
pub trait QuoteRequestStore: Send + Sync {
    /// Most recent request under a registered vendor with the given status.
    async fn latest_vendor_request(
        &self,
        vendor_id: &str,
        status: RequestStatus,
    ) -> Result<Option<QuoteRequest>, DatabaseError>;

    /// Most recent internet-vendor request for `email` with the given status.
    ///
    /// Needs a composite index; returns `DatabaseError::IndexUnavailable`
    /// when the backend cannot serve the ordered query.
    async fn latest_internet_request(
        &self,
        email: &str,
        status: RequestStatus,
    ) -> Result<Option<QuoteRequest>, DatabaseError>;

    /// Unordered internet-vendor requests for `email`, at most `limit`.
    async fn scan_internet_requests(&self, email: &str, limit: usize) -> Result<Vec<QuoteRequest>, DatabaseError>;

    /// Most recent pending requests across every registered vendor.
    ///
    /// Needs a collection-group index; may return `IndexUnavailable`.
    async fn recent_pending_requests(&self, limit: usize) -> Result<Vec<QuoteRequest>, DatabaseError>;

    async fn get_request(&self, origin: VendorOrigin, request_id: &str) -> Result<Option<QuoteRequest>, DatabaseError>;

    /// Mark a request answered by `response_id`.
    async fn mark_request_quoted(
        &self,
        origin: VendorOrigin,
        request_id: &str,
        response_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;
}

/// Structured quote responses.
#[async_trait]
pub trait QuoteResponseStore: Send + Sync {
    /// Insert `response` unless one already exists for its `mail_id`,
    /// atomically. The existing record is returned in that case.
    async fn insert_response(&self, response: &QuoteResponse) -> Result<ResponseInsert, DatabaseError>;

    async fn get_response(&self, id: &str) -> Result<Option<QuoteResponse>, DatabaseError>;

    /// Replace a stored response. Errors with `NotFound` when absent.
    async fn save_response(&self, response: &QuoteResponse) -> Result<(), DatabaseError>;

    /// The response created from a given mail, if any.
    async fn find_response_for_mail(&self, mail_id: &str) -> Result<Option<QuoteResponse>, DatabaseError>;
}

/// Validated extractions used as few-shot examples.
#[async_trait]
pub trait GoldenExampleStore: Send + Sync {
    async fn golden_examples(&self, category: &str, limit: usize) -> Result<Vec<GoldenExample>, DatabaseError>;
}

/// Per-vendor budget lines.
#[async_trait]
pub trait BudgetStore: Send + Sync {
    /// Insert `line` or merge it into a matching existing line, atomically.
    ///
    /// Only the `scan_limit` most recently updated lines under `key` are
    /// considered as merge candidates.
    async fn upsert_budget(
        &self,
        key: &BudgetKey,
        line: BudgetLine,
        scan_limit: usize,
    ) -> Result<BudgetUpsert, DatabaseError>;

    async fn list_budgets(&self, key: &BudgetKey) -> Result<Vec<SupplierBudget>, DatabaseError>;
}

/// Tasks, calendar entries and expenses owned by a wedding.
#[async_trait]
pub trait PlannerStore: Send + Sync {
    async fn insert_task(&self, task: &Task) -> Result<(), DatabaseError>;

    async fn insert_meeting(&self, meeting: &Meeting) -> Result<(), DatabaseError>;

    /// Insert `transaction` unless one already exists for its `budget_id`,
    /// atomically. Returns whether it was written.
    async fn insert_transaction(&self, transaction: &Transaction) -> Result<bool, DatabaseError>;

    async fn list_tasks(&self, wedding_id: &str) -> Result<Vec<Task>, DatabaseError>;

    async fn list_meetings(&self, wedding_id: &str) -> Result<Vec<Meeting>, DatabaseError>;

    async fn list_transactions(&self, wedding_id: &str) -> Result<Vec<Transaction>, DatabaseError>;
}

/// Linkage fields on stored inbound mail.
#[async_trait]
pub trait MailStore: Send + Sync {
    /// Merge `linkage` into the mail record, creating it if needed.
    async fn stamp_mail(&self, mail_id: &str, linkage: MailLinkage) -> Result<(), DatabaseError>;

    async fn get_mail_linkage(&self, mail_id: &str) -> Result<Option<MailLinkage>, DatabaseError>;
}

/// Everything the pipeline persists.
pub trait Database:
    VendorStore + QuoteRequestStore + QuoteResponseStore + GoldenExampleStore + BudgetStore + PlannerStore + MailStore
{
}

impl<T> Database for T where
    T: VendorStore
        + QuoteRequestStore
        + QuoteResponseStore
        + GoldenExampleStore
        + BudgetStore
        + PlannerStore
        + MailStore
{
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_existing_fields() {
        let mut stored = MailLinkage {
            supplier_id: Some("v-1".into()),
            wedding_id: Some("w-1".into()),
            ..Default::default()
        };
        stored.merge(MailLinkage {
            linked_quote_response_id: Some("r-1".into()),
            ..Default::default()
        });
        assert_eq!(stored.supplier_id.as_deref(), Some("v-1"));
        assert_eq!(stored.wedding_id.as_deref(), Some("w-1"));
        assert_eq!(stored.linked_quote_response_id.as_deref(), Some("r-1"));
    }
}
