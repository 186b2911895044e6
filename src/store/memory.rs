//! In-memory `Database` implementation, used by the replay binary and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::DatabaseError;
use crate::planner::{BudgetKey, BudgetLine, BudgetUpsert, Meeting, SupplierBudget, Task, Transaction, WeddingSupplier};
use crate::quotes::{
    GoldenExample, QuoteRequest, QuoteResponse, RequestStatus, Vendor, VendorOrigin, normalize_email,
};
use crate::store::traits::{
    BudgetStore, GoldenExampleStore, MailLinkage, MailStore, PlannerStore, QuoteRequestStore, QuoteResponseStore,
    ResponseInsert, VendorStore,
};

/// Initial contents for an [`InMemoryStore`], loadable from JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSeed {
    #[serde(default)]
    pub vendors: Vec<Vendor>,
    #[serde(default)]
    pub wedding_suppliers: Vec<WeddingSupplier>,
    #[serde(default)]
    pub quote_requests: Vec<QuoteRequest>,
    #[serde(default)]
    pub golden_examples: Vec<GoldenExample>,
}

#[derive(Default)]
struct State {
    vendors: Vec<Vendor>,
    wedding_suppliers: Vec<WeddingSupplier>,
    requests: Vec<QuoteRequest>,
    responses: Vec<QuoteResponse>,
    golden: Vec<GoldenExample>,
    budgets: Vec<SupplierBudget>,
    tasks: Vec<Task>,
    meetings: Vec<Meeting>,
    transactions: Vec<Transaction>,
    mail: HashMap<String, MailLinkage>,
}

/// Process-local store guarded by a single async lock.
///
/// Every write happens under the write guard, so the find-or-write operations
/// (`insert_response`, `upsert_budget`, `insert_transaction`) are atomic with
/// respect to concurrent callers.
pub struct InMemoryStore {
    state: RwLock<State>,
    indexes_available: AtomicBool,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            indexes_available: AtomicBool::new(true),
        }
    }

    pub fn from_seed(seed: StoreSeed) -> Self {
        let mut vendors = seed.vendors;
        for vendor in &mut vendors {
            vendor.contact_email = vendor.contact_email.as_deref().map(normalize_email);
        }
        let mut requests = seed.quote_requests;
        for request in &mut requests {
            request.vendor_email = normalize_email(&request.vendor_email);
        }
        Self {
            state: RwLock::new(State {
                vendors,
                wedding_suppliers: seed.wedding_suppliers,
                requests,
                golden: seed.golden_examples,
                ..State::default()
            }),
            indexes_available: AtomicBool::new(true),
        }
    }

    /// Simulate a backend that cannot serve ordered or collection-group
    /// queries.
    pub fn set_indexes_available(&self, available: bool) {
        self.indexes_available.store(available, Ordering::SeqCst);
    }

    pub async fn add_vendor(&self, vendor: Vendor) {
        self.state.write().await.vendors.push(vendor);
    }

    pub async fn add_wedding_supplier(&self, supplier: WeddingSupplier) {
        self.state.write().await.wedding_suppliers.push(supplier);
    }

    pub async fn add_request(&self, request: QuoteRequest) {
        self.state.write().await.requests.push(request);
    }

    pub async fn add_golden_example(&self, example: GoldenExample) {
        self.state.write().await.golden.push(example);
    }

    /// Snapshot of every stored response.
    pub async fn responses(&self) -> Vec<QuoteResponse> {
        self.state.read().await.responses.clone()
    }

    fn require_index(&self, collection: &str) -> Result<(), DatabaseError> {
        if self.indexes_available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DatabaseError::IndexUnavailable {
                collection: collection.to_string(),
                reason: "composite index not built".to_string(),
            })
        }
    }
}

fn newest(a: &QuoteRequest, b: &QuoteRequest) -> std::cmp::Ordering {
    a.created_at.cmp(&b.created_at)
}

#[async_trait]
impl VendorStore for InMemoryStore {
    async fn find_vendors_by_email(&self, email: &str, limit: usize) -> Result<Vec<Vendor>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state
            .vendors
            .iter()
            .filter(|v| v.contact_email.as_deref() == Some(email))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn find_wedding_suppliers(&self, wedding_id: &str) -> Result<Vec<WeddingSupplier>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state
            .wedding_suppliers
            .iter()
            .filter(|s| s.wedding_id == wedding_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl QuoteRequestStore for InMemoryStore {
    async fn latest_vendor_request(
        &self,
        vendor_id: &str,
        status: RequestStatus,
    ) -> Result<Option<QuoteRequest>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state
            .requests
            .iter()
            .filter(|r| {
                r.origin == VendorOrigin::Registered
                    && r.vendor_id.as_deref() == Some(vendor_id)
                    && r.status == status
            })
            .max_by(|a, b| newest(a, b))
            .cloned())
    }

    async fn latest_internet_request(
        &self,
        email: &str,
        status: RequestStatus,
    ) -> Result<Option<QuoteRequest>, DatabaseError> {
        self.require_index("internet_quote_requests")?;
        let state = self.state.read().await;
        Ok(state
            .requests
            .iter()
            .filter(|r| r.origin == VendorOrigin::Internet && r.vendor_email == email && r.status == status)
            .max_by(|a, b| newest(a, b))
            .cloned())
    }

    async fn scan_internet_requests(&self, email: &str, limit: usize) -> Result<Vec<QuoteRequest>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state
            .requests
            .iter()
            .filter(|r| r.origin == VendorOrigin::Internet && r.vendor_email == email)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn recent_pending_requests(&self, limit: usize) -> Result<Vec<QuoteRequest>, DatabaseError> {
        self.require_index("quote_requests")?;
        let state = self.state.read().await;
        let mut pending: Vec<QuoteRequest> = state
            .requests
            .iter()
            .filter(|r| r.origin == VendorOrigin::Registered && r.status == RequestStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| newest(b, a));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn get_request(&self, origin: VendorOrigin, request_id: &str) -> Result<Option<QuoteRequest>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state
            .requests
            .iter()
            .find(|r| r.origin == origin && r.id == request_id)
            .cloned())
    }

    async fn mark_request_quoted(
        &self,
        origin: VendorOrigin,
        request_id: &str,
        response_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        let request = state
            .requests
            .iter_mut()
            .find(|r| r.origin == origin && r.id == request_id)
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "quote_request".to_string(),
                id: request_id.to_string(),
            })?;
        request.status = RequestStatus::Quoted;
        request.responded_at = Some(at);
        request.quote_response_id = Some(response_id.to_string());
        Ok(())
    }
}

#[async_trait]
impl QuoteResponseStore for InMemoryStore {
    async fn insert_response(&self, response: &QuoteResponse) -> Result<ResponseInsert, DatabaseError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.responses.iter().find(|r| r.mail_id == response.mail_id) {
            return Ok(ResponseInsert::Existing(existing.clone()));
        }
        if state.responses.iter().any(|r| r.id == response.id) {
            return Err(DatabaseError::Query(format!("quote response {} already exists", response.id)));
        }
        state.responses.push(response.clone());
        Ok(ResponseInsert::Inserted)
    }

    async fn get_response(&self, id: &str) -> Result<Option<QuoteResponse>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state.responses.iter().find(|r| r.id == id).cloned())
    }

    async fn save_response(&self, response: &QuoteResponse) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        let slot = state
            .responses
            .iter_mut()
            .find(|r| r.id == response.id)
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "quote_response".to_string(),
                id: response.id.clone(),
            })?;
        *slot = response.clone();
        Ok(())
    }

    async fn find_response_for_mail(&self, mail_id: &str) -> Result<Option<QuoteResponse>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state.responses.iter().find(|r| r.mail_id == mail_id).cloned())
    }
}

#[async_trait]
impl GoldenExampleStore for InMemoryStore {
    async fn golden_examples(&self, category: &str, limit: usize) -> Result<Vec<GoldenExample>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state
            .golden
            .iter()
            .filter(|g| g.category.eq_ignore_ascii_case(category))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BudgetStore for InMemoryStore {
    async fn upsert_budget(
        &self,
        key: &BudgetKey,
        line: BudgetLine,
        scan_limit: usize,
    ) -> Result<BudgetUpsert, DatabaseError> {
        let mut state = self.state.write().await;

        let mut candidates: Vec<usize> = state
            .budgets
            .iter()
            .enumerate()
            .filter(|(_, b)| b.wedding_id == key.wedding_id && b.vendor_id == key.vendor_id)
            .map(|(i, _)| i)
            .collect();
        candidates.sort_by(|a, b| state.budgets[*b].updated_at.cmp(&state.budgets[*a].updated_at));
        candidates.truncate(scan_limit);

        let hit = candidates.into_iter().find(|i| state.budgets[*i].matches(&line));
        match hit {
            Some(i) => {
                let budget = &mut state.budgets[i];
                budget.apply(line);
                Ok(BudgetUpsert::Updated(budget.clone()))
            }
            None => {
                let budget = SupplierBudget::from_line(key, line);
                state.budgets.push(budget.clone());
                Ok(BudgetUpsert::Inserted(budget))
            }
        }
    }

    async fn list_budgets(&self, key: &BudgetKey) -> Result<Vec<SupplierBudget>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state
            .budgets
            .iter()
            .filter(|b| b.wedding_id == key.wedding_id && b.vendor_id == key.vendor_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PlannerStore for InMemoryStore {
    async fn insert_task(&self, task: &Task) -> Result<(), DatabaseError> {
        self.state.write().await.tasks.push(task.clone());
        Ok(())
    }

    async fn insert_meeting(&self, meeting: &Meeting) -> Result<(), DatabaseError> {
        self.state.write().await.meetings.push(meeting.clone());
        Ok(())
    }

    async fn insert_transaction(&self, transaction: &Transaction) -> Result<bool, DatabaseError> {
        let mut state = self.state.write().await;
        if state.transactions.iter().any(|t| t.budget_id == transaction.budget_id) {
            return Ok(false);
        }
        state.transactions.push(transaction.clone());
        Ok(true)
    }

    async fn list_tasks(&self, wedding_id: &str) -> Result<Vec<Task>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state.tasks.iter().filter(|t| t.wedding_id == wedding_id).cloned().collect())
    }

    async fn list_meetings(&self, wedding_id: &str) -> Result<Vec<Meeting>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state.meetings.iter().filter(|m| m.wedding_id == wedding_id).cloned().collect())
    }

    async fn list_transactions(&self, wedding_id: &str) -> Result<Vec<Transaction>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.wedding_id == wedding_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MailStore for InMemoryStore {
    async fn stamp_mail(&self, mail_id: &str, linkage: MailLinkage) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        state.mail.entry(mail_id.to_string()).or_default().merge(linkage);
        Ok(())
    }

    async fn get_mail_linkage(&self, mail_id: &str) -> Result<Option<MailLinkage>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state.mail.get(mail_id).cloned())
    }
}
