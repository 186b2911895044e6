//! Writes extracted insights into the wedding planner.
//!
//! Each category (vendor stamp, meetings, tasks, budgets) is applied
//! independently: a failed write is logged and the rest carry on.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::DatabaseError;
use crate::pipeline::types::{ApplyRequest, ApplySummary, BudgetInsight, MeetingInsight, TaskInsight};
use crate::planner::{
    BudgetKey, BudgetLine, BudgetStatus, BudgetUpsert, Meeting, MeetingKind, Task, Transaction, WeddingSupplier,
};
use crate::quotes::normalize_email;
use crate::store::{Database, MailLinkage};

const DEFAULT_CURRENCY: &str = "EUR";

/// Hour used when a date carries no time of day.
const DEFAULT_HOUR: u32 = 9;

/// Epoch values above this are milliseconds.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Applies [`ApplyRequest`]s against a [`Database`].
pub struct InsightApplier {
    store: Arc<dyn Database>,
    budget_scan_limit: usize,
}

impl InsightApplier {
    pub fn new(store: Arc<dyn Database>, budget_scan_limit: usize) -> Self {
        Self {
            store,
            budget_scan_limit,
        }
    }

    pub async fn apply(&self, request: &ApplyRequest) -> ApplySummary {
        if request.insights.is_empty() {
            debug!(mail_id = %request.message_id, "No insights to apply");
            return ApplySummary::default();
        }
        let resolved = self.resolve_vendor(request).await;
        let vendor_id = resolved.as_deref();
        let mut summary = ApplySummary::default();

        for meeting in &request.insights.meetings {
            match self.create_meeting(request, meeting, vendor_id).await {
                Ok(()) => summary.meetings += 1,
                Err(e) => warn!(mail_id = %request.message_id, title = %meeting.title, error = %e, "Meeting write failed"),
            }
        }

        for task in &request.insights.tasks {
            match self.create_task(request, task, vendor_id).await {
                Ok(reminders) => {
                    summary.tasks += 1;
                    summary.meetings += reminders;
                }
                Err(e) => warn!(mail_id = %request.message_id, title = %task.title, error = %e, "Task write failed"),
            }
        }

        for budget in &request.insights.budgets {
            match self.upsert_budget(request, budget, vendor_id).await {
                Ok(transactions) => {
                    summary.budgets += 1;
                    summary.transactions += transactions;
                }
                Err(e) => warn!(mail_id = %request.message_id, error = %e, "Budget write failed"),
            }
        }

        info!(
            mail_id = %request.message_id,
            wedding_id = %request.wedding_id,
            meetings = summary.meetings,
            tasks = summary.tasks,
            budgets = summary.budgets,
            transactions = summary.transactions,
            "Insights applied"
        );
        summary.vendor_id = resolved;
        summary
    }

    // ── Vendor resolution ───────────────────────────────────────────

    /// Exact email match, then a fuzzy name match against budget hints.
    /// The resolved id is stamped onto the source mail.
    async fn resolve_vendor(&self, request: &ApplyRequest) -> Option<String> {
        let suppliers = match self.store.find_wedding_suppliers(&request.wedding_id).await {
            Ok(suppliers) => suppliers,
            Err(e) => {
                warn!(wedding_id = %request.wedding_id, error = %e, "Supplier lookup failed");
                return None;
            }
        };

        let sender = normalize_email(&request.sender);
        let hints: Vec<&str> = request
            .insights
            .budgets
            .iter()
            .filter_map(|b| b.client.as_deref())
            .collect();
        let resolved = match_supplier(&suppliers, &sender, &hints)?;
        debug!(vendor_id = %resolved.id, "Resolved vendor");

        let linkage = MailLinkage {
            supplier_id: Some(resolved.id.clone()),
            wedding_id: Some(request.wedding_id.clone()),
            updated_at: Some(Utc::now()),
            ..MailLinkage::default()
        };
        if let Err(e) = self.store.stamp_mail(&request.message_id, linkage).await {
            warn!(mail_id = %request.message_id, error = %e, "Failed to stamp vendor on mail");
        }
        Some(resolved.id.clone())
    }

    // ── Meetings and tasks ──────────────────────────────────────────

    async fn create_meeting(
        &self,
        request: &ApplyRequest,
        insight: &MeetingInsight,
        vendor_id: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let start = meeting_start(insight).unwrap_or_else(Utc::now);
        let mut meeting = Meeting::one_hour(
            &request.wedding_id,
            &insight.title,
            MeetingKind::Meeting,
            start,
            &request.message_id,
        );
        meeting.description = insight.description.clone();
        meeting.vendor_id = vendor_id.map(str::to_string);
        self.store.insert_meeting(&meeting).await
    }

    /// Insert the task and, when it has a due date, a reminder meeting.
    /// Returns the number of reminders created.
    async fn create_task(
        &self,
        request: &ApplyRequest,
        insight: &TaskInsight,
        vendor_id: Option<&str>,
    ) -> Result<usize, DatabaseError> {
        let mut task = Task::new(&request.wedding_id, &insight.title, &request.message_id);
        task.notes = insight.notes.clone();
        task.due = insight.due.as_ref().and_then(|v| parse_datetime(v, None));
        task.vendor_id = vendor_id.map(str::to_string);
        self.store.insert_task(&task).await?;

        let Some(due) = task.due else {
            return Ok(0);
        };
        let mut reminder = Meeting::one_hour(
            &request.wedding_id,
            format!("Recordatorio: {}", task.title),
            MeetingKind::Reminder,
            due,
            &request.message_id,
        );
        reminder.task_id = Some(task.id.clone());
        reminder.vendor_id = task.vendor_id.clone();
        match self.store.insert_meeting(&reminder).await {
            Ok(()) => Ok(1),
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Reminder write failed");
                Ok(0)
            }
        }
    }

    // ── Budgets ─────────────────────────────────────────────────────

    /// Upsert one budget line. Returns the number of transactions created.
    async fn upsert_budget(
        &self,
        request: &ApplyRequest,
        insight: &BudgetInsight,
        vendor_id: Option<&str>,
    ) -> Result<usize, DatabaseError> {
        let key = BudgetKey {
            wedding_id: request.wedding_id.clone(),
            vendor_id: vendor_id.map(str::to_string),
        };
        let line = BudgetLine {
            description: budget_description(insight),
            amount: insight.amount,
            currency: insight
                .currency
                .clone()
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            status: BudgetStatus::normalize(insight.status.as_deref(), request.subject.as_deref()),
            source_mail_id: Some(request.message_id.clone()),
        };

        let upsert = self.store.upsert_budget(&key, line, self.budget_scan_limit).await?;
        let budget = upsert.budget();
        debug!(
            budget_id = %budget.id,
            status = budget.status.as_str(),
            updated = matches!(upsert, BudgetUpsert::Updated(_)),
            "Budget upserted"
        );

        if budget.status != BudgetStatus::Accepted {
            return Ok(0);
        }
        let inserted = self.store.insert_transaction(&Transaction::expense_for(budget)).await?;
        Ok(usize::from(inserted))
    }
}

fn budget_description(insight: &BudgetInsight) -> String {
    insight
        .description
        .as_deref()
        .or(insight.client.as_deref())
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or("Presupuesto")
        .to_string()
}

/// Exact email match first, then a case-insensitive substring match between
/// a supplier name and any hint.
fn match_supplier<'a>(
    suppliers: &'a [WeddingSupplier],
    sender: &str,
    hints: &[&str],
) -> Option<&'a WeddingSupplier> {
    if let Some(exact) = suppliers
        .iter()
        .find(|s| s.email.as_deref().map(normalize_email).as_deref() == Some(sender))
    {
        return Some(exact);
    }
    hints
        .iter()
        .map(|h| h.trim().to_lowercase())
        .filter(|h| !h.is_empty())
        .find_map(|hint| {
            suppliers.iter().find(|s| {
                let name = s.name.trim().to_lowercase();
                !name.is_empty() && (name.contains(&hint) || hint.contains(&name))
            })
        })
}

// ── Date resolution ─────────────────────────────────────────────────

/// First parseable of `start`, `date` (with `time`), `when`.
fn meeting_start(insight: &MeetingInsight) -> Option<DateTime<Utc>> {
    let time = insight.time.as_deref();
    [&insight.start, &insight.date, &insight.when]
        .into_iter()
        .flatten()
        .find_map(|v| parse_datetime(v, time))
}

/// Accepts RFC 3339 and common date/time strings, epoch seconds or millis,
/// `{seconds}` timestamps and nested `{date, time}` / `{start}` / `{when}`
/// objects.
fn parse_datetime(value: &Value, time: Option<&str>) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_datetime_str(s, time),
        Value::Number(n) => epoch(n.as_i64()?),
        Value::Object(map) => {
            if let Some(secs) = map.get("seconds").or_else(|| map.get("_seconds")).and_then(Value::as_i64) {
                return Utc.timestamp_opt(secs, 0).single();
            }
            let time = map.get("time").and_then(Value::as_str).or(time);
            ["dateTime", "start", "date", "when"]
                .iter()
                .filter_map(|k| map.get(*k))
                .find_map(|v| parse_datetime(v, time))
        }
        _ => None,
    }
}

fn epoch(raw: i64) -> Option<DateTime<Utc>> {
    if raw.abs() >= MILLIS_THRESHOLD {
        Utc.timestamp_millis_opt(raw).single()
    } else {
        Utc.timestamp_opt(raw, 0).single()
    }
}

fn parse_datetime_str(raw: &str, time: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    for format in ["%Y-%m-%d", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            let time = time.and_then(parse_time).or_else(|| NaiveTime::from_hms_opt(DEFAULT_HOUR, 0, 0))?;
            return Some(date.and_time(time).and_utc());
        }
    }
    None
}

fn parse_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}
