//! Locates the outstanding quote request an inbound reply answers.
//!
//! The search is an ordered chain of strategies; the first one returning a
//! request wins. A failing strategy is logged and skipped.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::DatabaseError;
use crate::pipeline::types::{MatchSource, MatchedRequest};
use crate::quotes::{QuoteRequest, RequestStatus, normalize_email};
use crate::store::Database;

/// Registered vendors considered per sender address.
const VENDOR_LOOKUP_LIMIT: usize = 5;

/// Status priority for registered-vendor requests.
const REGISTERED_STATUS_ORDER: [RequestStatus; 3] =
    [RequestStatus::Pending, RequestStatus::Quoted, RequestStatus::Accepted];

/// Status priority for internet-vendor requests.
const INTERNET_STATUS_ORDER: [RequestStatus; 2] = [RequestStatus::Pending, RequestStatus::Quoted];

/// Rows read by the unordered internet-request scan.
const INTERNET_SCAN_LIMIT: usize = 10;

/// Pending requests read by the cross-vendor scan.
const CROSS_VENDOR_SCAN_LIMIT: usize = 20;

/// Subject words that enable the cross-vendor scan.
const REQUEST_WORDS: &[&str] = &["solicitud", "presupuesto", "cotización", "cotizacion", "quote", "request"];

/// What the matcher knows about the inbound message.
#[derive(Debug, Clone)]
pub struct MatchQuery {
    /// Normalized sender address.
    pub from_email: String,
    pub subject: String,
    pub body: String,
}

impl MatchQuery {
    pub fn new(from_email: &str, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            from_email: normalize_email(from_email),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// One stage of the search.
#[async_trait]
pub trait MatchStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn find(&self, query: &MatchQuery, store: &dyn Database) -> Result<Option<MatchedRequest>, DatabaseError>;
}

/// Requests nested under a registered vendor whose contact email matches.
pub struct RegisteredVendorStrategy;

#[async_trait]
impl MatchStrategy for RegisteredVendorStrategy {
    fn name(&self) -> &'static str {
        "registered_vendor"
    }

    async fn find(&self, query: &MatchQuery, store: &dyn Database) -> Result<Option<MatchedRequest>, DatabaseError> {
        let vendors = store.find_vendors_by_email(&query.from_email, VENDOR_LOOKUP_LIMIT).await?;
        for vendor in &vendors {
            for status in REGISTERED_STATUS_ORDER {
                if let Some(request) = store.latest_vendor_request(&vendor.id, status).await? {
                    debug!(vendor_id = %vendor.id, %status, "Registered vendor request found");
                    return Ok(Some(MatchedRequest::new(request, MatchSource::RegisteredVendor)));
                }
            }
        }
        Ok(None)
    }
}

/// Requests in the flat internet-vendor collection.
pub struct InternetVendorStrategy;

impl InternetVendorStrategy {
    async fn ordered(&self, query: &MatchQuery, store: &dyn Database) -> Result<Option<QuoteRequest>, DatabaseError> {
        for status in INTERNET_STATUS_ORDER {
            if let Some(request) = store.latest_internet_request(&query.from_email, status).await? {
                return Ok(Some(request));
            }
        }
        Ok(None)
    }

    async fn scan(&self, query: &MatchQuery, store: &dyn Database) -> Result<Option<QuoteRequest>, DatabaseError> {
        let rows = store.scan_internet_requests(&query.from_email, INTERNET_SCAN_LIMIT).await?;
        Ok(most_recent_eligible(rows))
    }
}

/// Newest pending or quoted request. On equal timestamps the first seen wins.
fn most_recent_eligible(rows: Vec<QuoteRequest>) -> Option<QuoteRequest> {
    let mut best: Option<QuoteRequest> = None;
    for row in rows {
        if !INTERNET_STATUS_ORDER.contains(&row.status) {
            continue;
        }
        match &best {
            Some(current) if row.created_at <= current.created_at => {}
            _ => best = Some(row),
        }
    }
    best
}

#[async_trait]
impl MatchStrategy for InternetVendorStrategy {
    fn name(&self) -> &'static str {
        "internet_vendor"
    }

    async fn find(&self, query: &MatchQuery, store: &dyn Database) -> Result<Option<MatchedRequest>, DatabaseError> {
        let request = match self.ordered(query, store).await {
            Ok(found) => found,
            Err(DatabaseError::IndexUnavailable { collection, reason }) => {
                warn!(%collection, %reason, "Ordered query unavailable, scanning internet requests");
                self.scan(query, store).await?
            }
            Err(e) => return Err(e),
        };
        Ok(request.map(|r| MatchedRequest::new(r, MatchSource::InternetVendor)))
    }
}

/// Last resort: every vendor's recent pending requests, filtered by address.
pub struct CrossVendorStrategy;

#[async_trait]
impl MatchStrategy for CrossVendorStrategy {
    fn name(&self) -> &'static str {
        "cross_vendor"
    }

    async fn find(&self, query: &MatchQuery, store: &dyn Database) -> Result<Option<MatchedRequest>, DatabaseError> {
        let subject = query.subject.to_lowercase();
        if !REQUEST_WORDS.iter().any(|w| subject.contains(w)) {
            return Ok(None);
        }
        let pending = store.recent_pending_requests(CROSS_VENDOR_SCAN_LIMIT).await?;
        Ok(pending
            .into_iter()
            .find(|r| r.vendor_email == query.from_email)
            .map(|r| MatchedRequest::new(r, MatchSource::CrossVendorScan)))
    }
}

/// Ordered chain of match strategies.
pub struct Matcher {
    strategies: Vec<Box<dyn MatchStrategy>>,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::default_chain()
    }
}

impl Matcher {
    /// Registered vendors, then internet vendors, then the cross-vendor scan.
    pub fn default_chain() -> Self {
        Self::new(vec![
            Box::new(RegisteredVendorStrategy),
            Box::new(InternetVendorStrategy),
            Box::new(CrossVendorStrategy),
        ])
    }

    pub fn new(strategies: Vec<Box<dyn MatchStrategy>>) -> Self {
        Self { strategies }
    }

    /// Find the request `query` answers, or `None` when nothing matches.
    pub async fn find_matching_request(&self, query: &MatchQuery, store: &dyn Database) -> Option<MatchedRequest> {
        for strategy in &self.strategies {
            match strategy.find(query, store).await {
                Ok(Some(found)) => {
                    info!(
                        request_id = %found.request_id,
                        source = found.source.label(),
                        strategy = strategy.name(),
                        "Matched quote request"
                    );
                    return Some(found);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(strategy = strategy.name(), error = %e, "Match strategy failed, trying next");
                }
            }
        }
        info!(from = %query.from_email, "No matching quote request");
        None
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::quotes::{Vendor, VendorOrigin};
    use crate::store::InMemoryStore;

    fn vendor(id: &str, email: &str) -> Vendor {
        Vendor {
            id: id.into(),
            name: "Foto Perfecta".into(),
            contact_email: Some(email.into()),
            category: Some("fotografia".into()),
        }
    }

    fn registered(vendor_id: &str, email: &str, status: RequestStatus) -> QuoteRequest {
        QuoteRequest::pending(VendorOrigin::Registered, Some(vendor_id.into()), email, "Foto Perfecta")
            .with_status(status)
    }

    fn internet(email: &str, status: RequestStatus, age_days: i64) -> QuoteRequest {
        QuoteRequest::pending(VendorOrigin::Internet, None, email, "Foto Web")
            .with_status(status)
            .with_created_at(Utc::now() - Duration::days(age_days))
    }

    fn query(subject: &str) -> MatchQuery {
        MatchQuery::new("Info@Vendor.com", subject, "")
    }

    #[tokio::test]
    async fn pending_beats_quoted() {
        let store = InMemoryStore::new();
        store.add_vendor(vendor("v-1", "info@vendor.com")).await;
        store.add_request(registered("v-1", "info@vendor.com", RequestStatus::Quoted)).await;
        let pending = registered("v-1", "info@vendor.com", RequestStatus::Pending);
        let pending_id = pending.id.clone();
        store.add_request(pending).await;

        let found = Matcher::default_chain()
            .find_matching_request(&query("Re: hola"), &store)
            .await
            .unwrap();
        assert_eq!(found.request_id, pending_id);
        assert_eq!(found.source, MatchSource::RegisteredVendor);
        assert_eq!(found.vendor_id.as_deref(), Some("v-1"));
    }

    #[tokio::test]
    async fn quoted_is_returned_when_alone() {
        let store = InMemoryStore::new();
        store.add_vendor(vendor("v-1", "info@vendor.com")).await;
        let quoted = registered("v-1", "info@vendor.com", RequestStatus::Quoted);
        let quoted_id = quoted.id.clone();
        store.add_request(quoted).await;

        let found = Matcher::default_chain()
            .find_matching_request(&query("Re: hola"), &store)
            .await
            .unwrap();
        assert_eq!(found.request_id, quoted_id);
    }

    #[tokio::test]
    async fn internet_fallback_when_index_missing() {
        let store = InMemoryStore::new();
        store.add_request(internet("info@vendor.com", RequestStatus::Pending, 5)).await;
        let newest = internet("info@vendor.com", RequestStatus::Quoted, 1);
        let newest_id = newest.id.clone();
        store.add_request(newest).await;
        store.add_request(internet("info@vendor.com", RequestStatus::Rejected, 0)).await;
        store.set_indexes_available(false);

        let found = Matcher::default_chain()
            .find_matching_request(&query("Re: hola"), &store)
            .await
            .unwrap();
        assert_eq!(found.request_id, newest_id);
        assert_eq!(found.source, MatchSource::InternetVendor);
    }

    #[tokio::test]
    async fn internet_ordered_prefers_pending() {
        let store = InMemoryStore::new();
        let pending = internet("info@vendor.com", RequestStatus::Pending, 5);
        let pending_id = pending.id.clone();
        store.add_request(pending).await;
        store.add_request(internet("info@vendor.com", RequestStatus::Quoted, 1)).await;

        let found = Matcher::default_chain()
            .find_matching_request(&query("Re: hola"), &store)
            .await
            .unwrap();
        assert_eq!(found.request_id, pending_id);
    }

    #[tokio::test]
    async fn cross_vendor_scan_needs_request_vocabulary() {
        let store = InMemoryStore::new();
        // Registered request whose vendor profile carries a different address.
        store.add_vendor(vendor("v-9", "office@studio.com")).await;
        let request = registered("v-9", "info@vendor.com", RequestStatus::Pending);
        let request_id = request.id.clone();
        store.add_request(request).await;

        let matcher = Matcher::default_chain();
        assert!(matcher.find_matching_request(&query("Re: hola"), &store).await.is_none());

        let found = matcher
            .find_matching_request(&query("Re: Solicitud de presupuesto"), &store)
            .await
            .unwrap();
        assert_eq!(found.request_id, request_id);
        assert_eq!(found.source, MatchSource::CrossVendorScan);
    }

    #[tokio::test]
    async fn no_match_returns_none() {
        let store = InMemoryStore::new();
        store.set_indexes_available(false);
        assert!(
            Matcher::default_chain()
                .find_matching_request(&query("Re: presupuesto"), &store)
                .await
                .is_none()
        );
    }

    #[test]
    fn eligible_tie_keeps_first() {
        let at = Utc::now();
        let a = internet("x@y.com", RequestStatus::Pending, 0).with_created_at(at);
        let b = internet("x@y.com", RequestStatus::Quoted, 0).with_created_at(at);
        let a_id = a.id.clone();
        assert_eq!(most_recent_eligible(vec![a, b]).unwrap().id, a_id);
    }
}
