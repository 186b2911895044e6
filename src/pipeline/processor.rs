//! Quote-response processor: runs one inbound message through classify,
//! match, extract and apply.
//!
//! Flow:
//! 1. Classifier gate (no I/O)
//! 2. Already-recorded check; the insert is keyed by mail as well, so
//!    concurrent runs still record one response
//! 3. Matcher → the request being answered
//! 4. Extractor (model or heuristic) → `QuoteResponse`
//! 5. Linkage on the mail and the request, then the budget insight

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::{DatabaseError, PipelineError};
use crate::llm::ClientProvider;
use crate::pipeline::applier::InsightApplier;
use crate::pipeline::classifier::is_quote_response;
use crate::pipeline::extractor::{ExtractionInput, Extractor};
use crate::pipeline::matcher::{MatchQuery, Matcher};
use crate::pipeline::types::{
    ApplyRequest, AttachmentText, BudgetInsight, ExtractionResult, InboundMail, Insights, MatchedRequest,
    QuoteOutcome,
};
use crate::quotes::{QuoteResponse, ResponseStatus};
use crate::store::{Database, MailLinkage, ResponseInsert};

/// Source tag on responses created by this pipeline.
pub const EMAIL_AUTO_SOURCE: &str = "email_auto";

/// External text extraction for attachments the mail itself cannot render
/// (PDFs, scans).
#[async_trait]
pub trait AttachmentTextSource: Send + Sync {
    async fn attachment_texts(&self, mail_id: &str) -> Result<Vec<AttachmentText>, PipelineError>;
}

/// End-to-end processor for vendor quote replies.
pub struct QuoteResponseProcessor {
    store: Arc<dyn Database>,
    matcher: Matcher,
    extractor: Extractor,
    applier: InsightApplier,
    attachment_source: Option<Arc<dyn AttachmentTextSource>>,
    batch_concurrency: usize,
}

impl QuoteResponseProcessor {
    pub fn new(store: Arc<dyn Database>, client: Arc<dyn ClientProvider>, config: &PipelineConfig) -> Self {
        Self {
            matcher: Matcher::default_chain(),
            extractor: Extractor::new(client, config),
            applier: InsightApplier::new(Arc::clone(&store), config.budget_scan_limit),
            store,
            attachment_source: None,
            batch_concurrency: config.batch_concurrency.max(1),
        }
    }

    pub fn with_attachment_source(mut self, source: Arc<dyn AttachmentTextSource>) -> Self {
        self.attachment_source = Some(source);
        self
    }

    pub fn with_matcher(mut self, matcher: Matcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Process a single inbound message.
    ///
    /// "Not a quote" and "no match" are outcomes, not errors. Only a failure
    /// to persist the quote response itself is returned as `Err`.
    pub async fn process(&self, mail: &InboundMail) -> Result<QuoteOutcome, PipelineError> {
        debug!(mail_id = %mail.id, sender = %mail.sender, "Processing inbound mail");

        if !is_quote_response(&mail.subject, &mail.body) {
            return Ok(QuoteOutcome::NotQuoteResponse);
        }

        if let Some(existing) = self.store.find_response_for_mail(&mail.id).await? {
            info!(mail_id = %mail.id, response_id = %existing.id, "Quote response already recorded");
            return Ok(QuoteOutcome::AlreadyRecorded {
                response_id: existing.id,
            });
        }

        let query = MatchQuery::new(&mail.sender, mail.subject.clone(), mail.body.clone());
        let Some(matched) = self.matcher.find_matching_request(&query, self.store.as_ref()).await else {
            return Ok(QuoteOutcome::NoMatch);
        };

        let attachments = self.collect_attachments(mail).await;
        let input = ExtractionInput {
            subject: mail.subject.clone(),
            body: mail.body.clone(),
            attachments,
            vendor_name: Some(matched.request.vendor_name.clone()).filter(|n| !n.is_empty()),
            category: matched.request.category_name.clone(),
        };
        let Some(extraction) = self.extractor.analyze(&input, self.store.as_ref()).await else {
            return Ok(QuoteOutcome::NothingExtracted {
                request_id: matched.request_id,
            });
        };

        let response = build_response(mail, &matched, &input, extraction);
        if let ResponseInsert::Existing(existing) = self.store.insert_response(&response).await? {
            info!(mail_id = %mail.id, response_id = %existing.id, "Quote response recorded concurrently");
            return Ok(QuoteOutcome::AlreadyRecorded {
                response_id: existing.id,
            });
        }
        info!(
            mail_id = %mail.id,
            request_id = %matched.request_id,
            response_id = %response.id,
            confidence = response.confidence,
            "Quote response recorded"
        );

        self.link(mail, &matched, &response).await;

        let applied = match matched.request.wedding_id.clone() {
            Some(wedding_id) => Some(
                self.applier
                    .apply(&ApplyRequest {
                        wedding_id,
                        sender: mail.sender.clone(),
                        message_id: mail.id.clone(),
                        insights: budget_insights(&matched, &response),
                        subject: Some(mail.subject.clone()),
                    })
                    .await,
            ),
            None => {
                debug!(request_id = %matched.request_id, "Request has no wedding, skipping insights");
                None
            }
        };

        Ok(QuoteOutcome::Recorded {
            request_id: matched.request_id,
            response_id: response.id,
            source: matched.source,
            total_price: response.total_price,
            confidence: response.confidence,
            provenance: response.provenance.label().to_string(),
            applied,
        })
    }

    /// Process independent messages with bounded concurrency, keeping input
    /// order. Failed messages are logged and left out of the result.
    pub async fn process_batch(&self, mails: Vec<InboundMail>) -> Vec<(String, QuoteOutcome)> {
        let total = mails.len();
        info!(total, concurrency = self.batch_concurrency, "Processing mail batch");

        let results: Vec<(String, QuoteOutcome)> = stream::iter(mails)
            .map(|mail| async move {
                match self.process(&mail).await {
                    Ok(outcome) => Some((mail.id, outcome)),
                    Err(e) => {
                        error!(mail_id = %mail.id, error = %e, "Failed to process mail in batch");
                        None
                    }
                }
            })
            .buffered(self.batch_concurrency)
            .filter_map(|r| async move { r })
            .collect()
            .await;

        info!(processed = results.len(), total, "Batch processing complete");
        results
    }

    /// Move a quote response to a new review status.
    pub async fn update_response_status(
        &self,
        response_id: &str,
        status: &str,
        notes: Option<String>,
    ) -> Result<QuoteResponse, PipelineError> {
        let status: ResponseStatus = status.parse().map_err(PipelineError::InvalidStatus)?;
        let mut response = self
            .store
            .get_response(response_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "quote_response".to_string(),
                id: response_id.to_string(),
            })?;
        response.transition(status, notes);
        self.store.save_response(&response).await?;
        info!(response_id, status = ?status, "Quote response status updated");
        Ok(response)
    }

    async fn collect_attachments(&self, mail: &InboundMail) -> Vec<AttachmentText> {
        let mut attachments = mail.attachments.clone();
        if let Some(source) = &self.attachment_source {
            match source.attachment_texts(&mail.id).await {
                Ok(extra) => attachments.extend(extra),
                Err(e) => warn!(mail_id = %mail.id, error = %e, "Attachment text extraction failed"),
            }
        }
        attachments
    }

    /// Stamp the mail and mark the request quoted. Failures are logged.
    async fn link(&self, mail: &InboundMail, matched: &MatchedRequest, response: &QuoteResponse) {
        let linkage = MailLinkage {
            linked_quote_request_id: Some(matched.request_id.clone()),
            linked_quote_response_id: Some(response.id.clone()),
            wedding_id: matched.request.wedding_id.clone(),
            owner_uid: matched.request.user_id.clone(),
            updated_at: Some(Utc::now()),
            ..MailLinkage::default()
        };
        if let Err(e) = self.store.stamp_mail(&mail.id, linkage).await {
            warn!(mail_id = %mail.id, error = %e, "Failed to stamp mail linkage");
        }

        if let Err(e) = self
            .store
            .mark_request_quoted(matched.request.origin, &matched.request_id, &response.id, Utc::now())
            .await
        {
            warn!(request_id = %matched.request_id, error = %e, "Failed to mark request quoted");
        }
    }
}

fn build_response(
    mail: &InboundMail,
    matched: &MatchedRequest,
    input: &ExtractionInput,
    extraction: ExtractionResult,
) -> QuoteResponse {
    let request = &matched.request;
    let now = Utc::now();
    QuoteResponse {
        id: Uuid::new_v4().to_string(),
        request_id: matched.request_id.clone(),
        vendor_id: matched.vendor_id.clone(),
        mail_id: mail.id.clone(),
        vendor_email: request.vendor_email.clone(),
        vendor_name: request.vendor_name.clone(),
        wedding_id: request.wedding_id.clone(),
        user_id: request.user_id.clone(),
        client_name: request.contact.name.clone(),
        client_email: request.contact.email.clone(),
        total_price: extraction.total_price,
        price_breakdown: extraction.price_breakdown,
        services_included: extraction.services_included,
        extras: extraction.extras,
        payment_terms: extraction.payment_terms,
        delivery_time: extraction.delivery_time,
        cancellation_policy: extraction.cancellation_policy,
        warranty: extraction.warranty,
        notes: extraction.additional_notes,
        confidence: extraction.confidence,
        provenance: extraction.provenance,
        analyzed_at: extraction.analyzed_at,
        email_subject: mail.subject.clone(),
        has_attachments: mail.attachment_count > 0 || !input.attachments.is_empty(),
        attachment_count: mail.attachment_count.max(input.attachments.len()),
        status: ResponseStatus::Received,
        source: EMAIL_AUTO_SOURCE.to_string(),
        created_at: now,
        updated_at: now,
        accepted_at: None,
        rejected_at: None,
        status_notes: None,
    }
}

/// One budget line for the quoted service. Status comes from the subject.
fn budget_insights(matched: &MatchedRequest, response: &QuoteResponse) -> Insights {
    let request = &matched.request;
    let description = request
        .category_name
        .clone()
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| request.vendor_name.clone());
    Insights {
        budgets: vec![BudgetInsight {
            description: Some(description),
            amount: response.total_price,
            currency: None,
            status: None,
            client: Some(request.vendor_name.clone()).filter(|n| !n.is_empty()),
        }],
        ..Insights::default()
    }
}
