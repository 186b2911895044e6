//! End-to-end runs of the quote pipeline against the in-memory store,
//! without model credentials.

use std::sync::Arc;

use rust_decimal_macros::dec;

use quote_inbox::config::PipelineConfig;
use quote_inbox::llm::{FixedClient, LazyClient};
use quote_inbox::pipeline::{InboundMail, MatchSource, QuoteOutcome, QuoteResponseProcessor};
use quote_inbox::planner::{BudgetKey, BudgetStatus, WeddingSupplier};
use quote_inbox::quotes::{Provenance, QuoteRequest, RequestStatus, VendorOrigin};
use quote_inbox::store::{BudgetStore, InMemoryStore, MailStore, QuoteRequestStore, QuoteResponseStore};

const WEDDING: &str = "w-ana-luis";

async fn seeded_store() -> (Arc<InMemoryStore>, String) {
    let store = Arc::new(InMemoryStore::new());
    let request = QuoteRequest::pending(VendorOrigin::Internet, None, "info@vendor.com", "Foto Perfecta")
        .with_category("fotografia", "Fotografía")
        .with_wedding(WEDDING, "u-ana");
    let request_id = request.id.clone();
    store.add_request(request).await;
    (store, request_id)
}

fn quote_mail(id: &str) -> InboundMail {
    InboundMail::new(
        id,
        "Info@Vendor.com",
        "Re: Presupuesto fotografía",
        "Presupuesto: 2500€, incluye 8 horas",
    )
}

#[tokio::test]
async fn heuristic_quote_is_recorded_linked_and_budgeted() {
    let (store, request_id) = seeded_store().await;
    let processor = QuoteResponseProcessor::new(
        store.clone(),
        Arc::new(FixedClient::none()),
        &PipelineConfig::default(),
    );

    let outcome = processor.process(&quote_mail("mail-1")).await.unwrap();
    let QuoteOutcome::Recorded {
        request_id: matched_id,
        response_id,
        source,
        total_price,
        confidence,
        provenance,
        applied,
    } = outcome
    else {
        panic!("expected a recorded outcome");
    };
    assert_eq!(matched_id, request_id);
    assert_eq!(source, MatchSource::InternetVendor);
    assert_eq!(total_price, Some(dec!(2500)));
    assert_eq!(confidence, 70);
    assert_eq!(provenance, "manual/heuristic");

    let response = store.get_response(&response_id).await.unwrap().unwrap();
    assert_eq!(response.provenance, Provenance::Heuristic);
    assert_eq!(response.source, "email_auto");
    assert_eq!(response.mail_id, "mail-1");
    assert_eq!(response.wedding_id.as_deref(), Some(WEDDING));

    let request = store
        .get_request(VendorOrigin::Internet, &request_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request.status, RequestStatus::Quoted);
    assert_eq!(request.quote_response_id.as_deref(), Some(response_id.as_str()));

    let linkage = store.get_mail_linkage("mail-1").await.unwrap().unwrap();
    assert_eq!(linkage.linked_quote_request_id.as_deref(), Some(request_id.as_str()));
    assert_eq!(linkage.linked_quote_response_id.as_deref(), Some(response_id.as_str()));
    assert_eq!(linkage.wedding_id.as_deref(), Some(WEDDING));

    let applied = applied.expect("request has a wedding");
    assert_eq!(applied.budgets, 1);
    assert_eq!(applied.transactions, 0);

    let budgets = store
        .list_budgets(&BudgetKey {
            wedding_id: WEDDING.to_string(),
            vendor_id: None,
        })
        .await
        .unwrap();
    assert_eq!(budgets.len(), 1);
    assert_eq!(budgets[0].amount, Some(dec!(2500)));
    assert_eq!(budgets[0].status, BudgetStatus::Pending);
    assert_eq!(budgets[0].description, "Fotografía");
}

#[tokio::test]
async fn replaying_the_same_mail_does_not_duplicate() {
    let (store, _) = seeded_store().await;
    let processor = QuoteResponseProcessor::new(
        store.clone(),
        Arc::new(FixedClient::none()),
        &PipelineConfig::default(),
    );

    let first = processor.process(&quote_mail("mail-1")).await.unwrap();
    let QuoteOutcome::Recorded { response_id, .. } = first else {
        panic!("expected a recorded outcome");
    };
    let second = processor.process(&quote_mail("mail-1")).await.unwrap();
    match second {
        QuoteOutcome::AlreadyRecorded { response_id: existing } => assert_eq!(existing, response_id),
        other => panic!("expected already_recorded, got {}", other.label()),
    }
    assert_eq!(store.responses().await.len(), 1);
}

#[tokio::test]
async fn second_quote_for_same_service_updates_budget() {
    let (store, _) = seeded_store().await;
    let processor = QuoteResponseProcessor::new(
        store.clone(),
        Arc::new(FixedClient::none()),
        &PipelineConfig::default(),
    );

    processor.process(&quote_mail("mail-1")).await.unwrap();
    let revised = InboundMail::new(
        "mail-2",
        "info@vendor.com",
        "Re: Presupuesto fotografía",
        "Perdona, el presupuesto es 2520€ con el álbum.",
    );
    let outcome = processor.process(&revised).await.unwrap();
    assert_eq!(outcome.label(), "recorded");

    let budgets = store
        .list_budgets(&BudgetKey {
            wedding_id: WEDDING.to_string(),
            vendor_id: None,
        })
        .await
        .unwrap();
    assert_eq!(budgets.len(), 1);
    assert_eq!(budgets[0].amount, Some(dec!(2520)));
}

#[tokio::test]
async fn internet_match_survives_missing_index() {
    let (store, request_id) = seeded_store().await;
    store.set_indexes_available(false);
    let processor = QuoteResponseProcessor::new(
        store.clone(),
        Arc::new(FixedClient::none()),
        &PipelineConfig::default(),
    );

    match processor.process(&quote_mail("mail-1")).await.unwrap() {
        QuoteOutcome::Recorded {
            request_id: matched,
            total_price,
            ..
        } => {
            assert_eq!(matched, request_id);
            assert_eq!(total_price, Some(dec!(2500)));
        }
        other => panic!("expected recorded, got {}", other.label()),
    }
}

#[tokio::test]
async fn lazy_client_without_credentials_falls_back() {
    let (store, _) = seeded_store().await;
    let config = PipelineConfig::default();
    let client = Arc::new(LazyClient::with_credentials(&config, || None));
    let processor = QuoteResponseProcessor::new(store.clone(), client.clone(), &config);

    match processor.process(&quote_mail("mail-1")).await.unwrap() {
        QuoteOutcome::Recorded {
            confidence, provenance, ..
        } => {
            assert_eq!(confidence, 70);
            assert_eq!(provenance, "manual/heuristic");
        }
        other => panic!("expected recorded, got {}", other.label()),
    }
    assert!(!client.is_initialized());
}

#[tokio::test]
async fn resolved_wedding_supplier_keys_the_budget() {
    let (store, _) = seeded_store().await;
    store
        .add_wedding_supplier(WeddingSupplier {
            id: "s-foto".to_string(),
            wedding_id: WEDDING.to_string(),
            name: "Foto Perfecta".to_string(),
            email: Some("info@vendor.com".to_string()),
        })
        .await;
    let processor = QuoteResponseProcessor::new(
        store.clone(),
        Arc::new(FixedClient::none()),
        &PipelineConfig::default(),
    );

    let outcome = processor.process(&quote_mail("mail-1")).await.unwrap();
    let QuoteOutcome::Recorded { applied, .. } = outcome else {
        panic!("expected a recorded outcome");
    };
    assert_eq!(applied.and_then(|a| a.vendor_id).as_deref(), Some("s-foto"));

    let budgets = store
        .list_budgets(&BudgetKey {
            wedding_id: WEDDING.to_string(),
            vendor_id: Some("s-foto".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(budgets.len(), 1);

    let linkage = store.get_mail_linkage("mail-1").await.unwrap().unwrap();
    assert_eq!(linkage.supplier_id.as_deref(), Some("s-foto"));
}

#[tokio::test]
async fn unrelated_sender_has_no_match() {
    let (store, _) = seeded_store().await;
    let processor = QuoteResponseProcessor::new(
        store.clone(),
        Arc::new(FixedClient::none()),
        &PipelineConfig::default(),
    );
    let mail = InboundMail::new(
        "mail-9",
        "otro@proveedor.es",
        "Re: Tu consulta",
        "Te adjunto el presupuesto de 1200€",
    );
    assert_eq!(processor.process(&mail).await.unwrap().label(), "no_match");
    assert!(store.responses().await.is_empty());
}
