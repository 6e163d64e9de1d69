mod common;

use async_trait::async_trait;
use common::*;
use fare_engine::domain::audit::AuditOperation;
use fare_engine::domain::booking::PaymentMethod;
use fare_engine::domain::ids::UserId;
use fare_engine::domain::journey::{JourneyMedia, MediaKind};
use fare_engine::domain::money::Amount;
use fare_engine::domain::ports::{FareStore, PaymentGateway, PaymentGatewayRef, PaymentOutcome};
use fare_engine::error::{ErrorKind, FareError, Result};
use fare_engine::infrastructure::config::Config;
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;
use tokio::task::JoinSet;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_debits_cannot_overdraw() {
    let h = harness();
    let card = h.card_with_balance("C-1", dec!(30)).await;

    let mut tasks = JoinSet::new();
    for _ in 0..2 {
        let engine = h.engine.clone();
        let card = card.clone();
        tasks.spawn(async move {
            engine
                .ledger()
                .debit(&card, Amount::new(dec!(20)).unwrap())
                .await
        });
    }

    let mut succeeded = 0;
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(_) => succeeded += 1,
            Err(FareError::InsufficientFunds { .. }) | Err(FareError::ConcurrencyConflict(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(h.engine.card_balance(&card).await.unwrap().value(), dec!(10));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_entries_open_one_journey() {
    let h = harness();
    let card = h.card_with_balance("C-1", dec!(100)).await;

    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let engine = h.engine.clone();
        tasks.spawn(async move { engine.entry(MediaKind::Card, "C-1", S1).await });
    }

    let mut opened = 0;
    while let Some(response) = tasks.join_next().await {
        let response = response.unwrap();
        if response.success {
            opened += 1;
        } else {
            let kind = response.error.unwrap().kind;
            assert!(matches!(
                kind,
                fare_engine::error::ErrorKind::InvalidState | fare_engine::error::ErrorKind::ConcurrencyConflict
            ));
        }
    }

    assert_eq!(opened, 1);
    let active = h.store.active_journey(&JourneyMedia::Card(card)).await.unwrap();
    assert!(active.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_cards_proceed_in_parallel() {
    let h = harness();
    for i in 0..16 {
        h.card_with_balance(&format!("C-{i}"), dec!(100)).await;
    }

    let mut tasks = JoinSet::new();
    for i in 0..16 {
        let engine = h.engine.clone();
        tasks.spawn(async move { engine.entry(MediaKind::Card, &format!("C-{i}"), S1).await });
    }
    while let Some(response) = tasks.join_next().await {
        assert!(response.unwrap().success);
    }

    h.tick();
    let mut tasks = JoinSet::new();
    for i in 0..16 {
        let engine = h.engine.clone();
        tasks.spawn(async move { engine.exit(MediaKind::Card, &format!("C-{i}"), S2).await });
    }
    while let Some(response) = tasks.join_next().await {
        let response = response.unwrap();
        assert!(response.success);
        assert_eq!(response.new_balance.unwrap().value(), dec!(70));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_exits_settle_once() {
    let h = harness();
    // Covers one S1 -> S2 fare of 30, not two.
    let card = h.card_with_balance("C-1", dec!(40)).await;
    assert!(h.engine.entry(MediaKind::Card, "C-1", S1).await.success);
    h.tick();
    let before = h.audit_len().await;

    let mut tasks = JoinSet::new();
    for _ in 0..2 {
        let engine = h.engine.clone();
        tasks.spawn(async move { engine.exit(MediaKind::Card, "C-1", S2).await });
    }

    let mut settled = 0;
    while let Some(response) = tasks.join_next().await {
        let response = response.unwrap();
        if response.success {
            settled += 1;
            assert_eq!(response.new_balance.unwrap().value(), dec!(10));
        } else {
            let kind = response.error.unwrap().kind;
            assert!(matches!(
                kind,
                ErrorKind::InvalidState | ErrorKind::ConcurrencyConflict | ErrorKind::InsufficientFunds
            ));
        }
    }

    assert_eq!(settled, 1);
    assert_eq!(h.engine.card_balance(&card).await.unwrap().value(), dec!(10));
    let log = h.store.audit_log().await.unwrap();
    let debits = log[before..].iter().filter(|e| e.entity_name == "smart_card").count();
    assert_eq!(debits, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ticket_entries_use_ticket_once() {
    let h = harness();
    let token = h.book(S1, S2).await;
    let before = h.audit_len().await;

    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let engine = h.engine.clone();
        let token = token.clone();
        tasks.spawn(async move { engine.entry(MediaKind::Ticket, &token, S1).await });
    }

    let mut opened = 0;
    while let Some(response) = tasks.join_next().await {
        let response = response.unwrap();
        if response.success {
            opened += 1;
        } else {
            let kind = response.error.unwrap().kind;
            assert!(matches!(kind, ErrorKind::InvalidState | ErrorKind::ConcurrencyConflict));
        }
    }
    assert_eq!(opened, 1);

    let ticket = h.ticket(&token).await;
    assert!(ticket.is_used);
    let active = h.store.active_journey(&JourneyMedia::Ticket(ticket.id)).await.unwrap();
    assert!(active.is_some());

    let log = h.store.audit_log().await.unwrap();
    let new_entries = &log[before..];
    let ticket_updates = new_entries
        .iter()
        .filter(|e| e.entity_name == "ticket" && e.operation == AuditOperation::Update)
        .count();
    let journeys_created = new_entries
        .iter()
        .filter(|e| e.entity_name == "journey" && e.operation == AuditOperation::Create)
        .count();
    assert_eq!(ticket_updates, 1);
    assert_eq!(journeys_created, 1);
}

/// Gateway that parks inside `charge` until the test releases it.
#[derive(Default)]
struct HoldingGateway {
    entered: Notify,
    release: Notify,
    charges: AtomicUsize,
    refunds: Mutex<Vec<String>>,
}

#[async_trait]
impl PaymentGateway for HoldingGateway {
    async fn charge(&self, _user: &UserId, _amount: Amount, _method: PaymentMethod) -> Result<PaymentOutcome> {
        let n = self.charges.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.release.notified().await;
        Ok(PaymentOutcome::Approved {
            reference: format!("held-{n}"),
        })
    }

    async fn refund(&self, reference: &str) -> Result<()> {
        self.refunds.lock().push(reference.to_string());
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_recharge_losing_race_refunds_charge() {
    let gateway = Arc::new(HoldingGateway::default());
    let shared: PaymentGatewayRef = gateway.clone();
    let h = harness_with(Config::default(), shared, None);
    let card = h.card_with_balance("C-1", dec!(50)).await;
    let before = h.audit_len().await;

    let engine = h.engine.clone();
    let target = card.clone();
    let recharge = tokio::spawn(async move {
        engine
            .recharge_card(&UserId::new("rider"), &target, dec!(20), PaymentMethod::Upi)
            .await
    });

    // A gate debit lands while the top-up is waiting on the gateway.
    gateway.entered.notified().await;
    h.engine
        .ledger()
        .debit(&card, Amount::new(dec!(30)).unwrap())
        .await
        .unwrap();
    gateway.release.notify_one();

    let result = recharge.await.unwrap();
    assert!(matches!(result, Err(FareError::ConcurrencyConflict(_))));
    assert_eq!(gateway.charges.load(Ordering::SeqCst), 1);
    assert_eq!(*gateway.refunds.lock(), vec!["held-0".to_string()]);

    // Only the debit was written.
    let log = h.store.audit_log().await.unwrap();
    let names: Vec<&str> = log[before..].iter().map(|e| e.entity_name.as_str()).collect();
    assert_eq!(names, vec!["smart_card"]);
    assert_eq!(h.engine.card_balance(&card).await.unwrap().value(), dec!(20));
}
