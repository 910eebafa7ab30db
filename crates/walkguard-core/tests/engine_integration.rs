//! End-to-end alert lifecycle scenarios: countdown vs. cancellation races,
//! instant alerts, and dispatch exactly-once behavior.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use walkguard_core::alert::AlertEngine;
use walkguard_core::dispatch::{Dispatcher, RetryPolicy};
use walkguard_core::error::GatewayError;
use walkguard_core::storage::database::NewAlert;
use walkguard_core::{
    AlertKind, AlertStatus, AttemptOutcome, CoreError, Database, SandboxGateway, SmsGateway,
    StaticContactDirectory,
};

struct Harness {
    db: Arc<Mutex<Database>>,
    gateway: Arc<SandboxGateway>,
    engine: Arc<AlertEngine>,
}

fn harness(phones: &[&str], countdown: Duration) -> Harness {
    let db = Arc::new(Mutex::new(Database::open_memory().unwrap()));
    let gateway = Arc::new(SandboxGateway::new());
    let dispatcher = Dispatcher::new(
        Arc::clone(&db),
        Arc::new(StaticContactDirectory::new(1, phones)),
        Arc::clone(&gateway) as Arc<dyn SmsGateway>,
        RetryPolicy {
            max_retries: 0,
            base_delay: Duration::from_millis(1),
        },
    );
    let engine = Arc::new(AlertEngine::new(Arc::clone(&db), dispatcher, countdown));
    Harness {
        db,
        gateway,
        engine,
    }
}

fn candidate() -> NewAlert {
    NewAlert {
        user_id: 1,
        session_id: None,
        kind: AlertKind::Scream,
        confidence: 0.95,
        location: None,
        snapshot_url: None,
    }
}

#[tokio::test]
async fn cancel_midway_through_countdown_suppresses_dispatch() {
    // Countdown 200ms, cancel at ~50ms.
    let h = harness(&["+15550001"], Duration::from_millis(200));
    let alert = h.engine.submit(candidate(), false).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    let cancelled = h.engine.cancel(alert.id).unwrap();
    assert_eq!(cancelled.status, AlertStatus::Cancelled);

    // Give a stray timer every chance to fire; it must be a no-op.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let final_state = h.engine.get_alert(alert.id).unwrap();
    assert_eq!(final_state.status, AlertStatus::Cancelled);
    assert!(final_state.triggered_at.is_none());
    assert_eq!(h.gateway.sent_count(), 0);
    assert!(h.db.lock().unwrap().attempts_for_alert(alert.id).unwrap().is_empty());
}

#[tokio::test]
async fn cancel_after_countdown_fails_and_dispatch_happened_once() {
    let h = harness(&["+15550001"], Duration::from_millis(30));
    let alert = h.engine.submit(candidate(), false).await.unwrap();

    let resolved = h.engine.wait_until_resolved(alert.id).await.unwrap();
    assert_eq!(resolved.status, AlertStatus::Triggered);

    let err = h.engine.cancel(alert.id).unwrap_err();
    match err {
        CoreError::InvalidState(msg) => {
            assert!(msg.contains("no longer pending"), "message was: {msg}")
        }
        other => panic!("expected InvalidState, got {other:?}"),
    }
    assert_eq!(h.gateway.sent_count(), 1);
}

#[tokio::test]
async fn instant_sos_with_one_permanent_failure_is_partial() {
    let h = harness(&["+15550001", "+15550002"], Duration::from_secs(60));
    h.gateway
        .fail_next("+15550002", GatewayError::permanent("invalid number"));

    let mut new = candidate();
    new.kind = AlertKind::Sos;
    let alert = h.engine.submit(new, true).await.unwrap();
    assert_eq!(alert.status, AlertStatus::Triggered);

    let attempts = h.db.lock().unwrap().attempts_for_alert(alert.id).unwrap();
    let sent = attempts
        .iter()
        .filter(|a| a.outcome == AttemptOutcome::Sent)
        .count();
    let failed = attempts
        .iter()
        .filter(|a| a.outcome == AttemptOutcome::Failed)
        .count();
    assert_eq!(sent, 1);
    assert_eq!(failed, 1);
    assert_eq!(h.gateway.notified_phones(), vec!["+15550001"]);
}

#[tokio::test]
async fn cancellation_race_has_exactly_one_winner() {
    // Force the race: an immediate countdown and a concurrent cancel. Over
    // many rounds both interleavings occur, and in every round exactly one
    // side must win.
    for _ in 0..25 {
        let h = harness(&["+15550001"], Duration::from_millis(2));
        let alert = h.engine.submit(candidate(), false).await.unwrap();

        let engine = Arc::clone(&h.engine);
        let id = alert.id;
        let cancel = tokio::spawn(async move { engine.cancel(id) });
        let cancel_result = cancel.await.unwrap();

        // Let any in-flight trigger/dispatch finish.
        let final_state = loop {
            let a = h.engine.get_alert(alert.id).unwrap();
            if a.status != AlertStatus::Pending {
                break a;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        tokio::time::sleep(Duration::from_millis(30)).await;

        let dispatched = h.gateway.sent_count();
        match cancel_result {
            Ok(_) => {
                assert_eq!(final_state.status, AlertStatus::Cancelled);
                assert_eq!(dispatched, 0, "cancelled alert must not dispatch");
            }
            Err(CoreError::InvalidState(_)) => {
                assert_eq!(final_state.status, AlertStatus::Triggered);
                assert_eq!(dispatched, 1, "triggered alert must dispatch exactly once");
            }
            Err(other) => panic!("unexpected cancel error: {other:?}"),
        }
    }
}

#[tokio::test]
async fn instant_alert_with_no_contacts_stays_triggered() {
    let h = harness(&[], Duration::from_secs(60));
    let alert = h.engine.submit(candidate(), true).await.unwrap();

    // The emergency condition stands even though nobody could be notified.
    assert_eq!(alert.status, AlertStatus::Triggered);
    assert_eq!(h.gateway.sent_count(), 0);

    // The failure is visible in the alert's history.
    let events = h.db.lock().unwrap().events_for_alert(alert.id).unwrap();
    assert!(events.iter().any(|r| matches!(
        r.event,
        walkguard_core::Event::DispatchNoContacts { .. }
    )));
}
