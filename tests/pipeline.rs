//! End-to-end pipeline tests over the in-memory bus and stores

use std::sync::{Arc, Mutex};
use std::time::Duration;

use balance_ledger::bus::BusClient;
use balance_ledger::handlers::CommandState;
use balance_ledger::jobs::reconcile;
use balance_ledger::router::SubscriberHandle;
use balance_ledger::store::BalanceStore;
use balance_ledger::{Operation, Topic};

mod common;

#[tokio::test]
async fn test_commands_flow_from_dispatcher_to_both_stores() {
    let pipeline = common::Pipeline::start();
    let dispatcher = pipeline.dispatcher();

    dispatcher.create_account("u1", 100.0).await.unwrap();
    dispatcher.add_amount("u1", 50.0).await.unwrap();
    pipeline.wait_for_processed(2).await;
    assert_eq!(pipeline.balances.get("u1").await, Some(150.0));

    dispatcher.deduct_amount("u1", 200.0).await.unwrap();
    pipeline.wait_for_processed(3).await;

    assert_eq!(pipeline.balances.read("u1").await.unwrap(), -50.0);
    let operations: Vec<(Operation, f64)> = pipeline
        .ledger
        .records()
        .iter()
        .map(|r| (r.operation, r.amount))
        .collect();
    assert_eq!(
        operations,
        vec![
            (Operation::CreateAccount, 100.0),
            (Operation::AddBalance, 50.0),
            (Operation::DeductBalance, -200.0),
        ]
    );

    let report = reconcile(&pipeline.balances, &pipeline.ledger).await.unwrap();
    assert!(report.is_consistent());

    pipeline.stop().await;
}

#[tokio::test]
async fn test_rejected_and_malformed_commands_are_dropped() {
    let pipeline = common::Pipeline::start();
    let dispatcher = pipeline.dispatcher();

    dispatcher.add_amount("ghost", 5.0).await.unwrap();
    pipeline
        .bus
        .publish(Topic::CreateAccount, "u2", b"not json".to_vec())
        .await
        .unwrap();
    pipeline.bus.publish_raw("close-account", "u2", b"{}".to_vec()).unwrap();
    dispatcher.create_account("u2", 1.0).await.unwrap();
    pipeline.wait_for_processed(3).await;

    let stats = pipeline.consumer.stats();
    assert_eq!(stats.complete, 1);
    assert_eq!(stats.failed, 2);
    assert_eq!(pipeline.balances.get("u2").await, Some(1.0));
    assert_eq!(pipeline.balances.get("ghost").await, None);
    assert_eq!(pipeline.ledger.records().len(), 1);

    pipeline.stop().await;
}

#[tokio::test]
async fn test_extra_subscriber_sees_every_matching_message() {
    let audit: Arc<Mutex<Option<SubscriberHandle>>> = Arc::new(Mutex::new(None));
    let slot = audit.clone();
    let pipeline = common::Pipeline::start_with(move |router, _| {
        *slot.lock().unwrap() = Some(router.register([Topic::AddBalance]));
    });
    let mut audit = audit.lock().unwrap().take().unwrap();
    let dispatcher = pipeline.dispatcher();

    dispatcher.create_account("u1", 0.0).await.unwrap();
    dispatcher.add_amount("u1", 1.0).await.unwrap();
    dispatcher.add_amount("u1", 2.0).await.unwrap();
    pipeline.wait_for_processed(3).await;

    let first = tokio::time::timeout(Duration::from_secs(2), audit.recv()).await.unwrap().unwrap();
    let second = tokio::time::timeout(Duration::from_secs(2), audit.recv()).await.unwrap().unwrap();
    assert_eq!(first.topic, "add-balance");
    assert_eq!(second.topic, "add-balance");
    assert!(audit.try_recv().is_none());
    assert_eq!(pipeline.balances.get("u1").await, Some(3.0));

    pipeline.stop().await;
}

#[tokio::test]
async fn test_ledger_outage_leaves_drift_for_reconciliation() {
    let pipeline = common::Pipeline::start();
    let dispatcher = pipeline.dispatcher();

    dispatcher.create_account("u1", 10.0).await.unwrap();
    pipeline.wait_for_processed(1).await;

    pipeline.ledger.set_fail_appends(true);
    dispatcher.add_amount("u1", 5.0).await.unwrap();
    pipeline.wait_for_processed(2).await;
    pipeline.ledger.set_fail_appends(false);

    assert_eq!(pipeline.consumer.stats().partially_complete, 1);
    assert_eq!(pipeline.balances.get("u1").await, Some(15.0));

    let report = reconcile(&pipeline.balances, &pipeline.ledger).await.unwrap();
    assert_eq!(report.drifts.len(), 1);
    assert_eq!(report.drifts[0].difference, 5.0);

    pipeline.stop().await;
}

#[tokio::test]
async fn test_redelivered_create_is_rejected() {
    let pipeline = common::Pipeline::start();
    let dispatcher = pipeline.dispatcher();

    dispatcher.create_account("u1", 1.0).await.unwrap();
    pipeline.wait_for_processed(1).await;

    // Same bus message handed to the handlers a second time
    let redelivered = pipeline.bus.messages().remove(0);
    let state = pipeline.consumer.process(0, &redelivered).await;

    assert_eq!(state, CommandState::Failed);
    assert_eq!(pipeline.balances.get("u1").await, Some(1.0));
    assert_eq!(pipeline.ledger.records().len(), 1);

    pipeline.stop().await;
}
