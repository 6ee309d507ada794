//! Test Scenario 2: Lost, failed and stray responses
//!
//! The fake service never answers vm2, reports failures for vm1 and sprays
//! responses with unknown ids. None of this may abort the campaign; it only
//! shows up as gaps in the evaluation and as counters in the report.

use e2e_tests::{campaign_config, FakeMigfra, FakeMigfraOptions, RecordingShell};
use migfra_bench::Migrator;
use migfra_broker::LocalBroker;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_silent_vm_is_missing_from_evaluation() {
    println!("\n========================================");
    println!("TEST: Silent VM");
    println!("========================================\n");

    let broker = LocalBroker::new();
    let migfra = FakeMigfra::start(
        &broker,
        FakeMigfraOptions {
            silent_vms: vec!["vm2".to_string()],
            send_strays: true,
            ..Default::default()
        },
    )
    .await;
    let shell = Arc::new(RecordingShell::new(Duration::from_millis(20)));

    let migrator = Migrator::new(campaign_config(2, None, false), Arc::new(broker.connect()), shell)
        .unwrap();
    let report = migrator.run().await.unwrap();
    println!("{}", report.render_summary());

    assert!(report.is_complete());
    assert_eq!(report.requester.requests_sent, 4);
    assert_eq!(report.receiver.matched, 2);
    assert_eq!(report.receiver.stray, 2);
    assert_eq!(report.unanswered, 2);
    assert!(report.start_phase.is_none());
    assert!(report.stop_phase.is_none());

    let evaluation = report.evaluation.unwrap();
    assert!(evaluation.figures("vm1").is_some());
    assert!(evaluation.figures("vm2").is_none());
    assert_eq!(evaluation.samples["vm1"], 2);
    println!("✓ Unanswered VM omitted, strays counted\n");

    migfra.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_migrations_are_not_evaluated() {
    println!("\n========================================");
    println!("TEST: Failed migrations");
    println!("========================================\n");

    let broker = LocalBroker::new();
    let migfra = FakeMigfra::start(
        &broker,
        FakeMigfraOptions {
            failing_vms: vec!["vm1".to_string()],
            ..Default::default()
        },
    )
    .await;
    let shell = Arc::new(RecordingShell::new(Duration::from_millis(20)));

    let migrator = Migrator::new(campaign_config(2, None, false), Arc::new(broker.connect()), shell)
        .unwrap();
    let report = migrator.run().await.unwrap();

    // Answered, so not unanswered; but excluded from the figures
    assert_eq!(report.receiver.matched, 4);
    assert_eq!(report.unanswered, 0);
    let evaluation = report.evaluation.unwrap();
    assert!(evaluation.figures("vm1").is_none());
    assert!(evaluation.figures("vm2").is_some());
    println!("✓ Failed migrations excluded\n");

    migfra.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unreachable_vm_does_not_stop_campaign() {
    println!("\n========================================");
    println!("TEST: Unreachable VM");
    println!("========================================\n");

    let broker = LocalBroker::new();
    let migfra = FakeMigfra::start(&broker, FakeMigfraOptions::default()).await;
    let shell = Arc::new(RecordingShell::new(Duration::from_millis(20)).with_unreachable("vm1"));

    let migrator = Migrator::new(
        campaign_config(2, None, false),
        Arc::new(broker.connect()),
        shell.clone(),
    )
    .unwrap();
    let report = migrator.run().await.unwrap();

    assert!(report.init[0].result.is_err());
    let vm1 = report.runners.iter().find(|r| r.host == "vm1").unwrap();
    assert!(vm1.iterations >= 2);
    assert_eq!(vm1.failures, vm1.iterations);
    let vm2 = report.runners.iter().find(|r| r.host == "vm2").unwrap();
    assert_eq!(vm2.failures, 0);

    // Every failed iteration was followed by a fresh attempt
    assert!(shell.calls_for("vm1", "./bench --short") >= 2);
    assert_eq!(report.receiver.matched, 4);
    println!("✓ Remote failures stayed local to their runner\n");

    migfra.shutdown().await;
}
