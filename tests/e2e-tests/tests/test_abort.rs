//! Test Scenario 3: User abort
//!
//! Cancels the abort token while rounds are still being dispatched. The
//! campaign must stop every worker promptly, still stop the VMs and evaluate
//! the rounds that did complete.

use e2e_tests::{campaign_config, FakeMigfra, FakeMigfraOptions, RecordingShell};
use migfra_bench::Migrator;
use migfra_broker::LocalBroker;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_abort_mid_campaign() {
    println!("\n========================================");
    println!("TEST: Abort mid campaign");
    println!("========================================\n");

    let broker = LocalBroker::new();
    let migfra = FakeMigfra::start(&broker, FakeMigfraOptions::default()).await;
    let shell = Arc::new(RecordingShell::new(Duration::from_millis(20)));

    let migrator = Migrator::new(
        campaign_config(20, None, true),
        Arc::new(broker.connect()),
        shell,
    )
    .unwrap();
    let abort = migrator.abort_token();

    let started = Instant::now();
    let campaign = tokio::spawn(migrator.run());

    // Step 1: let the first rounds go out, then abort
    tokio::time::sleep(Duration::from_millis(1500)).await;
    println!("Step 1: Aborting campaign...");
    abort.cancel();

    let report = tokio::time::timeout(Duration::from_secs(10), campaign)
        .await
        .expect("campaign did not stop after abort")
        .unwrap()
        .unwrap();
    println!("{}", report.render_summary());

    // 20 rounds at 1s each would take far longer
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(report.requester.aborted);
    assert!(!report.is_complete());
    assert!(report.requester.rounds_dispatched >= 1);
    assert!(report.requester.rounds_dispatched < 20);
    println!("✓ Dispatch stopped early\n");

    // Step 2: stop requests still went out (the wait for their acks was cut short)
    tokio::time::sleep(Duration::from_millis(100)).await;
    let stop = report.stop_phase.as_ref().expect("stop phase ran");
    assert_eq!(stop.sent, 3);
    assert_eq!(migfra.requests_of_kind("stop vm").len(), 3);
    println!("✓ VMs stopped after abort\n");

    // Step 3: the evaluation still covers what was answered
    let evaluation = report.evaluation.unwrap();
    assert_eq!(evaluation.rounds, 20);
    assert!(evaluation.samples.get("vm1").copied().unwrap_or(0) >= 1);

    migfra.shutdown().await;
}
