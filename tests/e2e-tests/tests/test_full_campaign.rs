//! Test Scenario 1: Full campaign
//!
//! Runs a whole campaign (start, init, timed phase, stop, evaluation) against
//! the fake migration service and checks round structure, correlation,
//! task runner artifacts and the persisted evaluation.

use e2e_tests::assertions::{
    assert_alternating_rounds, assert_clean_campaign, assert_figures, assert_unique_ids,
};
use e2e_tests::{campaign_config, FakeMigfra, FakeMigfraOptions, RecordingShell};
use migfra_bench::report::EVALUATION_FILE;
use migfra_bench::task_runner::{output_path, runtime_path};
use migfra_bench::Migrator;
use migfra_broker::LocalBroker;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_full_campaign() {
    println!("\n========================================");
    println!("TEST: Full campaign");
    println!("========================================\n");

    let log_dir = tempfile::tempdir().unwrap();
    let broker = LocalBroker::new();
    let migfra = FakeMigfra::start(&broker, FakeMigfraOptions::default()).await;
    let shell = Arc::new(RecordingShell::new(Duration::from_millis(50)));

    // Step 1: rounds: 3 is rounded up to 4
    let config = campaign_config(3, Some(log_dir.path()), true);
    assert_eq!(config.effective_rounds(), 4);
    let migrator = Migrator::new(config, Arc::new(broker.connect()), shell.clone()).unwrap();

    println!("Step 1: Running campaign...");
    let report = migrator.run().await.unwrap();
    println!("{}", report.render_summary());

    // Step 2: lifecycle phases covered every VM, including the stationary one
    let start = report.start_phase.as_ref().expect("start phase ran");
    assert_eq!(start.sent, 3);
    assert!(start.is_complete(), "start phase incomplete: {:?}", start);
    let stop = report.stop_phase.as_ref().expect("stop phase ran");
    assert!(stop.is_complete(), "stop phase incomplete: {:?}", stop);
    assert_eq!(migfra.requests_of_kind("start vm").len(), 3);
    assert_eq!(migfra.requests_of_kind("stop vm").len(), 3);
    println!("✓ VMs started and stopped\n");

    // Step 3: four rounds, alternating, two migrations each
    assert_eq!(report.requester.rounds_dispatched, 4);
    assert_eq!(report.requester.requests_sent, 8);
    assert_eq!(report.receiver.matched, 8);
    assert_clean_campaign(&report).unwrap();
    let requests = migfra.requests();
    assert_alternating_rounds(
        &requests,
        &[("vm1", "node1", "node2"), ("vm2", "node3", "node4")],
        4,
    )
    .unwrap();
    assert_unique_ids(&requests).unwrap();
    assert!(requests.iter().all(|r| r.request.task.vm_name() != "vm3"
        || r.request.task.kind() != "migrate vm"));
    println!("✓ Rounds alternate forth and back\n");

    // Step 4: init ran once before the timed phase, apps ran repeatedly
    assert_eq!(report.init.len(), 1);
    assert!(report.init[0].result.is_ok());
    assert_eq!(shell.calls_for("vm1", "./prepare.sh"), 1);
    assert_eq!(report.runners.len(), 2);
    for runner in &report.runners {
        assert!(runner.iterations >= 2, "{:?}", runner);
        assert_eq!(runner.failures, 0);
    }
    assert!(shell.calls().iter().all(|c| c.user == "root"));
    assert!(output_path(log_dir.path(), "vm1", 0).exists());
    assert!(runtime_path(log_dir.path(), "vm2", 0).exists());
    println!("✓ Task runners produced artifacts\n");

    // Step 5: every answered migration took at least the service delay
    let evaluation = report.evaluation.as_ref().expect("evaluation ran");
    assert_eq!(evaluation.rounds, 4);
    assert_figures(evaluation, "vm1", &["migrate", "pscom-suspend"], 0.0, 2.0).unwrap();
    assert_figures(evaluation, "vm2", &["migrate"], 0.0, 2.0).unwrap();
    assert!(evaluation.figures("vm1").unwrap()["outer"] >= 0.1);
    assert!((evaluation.figures("vm1").unwrap()["migrate"] - 0.08).abs() < 1e-9);
    assert!(evaluation.figures("vm3").is_none());
    assert_eq!(
        report.evaluation_file.as_deref(),
        Some(log_dir.path().join(EVALUATION_FILE).as_path())
    );
    println!("✓ Evaluation written\n");

    migfra.shutdown().await;
}
