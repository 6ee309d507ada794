// E2E test framework for the migfra benchmark harness

pub mod assertions;
pub mod fake_migfra;
pub mod recording_shell;

pub use fake_migfra::{FakeMigfra, FakeMigfraOptions};
pub use recording_shell::RecordingShell;

use migfra_bench::BenchConfig;
use std::path::Path;

/// Two migrating VMs plus one stationary VM, one-second rounds.
pub fn campaign_config(rounds: u32, log_dir: Option<&Path>, start_stop_vms: bool) -> BenchConfig {
    let mut yaml = format!(
        r#"
rounds: {rounds}
period: 1
grace-period: 500ms
message-delay: 10ms
lifecycle-timeout: 2s
start-stop-vms: {start_stop_vms}
bench-config:
  - source: node1
    destination: node2
    procs-per-vm: 2
    vm-configuration:
      vm-name: vm1
      memory: 2048
    init-app: ./prepare.sh
    app: ./bench --short
  - source: node3
    destination: node4
    rdma-migration: true
    vm-configuration:
      vm-name: vm2
    app: ./bench --short
  - source: node5
    destination: node5
    vm-configuration:
      vm-name: vm3
"#
    );
    if let Some(dir) = log_dir {
        yaml.push_str(&format!("log-dir: {}\n", dir.display()));
    }
    BenchConfig::load_from_string(&yaml).expect("campaign config must be valid")
}
