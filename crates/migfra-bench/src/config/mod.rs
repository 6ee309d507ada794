use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};

pub mod validation;

/// Placeholder substituted with a host name in `request_topic`
pub const HOSTNAME_PLACEHOLDER: &str = "<hostname>";

/// Top-level benchmark configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BenchConfig {
    /// Broker address, `host[:port]`
    #[serde(rename = "mqtt_broker", default = "default_mqtt_broker")]
    pub mqtt_broker: String,

    /// Request topic template, must contain `<hostname>`
    #[serde(rename = "request_topic", default = "default_request_topic")]
    pub request_topic: String,

    /// Topic filter responses arrive on
    #[serde(rename = "response_topic", default = "default_response_topic")]
    pub response_topic: String,

    /// Number of migration rounds (rounded up to an even number)
    pub rounds: u32,

    /// Seconds between round starts
    pub period: u64,

    #[serde(default)]
    pub start_stop_vms: bool,

    #[serde(default = "default_true")]
    pub evaluate: bool,

    /// Directory for task runner artifacts and the evaluation dump
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// User for remote-shell sessions on the VMs
    #[serde(default = "default_ssh_user")]
    pub ssh_user: String,

    /// Wait between the last round and the completion signal (defaults to `period`)
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "option_duration_serde"
    )]
    pub grace_period: Option<Duration>,

    /// Pause between two publishes of the same round
    #[serde(
        default = "default_message_delay",
        with = "duration_serde"
    )]
    pub message_delay: Duration,

    /// Maximum wait for start/stop acknowledgements
    #[serde(
        default = "default_lifecycle_timeout",
        with = "duration_serde"
    )]
    pub lifecycle_timeout: Duration,

    pub bench_config: Vec<BenchEntry>,
}

/// One benchmarked VM and the host pair it travels between
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BenchEntry {
    pub source: String,
    pub destination: String,
    pub vm_configuration: VmConfiguration,
    #[serde(default = "default_true")]
    pub live_migration: bool,
    #[serde(default)]
    pub rdma_migration: bool,
    #[serde(default)]
    pub procs_per_vm: u32,
    #[serde(default = "default_true")]
    pub time_measurement: bool,
    /// Command run once on the VM before the timed phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_app: Option<String>,
    /// Command run repeatedly on the VM during the timed phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
}

impl BenchEntry {
    pub fn vm_name(&self) -> &str {
        &self.vm_configuration.vm_name
    }

    /// Source and destination are the same host
    pub fn is_stationary(&self) -> bool {
        self.source == self.destination
    }
}

/// VM definition handed to the management service when starting the VM.
///
/// Only `vm-name` is interpreted here; every other key is passed through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmConfiguration {
    #[serde(rename = "vm-name")]
    pub vm_name: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl VmConfiguration {
    pub fn named(vm_name: impl Into<String>) -> Self {
        Self {
            vm_name: vm_name.into(),
            extra: BTreeMap::new(),
        }
    }
}

impl BenchConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::load_from_string(&content)
    }

    /// Load configuration from a YAML string
    pub fn load_from_string(content: &str) -> Result<Self> {
        let config: BenchConfig = serde_yaml::from_str(content)
            .context("Failed to parse YAML configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    /// Round budget actually dispatched: `rounds` rounded up to an even number
    pub fn effective_rounds(&self) -> u32 {
        effective_rounds(self.rounds)
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period)
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period.unwrap_or_else(|| self.period())
    }

    /// Entries that run a workload during the timed phase
    pub fn app_entries(&self) -> impl Iterator<Item = (&BenchEntry, &str)> {
        self.bench_config
            .iter()
            .filter_map(|e| e.app.as_deref().map(|app| (e, app)))
    }

    /// Entries that need a one-shot initialization command
    pub fn init_entries(&self) -> impl Iterator<Item = (&BenchEntry, &str)> {
        self.bench_config
            .iter()
            .filter_map(|e| e.init_app.as_deref().map(|app| (e, app)))
    }
}

/// Rounds up to the next even number so every forth round has its back round.
pub fn effective_rounds(rounds: u32) -> u32 {
    rounds.saturating_add(rounds % 2)
}

// Default value functions
fn default_mqtt_broker() -> String {
    "localhost".to_string()
}

fn default_request_topic() -> String {
    format!("fast/migfra/{}/task", HOSTNAME_PLACEHOLDER)
}

fn default_response_topic() -> String {
    "fast/migfra/+/result".to_string()
}

fn default_true() -> bool {
    true
}

fn default_ssh_user() -> String {
    "root".to_string()
}

fn default_message_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_lifecycle_timeout() -> Duration {
    Duration::from_secs(120)
}

// Custom serialization for Duration
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() != 0 {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        } else {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        // Check for "ms" BEFORE "s" since "ms" ends with 's'
        if let Some(num_str) = s.strip_suffix("ms") {
            let millis: u64 = num_str.trim().parse().map_err(|_| format!("Invalid duration: {}", s))?;
            Ok(Duration::from_millis(millis))
        } else if let Some(num_str) = s.strip_suffix('s') {
            let secs: u64 = num_str.trim().parse().map_err(|_| format!("Invalid duration: {}", s))?;
            Ok(Duration::from_secs(secs))
        } else if let Some(num_str) = s.strip_suffix('m') {
            let mins: u64 = num_str.trim().parse().map_err(|_| format!("Invalid duration: {}", s))?;
            mins.checked_mul(60)
                .map(Duration::from_secs)
                .ok_or_else(|| format!("Duration out of range: {}", s))
        } else {
            Err(format!("Duration must end with 's', 'ms', or 'm': {}", s))
        }
    }
}

// Custom serialization for Option<Duration>
mod option_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => super::duration_serde::serialize(d, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        match opt {
            Some(s) => super::duration_serde::parse_duration(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
