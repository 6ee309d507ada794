use super::*;
use anyhow::{anyhow, Result};
use std::collections::HashSet;

/// Upper bound for every configured wait; keeps deadline arithmetic in range.
pub const MAX_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

/// Validate the complete configuration
pub fn validate_config(config: &BenchConfig) -> Result<()> {
    validate_campaign_options(config)?;
    validate_topics(config)?;
    validate_bench_entries(&config.bench_config)?;

    Ok(())
}

/// Validate round, timing and broker options
fn validate_campaign_options(config: &BenchConfig) -> Result<()> {
    if config.rounds == 0 {
        return Err(anyhow!("rounds must be greater than 0"));
    }

    // Rounding up to an even budget must not overflow
    if config.rounds == u32::MAX {
        return Err(anyhow!("rounds must be less than {}", u32::MAX));
    }

    if config.period == 0 {
        return Err(anyhow!("period must be greater than 0 seconds"));
    }

    for (label, wait) in [
        ("period", config.period()),
        ("grace-period", config.grace_period()),
        ("message-delay", config.message_delay),
        ("lifecycle-timeout", config.lifecycle_timeout),
    ] {
        if wait > MAX_WAIT {
            return Err(anyhow!(
                "{} must not exceed {}s (got {}s)",
                label,
                MAX_WAIT.as_secs(),
                wait.as_secs()
            ));
        }
    }

    if config.mqtt_broker.trim().is_empty() {
        return Err(anyhow!("mqtt_broker cannot be empty"));
    }

    if config.ssh_user.trim().is_empty() {
        return Err(anyhow!("ssh-user cannot be empty"));
    }

    if config.lifecycle_timeout == Duration::ZERO {
        return Err(anyhow!("lifecycle-timeout must be greater than 0"));
    }

    Ok(())
}

/// Validate request/response topics
fn validate_topics(config: &BenchConfig) -> Result<()> {
    if !config.request_topic.contains(HOSTNAME_PLACEHOLDER) {
        return Err(anyhow!(
            "request_topic must contain the {} placeholder: {}",
            HOSTNAME_PLACEHOLDER,
            config.request_topic
        ));
    }

    if config.request_topic.contains('+') || config.request_topic.contains('#') {
        return Err(anyhow!(
            "request_topic cannot contain MQTT wildcards: {}",
            config.request_topic
        ));
    }

    if config.response_topic.trim().is_empty() {
        return Err(anyhow!("response_topic cannot be empty"));
    }

    Ok(())
}

/// Validate all VM entries
fn validate_bench_entries(entries: &[BenchEntry]) -> Result<()> {
    if entries.is_empty() {
        return Err(anyhow!("bench-config must list at least one VM"));
    }

    // Check for duplicate VM names
    let mut names = HashSet::new();
    for entry in entries {
        if !names.insert(entry.vm_name()) {
            return Err(anyhow!("Duplicate vm-name: {}", entry.vm_name()));
        }

        validate_bench_entry(entry)?;
    }

    Ok(())
}

/// Validate a single VM entry
fn validate_bench_entry(entry: &BenchEntry) -> Result<()> {
    if entry.vm_name().trim().is_empty() {
        return Err(anyhow!("vm-name cannot be empty"));
    }

    if entry.source.trim().is_empty() || entry.destination.trim().is_empty() {
        return Err(anyhow!(
            "source and destination are required for VM {}",
            entry.vm_name()
        ));
    }

    // Host names end up as MQTT topic levels
    for host in [&entry.source, &entry.destination] {
        if host.contains('/') || host.contains('+') || host.contains('#') {
            return Err(anyhow!(
                "Host name cannot contain '/', '+' or '#': {} (VM {})",
                host,
                entry.vm_name()
            ));
        }
    }

    for (label, command) in [("init-app", &entry.init_app), ("app", &entry.app)] {
        if matches!(command, Some(c) if c.trim().is_empty()) {
            return Err(anyhow!("{} for VM {} cannot be empty", label, entry.vm_name()));
        }
    }

    Ok(())
}
