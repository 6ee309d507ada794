//! Task Catalog - turns the bench configuration into task collections.
//!
//! Four collections come out of one configuration: start tasks, stop tasks and
//! one migration collection per direction. Every collection maps a request
//! topic to the ordered tasks published on it; several VMs may share a topic
//! when they live on the same host.

use crate::config::{BenchConfig, BenchEntry, HOSTNAME_PLACEHOLDER};
use crate::messages::{MigrateVm, MigrationParameters, StartVm, StopVm, Task};
use migfra_common::{Direction, Error, Result};
use std::collections::BTreeMap;

/// Ordered tasks per request topic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopicTasks {
    by_topic: BTreeMap<String, Vec<Task>>,
}

impl TopicTasks {
    pub fn push(&mut self, topic: String, task: Task) {
        self.by_topic.entry(topic).or_default().push(task);
    }

    /// All (topic, task) pairs in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Task)> {
        self.by_topic
            .iter()
            .flat_map(|(topic, tasks)| tasks.iter().map(move |t| (topic.as_str(), t)))
    }

    pub fn tasks_for(&self, topic: &str) -> &[Task] {
        self.by_topic.get(topic).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of tasks across all topics.
    pub fn len(&self) -> usize {
        self.by_topic.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Migration tasks for both directions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationTasks {
    pub forth: TopicTasks,
    pub back: TopicTasks,
}

impl MigrationTasks {
    pub fn get(&self, direction: Direction) -> &TopicTasks {
        match direction {
            Direction::Forth => &self.forth,
            Direction::Back => &self.back,
        }
    }
}

/// Every task collection of one campaign. Read-only once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskCatalog {
    pub start: TopicTasks,
    pub stop: TopicTasks,
    pub migration: MigrationTasks,
}

impl TaskCatalog {
    /// Build all collections, failing on malformed entries before any
    /// network activity happens.
    pub fn build(config: &BenchConfig) -> Result<Self> {
        if !config.request_topic.contains(HOSTNAME_PLACEHOLDER) {
            return Err(Error::config(format!(
                "request_topic '{}' has no {} placeholder",
                config.request_topic, HOSTNAME_PLACEHOLDER
            )));
        }

        let mut catalog = TaskCatalog::default();
        for entry in &config.bench_config {
            check_entry(entry)?;

            let source_topic = request_topic(&config.request_topic, &entry.source);

            catalog.start.push(
                source_topic.clone(),
                Task::StartVm(StartVm {
                    vm_name: entry.vm_name().to_string(),
                    vm_configuration: entry.vm_configuration.clone(),
                    time_measurement: entry.time_measurement,
                }),
            );
            catalog.stop.push(
                source_topic.clone(),
                Task::StopVm(StopVm {
                    vm_name: entry.vm_name().to_string(),
                }),
            );

            if entry.is_stationary() {
                continue;
            }

            catalog
                .migration
                .forth
                .push(source_topic, migrate_task(entry, &entry.destination));
            catalog.migration.back.push(
                request_topic(&config.request_topic, &entry.destination),
                migrate_task(entry, &entry.source),
            );
        }

        Ok(catalog)
    }
}

/// Substitute a host name into the request topic template.
pub fn request_topic(template: &str, host: &str) -> String {
    template.replace(HOSTNAME_PLACEHOLDER, host)
}

fn migrate_task(entry: &BenchEntry, destination: &str) -> Task {
    Task::MigrateVm(MigrateVm {
        vm_name: entry.vm_name().to_string(),
        destination: destination.to_string(),
        time_measurement: entry.time_measurement,
        parameter: MigrationParameters {
            live_migration: entry.live_migration,
            rdma_migration: entry.rdma_migration,
            pscom_hook_procs: entry.procs_per_vm,
        },
    })
}

fn check_entry(entry: &BenchEntry) -> Result<()> {
    if entry.vm_name().trim().is_empty() {
        return Err(Error::config("bench-config entry without vm-name"));
    }
    if entry.source.trim().is_empty() || entry.destination.trim().is_empty() {
        return Err(Error::config(format!(
            "VM {} needs both source and destination",
            entry.vm_name()
        )));
    }
    Ok(())
}
