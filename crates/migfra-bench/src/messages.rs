//! Wire messages exchanged with the migration-management service.
//!
//! Requests and responses are YAML documents. Task templates are built once
//! from configuration; a [`Request`] is the stamped copy that actually goes on
//! the wire, carrying a fresh correlation id next to the task fields.

use crate::config::VmConfiguration;
use migfra_common::{CorrelationId, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `result` value of a finished migration
pub const RESULT_VM_MIGRATED: &str = "vm migrated";

/// `status` value of a successful task
pub const STATUS_SUCCESS: &str = "success";

/// Task template, tagged by the `task` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task")]
pub enum Task {
    #[serde(rename = "start vm")]
    StartVm(StartVm),
    #[serde(rename = "stop vm")]
    StopVm(StopVm),
    #[serde(rename = "migrate vm")]
    MigrateVm(MigrateVm),
}

impl Task {
    /// VM the task operates on
    pub fn vm_name(&self) -> &str {
        match self {
            Task::StartVm(t) => &t.vm_name,
            Task::StopVm(t) => &t.vm_name,
            Task::MigrateVm(t) => &t.vm_name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Task::StartVm(_) => "start vm",
            Task::StopVm(_) => "stop vm",
            Task::MigrateVm(_) => "migrate vm",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StartVm {
    pub vm_name: String,
    pub vm_configuration: VmConfiguration,
    pub time_measurement: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StopVm {
    pub vm_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MigrateVm {
    pub vm_name: String,
    pub destination: String,
    pub time_measurement: bool,
    pub parameter: MigrationParameters,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MigrationParameters {
    pub live_migration: bool,
    pub rdma_migration: bool,
    pub pscom_hook_procs: u32,
}

/// A task stamped with its correlation id, as published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: CorrelationId,
    #[serde(flatten)]
    pub task: Task,
}

impl Request {
    /// Clone a template and stamp it.
    pub fn stamp(id: CorrelationId, template: &Task) -> Self {
        Self {
            id,
            task: template.clone(),
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn from_yaml(payload: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(payload)?)
    }
}

/// Response published by the management service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Response {
    pub result: String,
    pub id: CorrelationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Sub-phase name -> duration in seconds
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub time_measurement: BTreeMap<String, f64>,
}

impl Response {
    pub fn from_yaml(payload: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(payload)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn is_success(&self) -> bool {
        self.status.as_deref().map_or(true, |s| s == STATUS_SUCCESS)
    }

    /// Successful answer to a `migrate vm` request
    pub fn is_successful_migration(&self) -> bool {
        self.result == RESULT_VM_MIGRATED && self.is_success()
    }
}

/// Only the correlation id of a response; everything else is ignored.
#[derive(Deserialize)]
struct ResponseId {
    id: CorrelationId,
}

/// Extract the correlation id from a raw response payload.
pub fn extract_correlation_id(payload: &str) -> Option<CorrelationId> {
    serde_yaml::from_str::<ResponseId>(payload).ok().map(|r| r.id)
}
