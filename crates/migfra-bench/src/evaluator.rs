//! Evaluator - per-VM mean durations over the completed campaign.
//!
//! Only completed records whose response reports a successful migration take
//! part. Sums are divided by the round budget, not by the number of samples,
//! so lost responses lower a VM's coverage rather than skewing its mean.

use crate::messages::Response;
use crate::store::CorrelationRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Round-trip figure measured by the harness itself
pub const OUTER_FIGURE: &str = "outer";

/// Figure name -> mean duration in seconds
pub type Figures = BTreeMap<String, f64>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Divisor used for every mean
    pub rounds: u32,
    /// VM name -> figures
    pub vms: BTreeMap<String, Figures>,
    /// VM name -> number of successful migrations that contributed
    pub samples: BTreeMap<String, usize>,
}

impl Evaluation {
    pub fn figures(&self, vm_name: &str) -> Option<&Figures> {
        self.vms.get(vm_name)
    }

    pub fn is_empty(&self) -> bool {
        self.vms.is_empty()
    }

    /// Union of all figure names, `outer` first.
    pub fn figure_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .vms
            .values()
            .flat_map(|f| f.keys().cloned())
            .filter(|n| n != OUTER_FIGURE)
            .collect();
        names.sort();
        names.dedup();
        if !self.is_empty() {
            names.insert(0, OUTER_FIGURE.to_string());
        }
        names
    }

    pub fn to_yaml(&self) -> migfra_common::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Aggregate the records of one campaign.
pub fn evaluate(records: &[CorrelationRecord], rounds: u32) -> Evaluation {
    let mut evaluation = Evaluation {
        rounds,
        ..Default::default()
    };
    if rounds == 0 {
        return evaluation;
    }

    for record in records {
        let (Some(elapsed), Some(payload)) = (record.elapsed(), record.response.as_deref()) else {
            continue;
        };
        let response = match Response::from_yaml(payload) {
            Ok(response) if response.is_successful_migration() => response,
            Ok(response) => {
                debug!(id = %record.id, result = %response.result, "Skipping unsuccessful response");
                continue;
            }
            Err(e) => {
                debug!(id = %record.id, error = %e, "Skipping unparsable response");
                continue;
            }
        };

        let vm_name = response.vm_name.clone().unwrap_or_else(|| record.vm_name.clone());
        let sums = evaluation.vms.entry(vm_name.clone()).or_default();
        *sums.entry(OUTER_FIGURE.to_string()).or_default() += elapsed.as_secs_f64();
        for (figure, seconds) in &response.time_measurement {
            *sums.entry(figure.clone()).or_default() += seconds;
        }
        *evaluation.samples.entry(vm_name).or_default() += 1;
    }

    let divisor = f64::from(rounds);
    for figures in evaluation.vms.values_mut() {
        for value in figures.values_mut() {
            *value /= divisor;
        }
    }

    evaluation
}
