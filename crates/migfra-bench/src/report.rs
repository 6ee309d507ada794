//! Campaign report and its plain-text rendering.

use crate::evaluator::Evaluation;
use crate::lifecycle::LifecycleSummary;
use crate::receiver::ReceiverSummary;
use crate::requester::RequesterSummary;
use crate::task_runner::RunnerSummary;
use migfra_common::{Result, ResultExt};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name of the persisted evaluation inside `log-dir`
pub const EVALUATION_FILE: &str = "evaluation.yaml";

/// Outcome of one initialization command
#[derive(Debug, Clone, PartialEq)]
pub struct InitOutcome {
    pub host: String,
    /// Elapsed time, or the error message of the failed run
    pub result: std::result::Result<Duration, String>,
}

/// Everything a finished campaign produced
#[derive(Debug, Clone, Default)]
pub struct CampaignReport {
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub start_phase: Option<LifecycleSummary>,
    pub init: Vec<InitOutcome>,
    pub requester: RequesterSummary,
    pub receiver: ReceiverSummary,
    pub runners: Vec<RunnerSummary>,
    pub stop_phase: Option<LifecycleSummary>,
    /// Migration requests that never got an answer
    pub unanswered: usize,
    pub evaluation: Option<Evaluation>,
    /// Where the evaluation was persisted, if anywhere
    pub evaluation_file: Option<PathBuf>,
}

impl CampaignReport {
    /// True when the campaign ran its full round budget
    pub fn is_complete(&self) -> bool {
        !self.requester.aborted
    }

    /// Multi-line summary of counters, one worker per line.
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        if let (Some(start), Some(end)) = (self.started_at, self.finished_at) {
            let _ = writeln!(
                out,
                "Campaign: {} .. {} ({}s)",
                start.format("%Y-%m-%d %H:%M:%S"),
                end.format("%H:%M:%S"),
                (end - start).num_seconds()
            );
        }
        if let Some(phase) = &self.start_phase {
            let _ = writeln!(out, "{}", render_phase(phase));
        }
        for init in &self.init {
            match &init.result {
                Ok(elapsed) => {
                    let _ = writeln!(out, "Init {}: {:.3}s", init.host, elapsed.as_secs_f64());
                }
                Err(e) => {
                    let _ = writeln!(out, "Init {}: FAILED ({})", init.host, e);
                }
            }
        }
        let _ = writeln!(
            out,
            "Requests: {} rounds, {} sent, {} publish failures{}",
            self.requester.rounds_dispatched,
            self.requester.requests_sent,
            self.requester.publish_failures,
            if self.requester.aborted { ", ABORTED" } else { "" }
        );
        let _ = writeln!(
            out,
            "Responses: {} matched, {} unanswered, {} stray, {} malformed",
            self.receiver.matched, self.unanswered, self.receiver.stray, self.receiver.malformed
        );
        for runner in &self.runners {
            let _ = writeln!(
                out,
                "App {}: {} iterations, {} failed",
                runner.host, runner.iterations, runner.failures
            );
        }
        if let Some(phase) = &self.stop_phase {
            let _ = writeln!(out, "{}", render_phase(phase));
        }
        out
    }
}

fn render_phase(phase: &LifecycleSummary) -> String {
    let mut line = format!(
        "VM {}: {}/{} acknowledged in {:.1}s",
        phase.phase,
        phase.acknowledged,
        phase.sent,
        phase.elapsed.as_secs_f64()
    );
    if !phase.rejected.is_empty() {
        let _ = write!(line, ", rejected: {}", phase.rejected.join(", "));
    }
    if !phase.unanswered.is_empty() {
        let _ = write!(line, ", unanswered: {}", phase.unanswered.join(", "));
    }
    line
}

/// Render the evaluation as a table: one row per VM, one column per figure.
/// Figures a VM did not report are shown as `-`.
pub fn render_table(evaluation: &Evaluation) -> String {
    if evaluation.is_empty() {
        return "No completed migrations to evaluate\n".to_string();
    }

    let figures = evaluation.figure_names();
    let mut header = vec!["vm".to_string()];
    header.extend(figures.iter().cloned());
    header.push("samples".to_string());

    let rows: Vec<Vec<String>> = evaluation
        .vms
        .iter()
        .map(|(vm, values)| {
            let mut row = vec![vm.clone()];
            row.extend(figures.iter().map(|f| match values.get(f) {
                Some(v) => format!("{:.3}", v),
                None => "-".to_string(),
            }));
            row.push(evaluation.samples.get(vm).copied().unwrap_or(0).to_string());
            row
        })
        .collect();

    let widths: Vec<usize> = (0..header.len())
        .map(|col| {
            rows.iter()
                .map(|r| r[col].len())
                .chain(std::iter::once(header[col].len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    let _ = writeln!(out, "Mean durations in seconds over {} rounds", evaluation.rounds);
    push_row(&mut out, &header, &widths);
    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_row(&mut out, &separator, &widths);
    for row in &rows {
        push_row(&mut out, row, &widths);
    }
    out
}

fn push_row(out: &mut String, cells: &[String], widths: &[usize]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .enumerate()
        .map(|(i, (cell, width))| {
            if i == 0 {
                format!("{:<width$}", cell, width = width)
            } else {
                format!("{:>width$}", cell, width = width)
            }
        })
        .collect();
    let _ = writeln!(out, "{}", line.join("  ").trim_end());
}

/// Persist the evaluation as YAML under `dir`.
pub fn write_evaluation(dir: &Path, evaluation: &Evaluation) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(EVALUATION_FILE);
    let yaml = evaluation.to_yaml()?;
    std::fs::write(&path, yaml)
        .map_err(migfra_common::Error::from)
        .context(format!("Failed to write {}", path.display()))?;
    Ok(path)
}
