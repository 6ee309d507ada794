//! Custom assertions for E2E tests

use crate::fake_migfra::ReceivedRequest;
use migfra_bench::evaluator::OUTER_FIGURE;
use migfra_bench::messages::Task;
use migfra_bench::{CampaignReport, Evaluation};
use std::collections::HashSet;

/// Assert that migrate requests alternate forth and back, round by round.
///
/// `pairs` lists (vm, source, destination); every round carries one request
/// per pair.
pub fn assert_alternating_rounds(
    requests: &[ReceivedRequest],
    pairs: &[(&str, &str, &str)],
    rounds: usize,
) -> Result<(), String> {
    let migrations: Vec<_> = requests
        .iter()
        .filter_map(|r| match &r.request.task {
            Task::MigrateVm(m) => Some((r.topic.as_str(), m)),
            _ => None,
        })
        .collect();

    if migrations.len() != rounds * pairs.len() {
        return Err(format!(
            "Expected {} migrate requests ({} rounds x {} pairs), got {}",
            rounds * pairs.len(),
            rounds,
            pairs.len(),
            migrations.len()
        ));
    }

    for (round, chunk) in migrations.chunks(pairs.len()).enumerate() {
        let forth = round % 2 == 0;
        for (topic, task) in chunk {
            let (_, source, destination) = pairs
                .iter()
                .find(|(vm, _, _)| *vm == task.vm_name)
                .ok_or_else(|| format!("Unexpected VM {} in round {}", task.vm_name, round + 1))?;
            let (from, to) = if forth {
                (source, destination)
            } else {
                (destination, source)
            };
            if *topic != format!("fast/migfra/{}/task", from) || task.destination != *to {
                return Err(format!(
                    "Round {} ({}) sent {} to {} via {}, expected {} -> {}",
                    round + 1,
                    if forth { "forth" } else { "back" },
                    task.vm_name,
                    task.destination,
                    topic,
                    from,
                    to
                ));
            }
        }
    }

    Ok(())
}

/// Assert that no correlation id was used twice.
pub fn assert_unique_ids(requests: &[ReceivedRequest]) -> Result<(), String> {
    let mut seen = HashSet::new();
    for r in requests {
        if !seen.insert(r.request.id) {
            return Err(format!("Correlation id {} used twice", r.request.id));
        }
    }
    Ok(())
}

/// Assert that a VM has every figure in `figures`, each within `[min, max]`.
pub fn assert_figures(
    evaluation: &Evaluation,
    vm: &str,
    figures: &[&str],
    min: f64,
    max: f64,
) -> Result<(), String> {
    let values = evaluation
        .figures(vm)
        .ok_or_else(|| format!("No evaluation for {}. Evaluation:\n{:#?}", vm, evaluation))?;

    for figure in std::iter::once(&OUTER_FIGURE).chain(figures.iter()) {
        let value = values
            .get(*figure)
            .ok_or_else(|| format!("{} has no figure '{}'", vm, figure))?;
        if !(min..=max).contains(value) {
            return Err(format!(
                "{} figure '{}' = {} outside [{}, {}]",
                vm, figure, value, min, max
            ));
        }
    }

    Ok(())
}

/// Assert that the report has no unanswered requests or transport failures.
pub fn assert_clean_campaign(report: &CampaignReport) -> Result<(), String> {
    if !report.is_complete() {
        return Err("Campaign was aborted".to_string());
    }
    if report.unanswered != 0 {
        return Err(format!("{} requests unanswered", report.unanswered));
    }
    if report.requester.publish_failures != 0 {
        return Err(format!("{} publish failures", report.requester.publish_failures));
    }
    if report.receiver.stray != 0 || report.receiver.malformed != 0 {
        return Err(format!(
            "Unexpected stray ({}) or malformed ({}) responses",
            report.receiver.stray, report.receiver.malformed
        ));
    }
    Ok(())
}
