//! # Migfra Bench
//!
//! Coordination engine of the live-migration benchmark.
//!
//! A campaign migrates every configured VM forth and back between its two
//! hosts for a number of rounds while workload commands keep running inside
//! the VMs. Requests go out over a [`migfra_broker::BrokerChannel`] tagged
//! with correlation ids; responses come back on a separate topic and are
//! matched in the [`CorrelationStore`]. Once the last round has been answered
//! (or the grace period is over) [`evaluate`] turns the
//! store into per-VM mean durations.
//!
//! Worker overview:
//! - [`Requester`] - publishes one round per period, alternating direction
//! - [`Receiver`] - drains responses and completes correlation records
//! - [`TaskRunner`] - runs workload commands on the VMs over a remote shell
//! - [`Migrator`] - sequences start, init, timed phase, stop and evaluation

pub mod catalog;
pub mod config;
pub mod countdown;
pub mod evaluator;
pub mod lifecycle;
pub mod messages;
pub mod migrator;
pub mod receiver;
pub mod report;
pub mod requester;
pub mod store;
pub mod task_runner;

// Re-export main types
pub use catalog::{MigrationTasks, TaskCatalog, TopicTasks};
pub use config::{BenchConfig, BenchEntry, VmConfiguration};
pub use evaluator::{evaluate, Evaluation};
pub use lifecycle::{LifecycleSummary, Phase};
pub use messages::{Request, Response, Task};
pub use migrator::Migrator;
pub use receiver::{Receiver, ReceiverSummary};
pub use report::{render_table, CampaignReport, InitOutcome};
pub use requester::{Requester, RequesterOptions, RequesterSummary, RoundState};
pub use store::{CorrelationRecord, CorrelationStore};
pub use task_runner::{RunnerSummary, TaskRunner};
