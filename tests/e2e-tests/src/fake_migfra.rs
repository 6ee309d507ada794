//! In-process stand-in for the migration-management service.
//!
//! Listens on every request topic of a [`LocalBroker`] and answers each task on
//! the matching result topic after a configurable delay.

use migfra_bench::messages::{Request, Response, Task, STATUS_SUCCESS};
use migfra_broker::{BrokerChannel, LocalBroker};
use migfra_common::CorrelationId;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const REQUEST_FILTER: &str = "fast/migfra/+/task";

#[derive(Debug, Clone)]
pub struct FakeMigfraOptions {
    /// Time between receiving a migrate task and answering it
    pub migration_time: Duration,
    /// Sub-phase figures reported with every migration
    pub figures: BTreeMap<String, f64>,
    /// VMs whose migrations are never answered
    pub silent_vms: Vec<String>,
    /// VMs whose migrations are answered with an error status
    pub failing_vms: Vec<String>,
    /// Also publish a response with an unknown id for every migration
    pub send_strays: bool,
}

impl Default for FakeMigfraOptions {
    fn default() -> Self {
        Self {
            migration_time: Duration::from_millis(100),
            figures: BTreeMap::from([
                ("migrate".to_string(), 0.08),
                ("pscom-suspend".to_string(), 0.01),
            ]),
            silent_vms: Vec::new(),
            failing_vms: Vec::new(),
            send_strays: false,
        }
    }
}

/// A request as seen by the fake service
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub topic: String,
    pub request: Request,
}

pub struct FakeMigfra {
    received: Arc<Mutex<Vec<ReceivedRequest>>>,
    stop: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl FakeMigfra {
    /// Subscribe and start answering. Subscription is complete on return.
    pub async fn start(broker: &LocalBroker, options: FakeMigfraOptions) -> Self {
        let channel = Arc::new(broker.connect());
        channel
            .subscribe(REQUEST_FILTER)
            .await
            .expect("fake service subscription");

        let received = Arc::new(Mutex::new(Vec::new()));
        let stop = CancellationToken::new();
        let handle = tokio::spawn(serve(channel, options, received.clone(), stop.clone()));

        Self {
            received,
            stop,
            handle: Some(handle),
        }
    }

    /// Every request received so far, in arrival order
    pub fn requests(&self) -> Vec<ReceivedRequest> {
        self.received.lock().clone()
    }

    pub fn requests_of_kind(&self, kind: &str) -> Vec<ReceivedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.request.task.kind() == kind)
            .collect()
    }

    pub async fn shutdown(mut self) {
        self.stop.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for FakeMigfra {
    fn drop(&mut self) {
        self.stop.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn serve(
    channel: Arc<dyn BrokerChannel>,
    options: FakeMigfraOptions,
    received: Arc<Mutex<Vec<ReceivedRequest>>>,
    stop: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_millis(2)) => {}
        }

        while let Some(message) = channel.try_receive() {
            let request = match Request::from_yaml(&message.payload) {
                Ok(request) => request,
                Err(_) => continue,
            };
            received.lock().push(ReceivedRequest {
                topic: message.topic.clone(),
                request: request.clone(),
            });

            let result_topic = message.topic.replace("/task", "/result");
            let channel = channel.clone();
            let options = options.clone();
            tokio::spawn(async move {
                answer(channel.as_ref(), &result_topic, request, &options).await;
            });
        }
    }
}

async fn answer(channel: &dyn BrokerChannel, topic: &str, request: Request, options: &FakeMigfraOptions) {
    let vm_name = request.task.vm_name().to_string();
    let mut response = Response {
        result: String::new(),
        id: request.id,
        vm_name: Some(vm_name.clone()),
        status: Some(STATUS_SUCCESS.to_string()),
        details: None,
        time_measurement: BTreeMap::new(),
    };

    match &request.task {
        Task::StartVm(_) => response.result = "vm started".to_string(),
        Task::StopVm(_) => response.result = "vm stopped".to_string(),
        Task::MigrateVm(_) => {
            if options.silent_vms.contains(&vm_name) {
                return;
            }
            tokio::time::sleep(options.migration_time).await;
            response.result = "vm migrated".to_string();
            if options.failing_vms.contains(&vm_name) {
                response.status = Some("error".to_string());
                response.details = Some("migration aborted".to_string());
            } else {
                response.time_measurement = options.figures.clone();
            }
            if options.send_strays {
                let mut stray = response.clone();
                stray.id = CorrelationId::new();
                if let Ok(payload) = stray.to_yaml() {
                    let _ = channel.publish(topic, payload).await;
                }
            }
        }
    }

    if let Ok(payload) = response.to_yaml() {
        let _ = channel.publish(topic, payload).await;
    }
}
