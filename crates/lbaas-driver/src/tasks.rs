//! Long-running controller loops: controller-topic listener and dead-agent scrub.

use std::sync::Arc;
use std::time::Duration;

use lbaas_scheduler::{AgentScheduler, ScrubReport, SchedulerResult};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::endpoint::{ControllerEndpoint, ControllerMessage};

/// Scrub period used when none is configured.
pub const DEFAULT_SCRUB_INTERVAL: Duration = Duration::from_secs(60);

/// Shortest scrub period the loop accepts.
pub const MIN_SCRUB_INTERVAL: Duration = Duration::from_secs(1);

/// Drains the controller topic into the endpoint.
pub struct ControllerListener {
    endpoint: Arc<ControllerEndpoint>,
}

impl ControllerListener {
    pub fn new(endpoint: Arc<ControllerEndpoint>) -> Self {
        Self { endpoint }
    }

    /// Handle messages until shutdown or until every sender is gone.
    ///
    /// Returns the number of messages handled.
    pub async fn run(
        &self,
        mut rx: mpsc::UnboundedReceiver<ControllerMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) -> u64 {
        info!("controller listener started");
        let mut handled = 0u64;

        loop {
            tokio::select! {
                message = rx.recv() => {
                    match message {
                        Some(message) => {
                            self.endpoint.handle(message);
                            handled += 1;
                        }
                        None => {
                            warn!("controller topic closed, listener exiting");
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!(handled, "controller listener shutting down");
                    break;
                }
            }
        }
        handled
    }
}

/// Periodically moves load balancers off dead agents.
pub struct DeadAgentScrubber {
    scheduler: AgentScheduler,
    environment: Option<String>,
    interval: Duration,
}

impl DeadAgentScrubber {
    pub fn new(scheduler: AgentScheduler, environment: Option<String>) -> Self {
        Self {
            scheduler,
            environment,
            interval: DEFAULT_SCRUB_INTERVAL,
        }
    }

    /// Set the scrub period, raised to [`MIN_SCRUB_INTERVAL`] if shorter.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        if interval < MIN_SCRUB_INTERVAL {
            warn!(requested_ms = interval.as_millis() as u64, "scrub interval too short, clamping");
        }
        self.interval = interval.max(MIN_SCRUB_INTERVAL);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn scrub_once(&self) -> SchedulerResult<ScrubReport> {
        self.scheduler.scrub_dead_agents(self.environment.as_deref())
    }

    /// Scrub every interval until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            environment = self.environment.as_deref().unwrap_or("<untagged>"),
            "dead agent scrubber started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    match self.scrub_once() {
                        Ok(report) if report.rebound > 0 => {
                            info!(dead = ?report.dead_agents, rebound = report.rebound, "dead agents scrubbed");
                        }
                        Ok(report) => {
                            debug!(dead = report.dead_agents.len(), "scrub found nothing to rebind");
                        }
                        Err(e) => warn!(error = %e, "dead agent scrub failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("dead agent scrubber shutting down");
                    break;
                }
            }
        }
    }
}
