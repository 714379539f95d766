//! Controller assembly: store, scheduler, driver, and the message buses.

use std::sync::Arc;
use std::time::Duration;

use lbaas_core::LbaasConfig;
use lbaas_driver::{
    ControllerClient, ControllerEndpoint, ControllerListener, ControllerMessage, DeadAgentScrubber,
    LbaasDriver,
};
use lbaas_rpc::{AgentMessage, BusNotifier, TopicBus};
use lbaas_scheduler::{AgentDirectory, AgentScheduler};
use lbaas_state::StateStore;
use tokio::sync::watch;
use tracing::info;

/// Every controller subsystem, wired together.
pub struct Controller {
    pub config: LbaasConfig,
    pub state: StateStore,
    pub scheduler: AgentScheduler,
    pub driver: Arc<LbaasDriver>,
    pub agent_bus: TopicBus<AgentMessage>,
    pub controller_bus: TopicBus<ControllerMessage>,
}

impl Controller {
    /// Open the on-disk store under the configured data directory.
    pub fn open(config: LbaasConfig) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.state.data_dir)?;
        let db_path = config.db_path();
        let state = StateStore::open(&db_path)?;
        info!(path = ?db_path, "state store opened");
        Ok(Self::assemble(config, state))
    }

    pub fn assemble(config: LbaasConfig, state: StateStore) -> Self {
        let directory = AgentDirectory::new(state.clone())
            .with_agent_down_time(Duration::from_secs(config.driver.agent_down_time));
        let scheduler = AgentScheduler::new(directory, state.clone());

        let agent_bus = TopicBus::new();
        let notifier = Arc::new(BusNotifier::new(agent_bus.clone(), &config.rpc.agent_topic));
        let driver = LbaasDriver::builder(state.clone(), scheduler.clone(), notifier)
            .with_environment(config.driver.environment.clone())
            .build();
        info!(
            environment = driver.environment().unwrap_or("<untagged>"),
            agent_down_time = config.driver.agent_down_time,
            "driver assembled"
        );

        Self {
            config,
            state,
            scheduler,
            driver: Arc::new(driver),
            agent_bus,
            controller_bus: TopicBus::new(),
        }
    }

    /// Handle for agents to reach this controller's topic.
    pub fn client(&self) -> ControllerClient {
        ControllerClient::new(
            self.controller_bus.clone(),
            &self.config.rpc.controller_topic,
        )
    }

    /// Run the controller listener and the scrub loop until `shutdown`.
    pub async fn serve(&self, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let rx = self.controller_bus.subscribe(&self.config.rpc.controller_topic);
        info!(topic = %self.config.rpc.controller_topic, "subscribed to controller topic");

        let listener =
            ControllerListener::new(Arc::new(ControllerEndpoint::new(Arc::clone(&self.driver))));
        let scrubber = DeadAgentScrubber::new(
            self.scheduler.clone(),
            self.config.environment().map(str::to_string),
        )
        .with_interval(Duration::from_secs(self.config.driver.scrub_interval));
        info!(interval_secs = scrubber.interval().as_secs(), "dead agent scrub scheduled");

        let listener_shutdown = shutdown.clone();
        let listener_handle =
            tokio::spawn(async move { listener.run(rx, listener_shutdown).await });
        let scrub_handle = tokio::spawn(async move { scrubber.run(shutdown).await });

        let handled = listener_handle.await?;
        scrub_handle.await?;
        self.controller_bus
            .unsubscribe(&self.config.rpc.controller_topic);
        info!(handled, "controller stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lbaas_core::{LoadBalancer, ProvisioningStatus};
    use serde_json::json;

    async fn start(
        controller: &Arc<Controller>,
    ) -> (watch::Sender<bool>, tokio::task::JoinHandle<anyhow::Result<()>>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let serving = Arc::clone(controller);
        let handle = tokio::spawn(async move { serving.serve(shutdown_rx).await });

        // Wait for the listener to subscribe.
        while controller.controller_bus.topics().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        (shutdown_tx, handle)
    }

    #[tokio::test]
    async fn serve_applies_reports_from_controller_topic() {
        let controller = Arc::new(Controller::assemble(
            LbaasConfig::default(),
            StateStore::open_in_memory().unwrap(),
        ));
        controller
            .state
            .put_entity(&LoadBalancer {
                id: "lb-1".into(),
                ..Default::default()
            })
            .unwrap();
        let (shutdown_tx, handle) = start(&controller).await;

        let lb = controller.state.get_entity::<LoadBalancer>("lb-1").unwrap().unwrap();
        controller.client().reporter().success(&lb).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        let lb = controller.state.get_entity::<LoadBalancer>("lb-1").unwrap().unwrap();
        assert_eq!(lb.provisioning_status, ProvisioningStatus::Active);
        assert!(controller.controller_bus.topics().is_empty());
    }

    #[tokio::test]
    async fn agent_reporting_over_controller_topic_is_scheduled() {
        let mut config = LbaasConfig::default();
        config.driver.environment = Some("prod".into());
        let controller = Arc::new(Controller::assemble(
            config.clone(),
            StateStore::open_in_memory().unwrap(),
        ));
        let mut agent_rx = controller
            .agent_bus
            .subscribe(&lbaas_rpc::agent_topic(&config.rpc.agent_topic, "node-a"));
        let (shutdown_tx, handle) = start(&controller).await;

        let client = controller.client();
        client
            .report_state("node-a", json!({"environment": "prod"}), true)
            .unwrap();
        let active = client.get_active_agents().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].host, "node-a");

        controller
            .driver
            .loadbalancer
            .create(LoadBalancer {
                id: "lb-1".into(),
                ..Default::default()
            })
            .unwrap();
        let cast = agent_rx.try_recv().unwrap();
        assert_eq!(cast.method, "create_loadbalancer");

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
        assert_eq!(
            controller.scheduler.list_loadbalancers_on_agent(&active[0].id).unwrap(),
            vec!["lb-1".to_string()]
        );
    }

    #[test]
    fn open_creates_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = LbaasConfig::default();
        config.state.data_dir = dir.path().join("nested");

        let controller = Controller::open(config).unwrap();
        assert!(controller.config.db_path().exists());
        assert!(controller.scheduler.candidates(None).unwrap().is_empty());
    }
}
