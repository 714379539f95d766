//! LbaasDriver — the seven lifecycle managers over one shared context.

use std::sync::Arc;

use lbaas_rpc::AgentNotifier;
use lbaas_scheduler::AgentScheduler;
use lbaas_state::StateStore;

use crate::manager::*;
use crate::ports::{PortReleaser, StorePortReleaser};

/// Entry point for every lifecycle request the controller receives.
pub struct LbaasDriver {
    pub loadbalancer: LoadBalancerManager,
    pub listener: ListenerManager,
    pub pool: PoolManager,
    pub member: MemberManager,
    pub health_monitor: HealthMonitorManager,
    pub l7policy: L7PolicyManager,
    pub l7rule: L7RuleManager,
    ctx: Arc<DriverContext>,
}

impl LbaasDriver {
    pub fn builder(
        state: StateStore,
        scheduler: AgentScheduler,
        notifier: Arc<dyn AgentNotifier>,
    ) -> DriverBuilder {
        DriverBuilder {
            ports: Arc::new(StorePortReleaser::new(state.clone())),
            state,
            scheduler,
            notifier,
            environment: None,
            on_driver_error: None,
        }
    }

    pub fn state(&self) -> &StateStore {
        &self.ctx.state
    }

    pub fn scheduler(&self) -> &AgentScheduler {
        &self.ctx.scheduler
    }

    /// Environment this driver schedules into; `None` means untagged.
    pub fn environment(&self) -> Option<&str> {
        self.ctx.environment()
    }
}

pub struct DriverBuilder {
    state: StateStore,
    scheduler: AgentScheduler,
    notifier: Arc<dyn AgentNotifier>,
    ports: Arc<dyn PortReleaser>,
    environment: Option<String>,
    on_driver_error: Option<DriverErrorHook>,
}

impl DriverBuilder {
    /// Restrict scheduling to agents tagged with `environment`.
    pub fn with_environment(mut self, environment: Option<String>) -> Self {
        self.environment = environment.filter(|e| !e.is_empty());
        self
    }

    /// Set a hook for update and stats requests that found no agent.
    pub fn with_error_hook(mut self, hook: DriverErrorHook) -> Self {
        self.on_driver_error = Some(hook);
        self
    }

    pub fn build(self) -> LbaasDriver {
        let ctx = Arc::new(DriverContext {
            state: self.state,
            scheduler: self.scheduler,
            notifier: self.notifier,
            ports: self.ports,
            environment: self.environment,
            on_driver_error: self.on_driver_error,
        });
        LbaasDriver {
            loadbalancer: EntityManager::new(Arc::clone(&ctx)),
            listener: EntityManager::new(Arc::clone(&ctx)),
            pool: EntityManager::new(Arc::clone(&ctx)),
            member: EntityManager::new(Arc::clone(&ctx)),
            health_monitor: EntityManager::new(Arc::clone(&ctx)),
            l7policy: EntityManager::new(Arc::clone(&ctx)),
            l7rule: EntityManager::new(Arc::clone(&ctx)),
            ctx,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use lbaas_rpc::{AgentMessage, RpcError, RpcResult};
    use lbaas_scheduler::AgentDirectory;
    use lbaas_state::Agent;
    use serde_json::json;

    use super::*;

    /// Notifier that records every cast, optionally failing them all.
    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        pub(crate) casts: Mutex<Vec<(String, AgentMessage)>>,
        pub(crate) fail: bool,
    }

    impl RecordingNotifier {
        pub(crate) fn sent(&self) -> Vec<(String, AgentMessage)> {
            self.casts.lock().unwrap().clone()
        }
    }

    impl AgentNotifier for RecordingNotifier {
        fn cast(&self, host: &str, message: AgentMessage) -> RpcResult<()> {
            if self.fail {
                return Err(RpcError::NoRoute(host.to_string()));
            }
            self.casts.lock().unwrap().push((host.to_string(), message));
            Ok(())
        }
    }

    pub(crate) struct Harness {
        pub(crate) state: StateStore,
        pub(crate) notifier: Arc<RecordingNotifier>,
        pub(crate) driver: Arc<LbaasDriver>,
    }

    impl Harness {
        pub(crate) fn new() -> Self {
            Self::with_notifier(RecordingNotifier::default())
        }

        pub(crate) fn with_notifier(notifier: RecordingNotifier) -> Self {
            let state = StateStore::open_in_memory().unwrap();
            let scheduler = AgentScheduler::new(AgentDirectory::new(state.clone()), state.clone());
            let notifier = Arc::new(notifier);
            let driver = LbaasDriver::builder(state.clone(), scheduler, notifier.clone()).build();
            Self {
                state,
                notifier,
                driver: Arc::new(driver),
            }
        }

        pub(crate) fn agent(&self, host: &str) -> Agent {
            self.driver
                .scheduler()
                .directory()
                .report_state(host, json!({}), true)
                .unwrap()
        }
    }
}
