//! Release of the network port reserved for a load balancer VIP.

use lbaas_state::StateStore;
use tracing::{debug, info};

use crate::error::DriverResult;

/// Frees a VIP port once its load balancer is gone.
pub trait PortReleaser: Send + Sync {
    fn release_port(&self, port_id: &str) -> DriverResult<()>;
}

/// Releases ports by dropping their record from the state store.
#[derive(Clone)]
pub struct StorePortReleaser {
    state: StateStore,
}

impl StorePortReleaser {
    pub fn new(state: StateStore) -> Self {
        Self { state }
    }
}

impl PortReleaser for StorePortReleaser {
    fn release_port(&self, port_id: &str) -> DriverResult<()> {
        if self.state.delete_port(port_id)? {
            info!(%port_id, "vip port released");
        } else {
            debug!(%port_id, "vip port already released");
        }
        Ok(())
    }
}
