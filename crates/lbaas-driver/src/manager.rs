//! Lifecycle managers — one per entity kind.
//!
//! A manager turns a create/update/delete request into a scheduling
//! decision plus a fire-and-forget cast to the hosting agent, and applies
//! the status transition that the agent later reports back. Dispatch-time
//! scheduling failures are converted to status transitions here; every
//! other error is returned to the caller.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use lbaas_core::{
    Entity, EntityKind, EntityPayload, HealthMonitor, L7Policy, L7Rule, Listener, LoadBalancer,
    Member, OperatingStatus, Pool, ProvisioningStatus,
};
use lbaas_rpc::{AgentMessage, AgentNotifier};
use lbaas_scheduler::{AgentScheduler, SchedulerError};
use lbaas_state::{StateStore, VipPort};
use tracing::{debug, error, info, warn};

use crate::error::{DriverError, DriverResult};
use crate::ports::PortReleaser;

/// Hook invoked when an update or stats request finds no agent.
pub type DriverErrorHook = Arc<dyn Fn(EntityKind, &str, &SchedulerError) + Send + Sync>;

/// Collaborators shared by all seven managers.
pub(crate) struct DriverContext {
    pub(crate) state: StateStore,
    pub(crate) scheduler: AgentScheduler,
    pub(crate) notifier: Arc<dyn AgentNotifier>,
    pub(crate) ports: Arc<dyn PortReleaser>,
    pub(crate) environment: Option<String>,
    pub(crate) on_driver_error: Option<DriverErrorHook>,
}

impl DriverContext {
    pub(crate) fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    /// Report a scheduling failure on a non-destructive operation.
    ///
    /// The entity keeps its pending status; nothing is forced to ERROR.
    fn handle_driver_error(&self, kind: EntityKind, entity_id: &str, err: &SchedulerError) {
        warn!(%kind, %entity_id, error = %err, "driver error, request not dispatched");
        if let Some(hook) = &self.on_driver_error {
            hook(kind, entity_id, err);
        }
    }

    fn release_vip_port(&self, loadbalancer_id: &str, vip_port_id: Option<&str>) -> DriverResult<()> {
        let port_id = match vip_port_id {
            Some(id) => Some(id.to_string()),
            None => self
                .state
                .find_port_for_loadbalancer(loadbalancer_id)?
                .map(|p| p.port_id),
        };
        match port_id {
            Some(port_id) => self.ports.release_port(&port_id),
            None => {
                debug!(%loadbalancer_id, "no vip port to release");
                Ok(())
            }
        }
    }
}

pub type LoadBalancerManager = EntityManager<LoadBalancer>;
pub type ListenerManager = EntityManager<Listener>;
pub type PoolManager = EntityManager<Pool>;
pub type MemberManager = EntityManager<Member>;
pub type HealthMonitorManager = EntityManager<HealthMonitor>;
pub type L7PolicyManager = EntityManager<L7Policy>;
pub type L7RuleManager = EntityManager<L7Rule>;

/// Lifecycle manager for entities of kind `E`.
pub struct EntityManager<E> {
    ctx: Arc<DriverContext>,
    _kind: PhantomData<fn() -> E>,
}

impl<E: Entity> EntityManager<E> {
    pub(crate) fn new(ctx: Arc<DriverContext>) -> Self {
        Self {
            ctx,
            _kind: PhantomData,
        }
    }

    pub fn kind(&self) -> EntityKind {
        E::KIND
    }

    /// Persist `item` as PENDING_CREATE and cast it to the root load
    /// balancer's agent, scheduling one if needed.
    ///
    /// With no eligible agent the item goes to ERROR and nothing is cast.
    pub fn create(&self, mut item: E) -> DriverResult<()> {
        item.set_provisioning_status(ProvisioningStatus::PendingCreate);
        self.ctx.state.put_entity(&item)?;

        let agent = match self
            .ctx
            .scheduler
            .schedule(item.loadbalancer_id(), self.ctx.environment())
        {
            Ok(agent) => agent,
            Err(e) if e.is_scheduling_failure() => {
                error!(kind = %E::KIND, entity_id = %item.id(), error = %e, "create not scheduled, marking ERROR");
                self.set_error(item.id())?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let message = AgentMessage::create(E::KIND, encode(&item)?);
        self.ctx.notifier.cast(&agent.host, message)?;
        self.hold_root(item.loadbalancer_id())?;
        info!(kind = %E::KIND, entity_id = %item.id(), host = %agent.host, "create dispatched");
        Ok(())
    }

    /// Persist `new` as PENDING_UPDATE and cast both versions to the agent
    /// already hosting the root load balancer.
    ///
    /// Never creates a binding. With no agent the failure is reported
    /// through the driver error handler and the item keeps its status.
    pub fn update(&self, old: &E, mut new: E) -> DriverResult<()> {
        new.set_provisioning_status(ProvisioningStatus::PendingUpdate);
        self.ctx.state.put_entity(&new)?;

        let agent = match self
            .ctx
            .scheduler
            .resolve(new.loadbalancer_id(), self.ctx.environment())
        {
            Ok(agent) => agent,
            Err(e) if e.is_scheduling_failure() => {
                self.ctx.handle_driver_error(E::KIND, new.id(), &e);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let message = AgentMessage::update(E::KIND, encode(old)?, encode(&new)?);
        self.ctx.notifier.cast(&agent.host, message)?;
        self.hold_root(new.loadbalancer_id())?;
        info!(kind = %E::KIND, entity_id = %new.id(), host = %agent.host, "update dispatched");
        Ok(())
    }

    /// Persist `item` as PENDING_DELETE and cast the delete to its agent.
    ///
    /// With no agent the record is removed directly, so deletion always
    /// makes progress.
    pub fn delete(&self, mut item: E) -> DriverResult<()> {
        item.set_provisioning_status(ProvisioningStatus::PendingDelete);
        self.ctx.state.put_entity(&item)?;

        let agent = match self
            .ctx
            .scheduler
            .resolve(item.loadbalancer_id(), self.ctx.environment())
        {
            Ok(agent) => agent,
            Err(e) if e.is_scheduling_failure() => {
                warn!(kind = %E::KIND, entity_id = %item.id(), error = %e, "no agent for delete, removing record");
                self.remove(item.id())?;
                if let EntityPayload::LoadBalancer(lb) = item.into_payload() {
                    self.ctx.release_vip_port(&lb.id, lb.vip_port_id.as_deref())?;
                }
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let message = AgentMessage::delete(E::KIND, encode(&item)?);
        self.ctx.notifier.cast(&agent.host, message)?;
        self.hold_root(item.loadbalancer_id())?;
        info!(kind = %E::KIND, entity_id = %item.id(), host = %agent.host, "delete dispatched");
        Ok(())
    }

    /// Apply a success report: ACTIVE and ONLINE, or removal when `delete`.
    pub fn successful_completion(&self, item: &E, delete: bool) -> DriverResult<()> {
        self.complete(item, delete).map(|_| ())
    }

    /// Returns false when the entity was already gone.
    fn complete(&self, item: &E, delete: bool) -> DriverResult<bool> {
        if delete {
            if !self.remove(item.id())? {
                warn!(kind = %E::KIND, entity_id = %item.id(), "delete completion for unknown entity");
                return Ok(false);
            }
            info!(kind = %E::KIND, entity_id = %item.id(), "entity removed");
        } else {
            let updated = self.ctx.state.update_entity::<E>(item.id(), |e| {
                e.set_provisioning_status(ProvisioningStatus::Active);
                e.set_operating_status(OperatingStatus::Online);
            })?;
            if updated.is_none() {
                warn!(kind = %E::KIND, entity_id = %item.id(), "success completion for unknown entity");
                return Ok(false);
            }
            info!(kind = %E::KIND, entity_id = %item.id(), "entity active");
        }
        self.release_root(item.loadbalancer_id())?;
        Ok(true)
    }

    /// Apply a failure report: ERROR, with no retry.
    pub fn failed_completion(&self, item: &E) -> DriverResult<()> {
        if self.set_error(item.id())?.is_none() {
            warn!(kind = %E::KIND, entity_id = %item.id(), "failure completion for unknown entity");
            return Ok(());
        }
        warn!(kind = %E::KIND, entity_id = %item.id(), "agent reported failure");
        self.release_root(item.loadbalancer_id())
    }

    fn set_error(&self, id: &str) -> DriverResult<Option<E>> {
        Ok(self.ctx.state.update_entity::<E>(id, |e| {
            e.set_provisioning_status(ProvisioningStatus::Error);
            e.set_operating_status(OperatingStatus::Error);
        })?)
    }

    fn remove(&self, id: &str) -> DriverResult<bool> {
        let existed = self.ctx.state.delete_entity(E::KIND, id)?;
        if E::KIND == EntityKind::LoadBalancer {
            self.ctx.state.delete_binding(id)?;
        }
        Ok(existed)
    }

    /// Hold an ACTIVE root load balancer in PENDING_UPDATE while a child changes.
    fn hold_root(&self, loadbalancer_id: &str) -> DriverResult<()> {
        if E::KIND == EntityKind::LoadBalancer {
            return Ok(());
        }
        self.ctx
            .state
            .update_entity::<LoadBalancer>(loadbalancer_id, |lb| {
                if lb.provisioning_status == ProvisioningStatus::Active {
                    lb.provisioning_status = ProvisioningStatus::PendingUpdate;
                }
            })?;
        Ok(())
    }

    /// Return a held root load balancer to ACTIVE once its child settles.
    fn release_root(&self, loadbalancer_id: &str) -> DriverResult<()> {
        if E::KIND == EntityKind::LoadBalancer {
            return Ok(());
        }
        self.ctx
            .state
            .update_entity::<LoadBalancer>(loadbalancer_id, |lb| {
                if lb.provisioning_status == ProvisioningStatus::PendingUpdate {
                    lb.provisioning_status = ProvisioningStatus::Active;
                }
            })?;
        Ok(())
    }
}

impl EntityManager<LoadBalancer> {
    /// Ask the hosting agent to refresh statistics. No status side effects.
    pub fn stats(&self, lb: &LoadBalancer) -> DriverResult<()> {
        let agent = match self.ctx.scheduler.resolve(&lb.id, self.ctx.environment()) {
            Ok(agent) => agent,
            Err(e) if e.is_scheduling_failure() => {
                self.ctx.handle_driver_error(EntityKind::LoadBalancer, &lb.id, &e);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        self.ctx
            .notifier
            .cast(&agent.host, AgentMessage::update_stats(encode(lb)?))?;
        debug!(loadbalancer_id = %lb.id, host = %agent.host, "stats refresh dispatched");
        Ok(())
    }

    /// Apply a create success: store the VIP the agent allocated, then
    /// mark the load balancer ACTIVE.
    pub fn created_completion(&self, lb: &LoadBalancer) -> DriverResult<()> {
        let stored = self.ctx.state.update_entity::<LoadBalancer>(&lb.id, |s| {
            s.vip_address = lb.vip_address.clone();
            s.vip_port_id = lb.vip_port_id.clone();
        })?;
        if stored.is_some() {
            if let Some(port_id) = &lb.vip_port_id {
                self.ctx.state.put_port(&VipPort {
                    port_id: port_id.clone(),
                    loadbalancer_id: lb.id.clone(),
                    vip_address: lb.vip_address.clone(),
                    created_at: epoch_secs(),
                })?;
            }
        }
        self.successful_completion(lb, false)
    }

    /// Apply a delete report and release the VIP port of the removed load
    /// balancer. A repeated report releases nothing.
    pub fn deleting_completion(&self, lb: &LoadBalancer) -> DriverResult<()> {
        if self.complete(lb, true)? {
            self.ctx.release_vip_port(&lb.id, lb.vip_port_id.as_deref())?;
        }
        Ok(())
    }
}

fn encode<E: Entity>(entity: &E) -> DriverResult<serde_json::Value> {
    serde_json::to_value(entity).map_err(|e| DriverError::Encode {
        kind: E::KIND,
        reason: e.to_string(),
    })
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
