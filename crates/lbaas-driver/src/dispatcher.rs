//! Completion dispatcher — applies agent reports to entity status.
//!
//! A report names a kind and an event as strings. The routing table maps
//! every valid `(kind, event)` pair to a typed [`Route`]; the payload is
//! then decoded into the kind's structure and handed to that kind's
//! manager. Reports that don't route or decode are dropped with a log
//! line, never propagated, so one bad message can't stop the listener.

use std::collections::HashMap;
use std::sync::Arc;

use lbaas_core::{EntityKind, EntityPayload};
use lbaas_rpc::{CompletionEvent, CompletionMessage};
use tracing::{debug, error, warn};

use crate::driver::LbaasDriver;
use crate::error::{DriverError, DriverResult};

/// Run `$body` with `$mgr` bound to the manager for `$payload`'s kind and
/// `$item` bound to the typed entity.
macro_rules! with_manager {
    ($driver:expr, $payload:expr, |$mgr:ident, $item:ident| $body:expr) => {
        match $payload {
            EntityPayload::LoadBalancer($item) => {
                let $mgr = &$driver.loadbalancer;
                $body
            }
            EntityPayload::Listener($item) => {
                let $mgr = &$driver.listener;
                $body
            }
            EntityPayload::Pool($item) => {
                let $mgr = &$driver.pool;
                $body
            }
            EntityPayload::Member($item) => {
                let $mgr = &$driver.member;
                $body
            }
            EntityPayload::HealthMonitor($item) => {
                let $mgr = &$driver.health_monitor;
                $body
            }
            EntityPayload::L7Policy($item) => {
                let $mgr = &$driver.l7policy;
                $body
            }
            EntityPayload::L7Rule($item) => {
                let $mgr = &$driver.l7rule;
                $body
            }
        }
    };
}

/// Where a routable report goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub kind: EntityKind,
    pub event: CompletionEvent,
}

/// Immutable `(kind tag, event tag)` → [`Route`] table.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    routes: HashMap<(&'static str, &'static str), Route>,
}

impl RoutingTable {
    /// Build the table covering every kind and event.
    pub fn new() -> Self {
        let events = [
            CompletionEvent::Success,
            CompletionEvent::Delete,
            CompletionEvent::Fail,
        ];
        let routes = EntityKind::ALL
            .into_iter()
            .flat_map(|kind| {
                events.into_iter().map(move |event| {
                    ((kind.wire_tag(), event.wire_tag()), Route { kind, event })
                })
            })
            .collect();
        Self { routes }
    }

    pub fn route(&self, kind: &str, event: &str) -> DriverResult<Route> {
        self.routes
            .get(&(kind, event))
            .copied()
            .ok_or_else(|| DriverError::Routing {
                kind: kind.to_string(),
                event: event.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies completion reports through the driver's managers.
pub struct CompletionDispatcher {
    driver: Arc<LbaasDriver>,
    routes: RoutingTable,
}

impl CompletionDispatcher {
    pub fn new(driver: Arc<LbaasDriver>) -> Self {
        Self::with_routes(driver, RoutingTable::new())
    }

    pub fn with_routes(driver: Arc<LbaasDriver>, routes: RoutingTable) -> Self {
        Self { driver, routes }
    }

    /// Apply one report from the wire. Never fails; problems are logged.
    pub fn handle(&self, message: CompletionMessage) {
        let kind = message.kind.clone();
        let event = message.event.clone();
        match self.dispatch(message) {
            Ok(()) => debug!(%kind, %event, "completion applied"),
            Err(e) if e.is_routing_fault() => {
                warn!(%kind, %event, error = %e, "dropping completion report")
            }
            Err(e) => error!(%kind, %event, error = %e, "failed to apply completion report"),
        }
    }

    /// Route and apply one report, returning whatever went wrong.
    pub fn dispatch(&self, message: CompletionMessage) -> DriverResult<()> {
        let route = self.routes.route(&message.kind, &message.event)?;
        match route.event {
            CompletionEvent::Success => {
                self.on_success(route.kind, message.obj, message.delete, message.lb_create)
            }
            CompletionEvent::Delete => self.on_delete(route.kind, message.obj),
            CompletionEvent::Fail => self.on_failure(route.kind, message.obj),
        }
    }

    /// Move the entity to ACTIVE, or remove it when `delete`. A load
    /// balancer create also stores the VIP the agent allocated.
    ///
    /// Reports are applied as they arrive; a late success after a failure
    /// still wins.
    pub fn on_success(
        &self,
        kind: EntityKind,
        obj: serde_json::Value,
        delete: bool,
        lb_create: bool,
    ) -> DriverResult<()> {
        match decode(kind, obj)? {
            EntityPayload::LoadBalancer(lb) if lb_create && !delete => {
                self.driver.loadbalancer.created_completion(&lb)
            }
            payload => with_manager!(self.driver, payload, |manager, item| {
                manager.successful_completion(&item, delete)
            }),
        }
    }

    /// Remove the entity. Removing a root load balancer also releases its
    /// VIP port; child removals never do.
    pub fn on_delete(&self, kind: EntityKind, obj: serde_json::Value) -> DriverResult<()> {
        match decode(kind, obj)? {
            EntityPayload::LoadBalancer(lb) => self.driver.loadbalancer.deleting_completion(&lb),
            payload => with_manager!(self.driver, payload, |manager, item| {
                manager.successful_completion(&item, true)
            }),
        }
    }

    /// Move the entity to ERROR. No retry is attempted.
    pub fn on_failure(&self, kind: EntityKind, obj: serde_json::Value) -> DriverResult<()> {
        let payload = decode(kind, obj)?;
        with_manager!(self.driver, payload, |manager, item| {
            manager.failed_completion(&item)
        })
    }
}

fn decode(kind: EntityKind, obj: serde_json::Value) -> DriverResult<EntityPayload> {
    EntityPayload::decode(kind, obj).map_err(|e| DriverError::Decode {
        kind,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testing::Harness;
    use lbaas_core::{Listener, LoadBalancer, Member, OperatingStatus, ProvisioningStatus};
    use lbaas_state::VipPort;
    use serde_json::json;

    fn lb_json(id: &str) -> serde_json::Value {
        json!({"id": id, "tenant_id": "t", "vip_subnet_id": "s"})
    }

    fn seed_lb(h: &Harness, id: &str) {
        h.state
            .put_entity(&LoadBalancer {
                id: id.to_string(),
                ..Default::default()
            })
            .unwrap();
    }

    fn lb_status(h: &Harness, id: &str) -> ProvisioningStatus {
        h.state
            .get_entity::<LoadBalancer>(id)
            .unwrap()
            .unwrap()
            .provisioning_status
    }

    #[test]
    fn routing_table_covers_every_kind_and_event() {
        let table = RoutingTable::new();
        assert_eq!(table.len(), 21);
        assert_eq!(
            table.route("hm", "delete").unwrap(),
            Route {
                kind: EntityKind::HealthMonitor,
                event: CompletionEvent::Delete
            }
        );
        assert!(matches!(
            table.route("healthmonitor", "success"),
            Err(DriverError::Routing { .. })
        ));
        assert!(matches!(
            table.route("pool", "retry"),
            Err(DriverError::Routing { .. })
        ));
    }

    #[test]
    fn unknown_kind_is_dropped_without_panicking() {
        let h = Harness::new();
        let dispatcher = CompletionDispatcher::new(h.driver.clone());
        let message = CompletionMessage {
            kind: "vip".into(),
            event: "success".into(),
            obj: json!({}),
            delete: false,
            lb_create: false,
        };
        assert!(dispatcher.dispatch(message.clone()).unwrap_err().is_routing_fault());
        dispatcher.handle(message);
    }

    #[test]
    fn malformed_payload_is_a_routing_fault() {
        let h = Harness::new();
        let dispatcher = CompletionDispatcher::new(h.driver.clone());
        let err = dispatcher
            .on_failure(EntityKind::Member, json!({"id": 42}))
            .unwrap_err();
        assert!(matches!(err, DriverError::Decode { kind: EntityKind::Member, .. }));
    }

    #[test]
    fn success_activates_entity() {
        let h = Harness::new();
        seed_lb(&h, "lb-1");
        let dispatcher = CompletionDispatcher::new(h.driver.clone());

        dispatcher
            .dispatch(CompletionMessage::new(
                EntityKind::LoadBalancer,
                CompletionEvent::Success,
                lb_json("lb-1"),
            ))
            .unwrap();

        let stored = h.state.get_entity::<LoadBalancer>("lb-1").unwrap().unwrap();
        assert_eq!(stored.provisioning_status, ProvisioningStatus::Active);
        assert_eq!(stored.operating_status, OperatingStatus::Online);
    }

    #[test]
    fn success_with_delete_flag_removes_entity() {
        let h = Harness::new();
        h.state
            .put_entity(&Member {
                id: "m-1".into(),
                loadbalancer_id: "lb-1".into(),
                pool_id: "p-1".into(),
                ..Default::default()
            })
            .unwrap();
        let dispatcher = CompletionDispatcher::new(h.driver.clone());

        dispatcher
            .on_success(
                EntityKind::Member,
                json!({"id": "m-1", "loadbalancer_id": "lb-1", "pool_id": "p-1"}),
                true,
                false,
            )
            .unwrap();
        assert!(h.state.get_entity::<Member>("m-1").unwrap().is_none());
    }

    #[test]
    fn lb_create_success_persists_vip() {
        let h = Harness::new();
        seed_lb(&h, "lb-1");
        let dispatcher = CompletionDispatcher::new(h.driver.clone());

        let mut obj = lb_json("lb-1");
        obj["vip_address"] = json!("198.51.100.7");
        obj["vip_port_id"] = json!("port-9");
        dispatcher
            .dispatch(
                CompletionMessage::new(EntityKind::LoadBalancer, CompletionEvent::Success, obj)
                    .with_lb_create(true),
            )
            .unwrap();

        let stored = h.state.get_entity::<LoadBalancer>("lb-1").unwrap().unwrap();
        assert_eq!(stored.vip_address.as_deref(), Some("198.51.100.7"));
        assert_eq!(stored.vip_port_id.as_deref(), Some("port-9"));
        assert!(h.state.get_port("port-9").unwrap().is_some());
    }

    #[test]
    fn lb_delete_releases_port_once() {
        let h = Harness::new();
        seed_lb(&h, "lb-1");
        h.state.bind_if_absent("lb-1", "agent-x").unwrap();
        h.state
            .put_port(&VipPort {
                port_id: "port-1".into(),
                loadbalancer_id: "lb-1".into(),
                vip_address: None,
                created_at: 0,
            })
            .unwrap();
        let dispatcher = CompletionDispatcher::new(h.driver.clone());

        dispatcher
            .on_delete(EntityKind::LoadBalancer, lb_json("lb-1"))
            .unwrap();

        assert!(h.state.get_entity::<LoadBalancer>("lb-1").unwrap().is_none());
        assert!(h.state.get_binding("lb-1").unwrap().is_none());
        assert!(h.state.get_port("port-1").unwrap().is_none());
    }

    #[test]
    fn child_delete_never_releases_root_port() {
        let h = Harness::new();
        seed_lb(&h, "lb-1");
        h.state
            .put_entity(&Listener {
                id: "l-1".into(),
                loadbalancer_id: "lb-1".into(),
                ..Default::default()
            })
            .unwrap();
        h.state
            .put_port(&VipPort {
                port_id: "port-1".into(),
                loadbalancer_id: "lb-1".into(),
                vip_address: None,
                created_at: 0,
            })
            .unwrap();
        let dispatcher = CompletionDispatcher::new(h.driver.clone());

        dispatcher
            .on_delete(EntityKind::Listener, json!({"id": "l-1", "loadbalancer_id": "lb-1"}))
            .unwrap();

        assert!(h.state.get_entity::<Listener>("l-1").unwrap().is_none());
        assert!(h.state.get_port("port-1").unwrap().is_some());
        assert!(h.state.get_entity::<LoadBalancer>("lb-1").unwrap().is_some());
    }

    #[test]
    fn stale_success_after_failure_still_applies() {
        let h = Harness::new();
        seed_lb(&h, "lb-1");
        let dispatcher = CompletionDispatcher::new(h.driver.clone());

        dispatcher
            .on_failure(EntityKind::LoadBalancer, lb_json("lb-1"))
            .unwrap();
        assert_eq!(lb_status(&h, "lb-1"), ProvisioningStatus::Error);

        dispatcher
            .on_success(EntityKind::LoadBalancer, lb_json("lb-1"), false, false)
            .unwrap();
        assert_eq!(lb_status(&h, "lb-1"), ProvisioningStatus::Active);
    }
}
