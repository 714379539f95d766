//! StateStore — redb-backed state persistence for the LBaaS control plane.
//!
//! Provides typed operations over agents, bindings, entity records, and
//! VIP ports. All values are JSON-serialized into redb's `&[u8]` value
//! columns. The store supports both on-disk and in-memory backends (the
//! latter for testing).

use std::path::Path;
use std::sync::Arc;

use lbaas_core::{Entity, EntityKind};
use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

fn entity_key(kind: EntityKind, id: &str) -> String {
    format!("{}/{id}", kind.wire_tag())
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(AGENTS).map_err(map_err!(Table))?;
        txn.open_table(BINDINGS).map_err(map_err!(Table))?;
        txn.open_table(ENTITIES).map_err(map_err!(Table))?;
        txn.open_table(PORTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Agents ─────────────────────────────────────────────────────

    /// Insert or update an agent record.
    pub fn put_agent(&self, agent: &Agent) -> StateResult<()> {
        let value = serde_json::to_vec(agent).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(AGENTS).map_err(map_err!(Table))?;
            table
                .insert(agent.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    pub fn get_agent(&self, agent_id: &str) -> StateResult<Option<Agent>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(AGENTS).map_err(map_err!(Table))?;
        match table.get(agent_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let agent: Agent =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(agent))
            }
            None => Ok(None),
        }
    }

    /// List all agents, ordered by id.
    pub fn list_agents(&self) -> StateResult<Vec<Agent>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(AGENTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let agent: Agent =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(agent);
        }
        Ok(results)
    }

    /// Apply `apply` to an agent record inside one write transaction.
    ///
    /// Returns the updated record, or `None` if the agent is unknown.
    pub fn update_agent(
        &self,
        agent_id: &str,
        apply: impl FnOnce(&mut Agent),
    ) -> StateResult<Option<Agent>> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let updated;
        {
            let mut table = txn.open_table(AGENTS).map_err(map_err!(Table))?;
            let current: Option<Agent> = match table.get(agent_id).map_err(map_err!(Read))? {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                }
                None => None,
            };
            updated = match current {
                Some(mut agent) => {
                    apply(&mut agent);
                    let value = serde_json::to_vec(&agent).map_err(map_err!(Serialize))?;
                    table
                        .insert(agent_id, value.as_slice())
                        .map_err(map_err!(Write))?;
                    Some(agent)
                }
                None => None,
            };
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(updated)
    }

    /// Refresh an agent record, or insert one built by `register` if none
    /// exists, inside one write transaction.
    ///
    /// Fields `refresh` leaves alone keep whatever value is committed at the
    /// time of the write, so a concurrent `update_agent` is never undone.
    /// Returns the stored record and whether it was inserted.
    pub fn upsert_agent(
        &self,
        agent_id: &str,
        register: impl FnOnce() -> Agent,
        refresh: impl FnOnce(&mut Agent),
    ) -> StateResult<(Agent, bool)> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let outcome;
        {
            let mut table = txn.open_table(AGENTS).map_err(map_err!(Table))?;
            let current: Option<Agent> = match table.get(agent_id).map_err(map_err!(Read))? {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                }
                None => None,
            };
            outcome = match current {
                Some(mut agent) => {
                    refresh(&mut agent);
                    (agent, false)
                }
                None => (register(), true),
            };
            let value = serde_json::to_vec(&outcome.0).map_err(map_err!(Serialize))?;
            table
                .insert(agent_id, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(outcome)
    }

    // ── Bindings ───────────────────────────────────────────────────

    pub fn get_binding(&self, loadbalancer_id: &str) -> StateResult<Option<Binding>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(BINDINGS).map_err(map_err!(Table))?;
        match table.get(loadbalancer_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let binding: Binding =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(binding))
            }
            None => Ok(None),
        }
    }

    /// Bind a load balancer to an agent unless it is already bound.
    ///
    /// The lookup and the insert share one write transaction, so concurrent
    /// callers for the same load balancer all observe the first binding.
    /// Returns the binding in effect and whether this call created it.
    pub fn bind_if_absent(
        &self,
        loadbalancer_id: &str,
        agent_id: &str,
    ) -> StateResult<(Binding, bool)> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let outcome;
        {
            let mut table = txn.open_table(BINDINGS).map_err(map_err!(Table))?;
            let existing: Option<Binding> =
                match table.get(loadbalancer_id).map_err(map_err!(Read))? {
                    Some(guard) => Some(
                        serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
                    ),
                    None => None,
                };
            outcome = match existing {
                Some(binding) => (binding, false),
                None => {
                    let binding = Binding {
                        loadbalancer_id: loadbalancer_id.to_string(),
                        agent_id: agent_id.to_string(),
                    };
                    let value = serde_json::to_vec(&binding).map_err(map_err!(Serialize))?;
                    table
                        .insert(loadbalancer_id, value.as_slice())
                        .map_err(map_err!(Write))?;
                    (binding, true)
                }
            };
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%loadbalancer_id, agent_id = %outcome.0.agent_id, created = outcome.1, "binding resolved");
        Ok(outcome)
    }

    /// Re-point every binding held by `old_agent_id` at `new_agent_id`.
    ///
    /// Rows are overwritten in place inside one write transaction; readers
    /// see either the old or the new agent, never a missing binding.
    /// Returns the number of bindings moved.
    pub fn rebind_agent(&self, old_agent_id: &str, new_agent_id: &str) -> StateResult<u32> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let moved;
        {
            let mut table = txn.open_table(BINDINGS).map_err(map_err!(Table))?;
            let mut stale = Vec::new();
            for entry in table.iter().map_err(map_err!(Read))? {
                let (_, value) = entry.map_err(map_err!(Read))?;
                let binding: Binding =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                if binding.agent_id == old_agent_id {
                    stale.push(binding);
                }
            }
            moved = stale.len() as u32;
            for mut binding in stale {
                binding.agent_id = new_agent_id.to_string();
                let value = serde_json::to_vec(&binding).map_err(map_err!(Serialize))?;
                table
                    .insert(binding.loadbalancer_id.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%old_agent_id, %new_agent_id, moved, "bindings re-pointed");
        Ok(moved)
    }

    /// Move one load balancer's binding from `expected_agent_id` to
    /// `new_agent_id` if it still points at `expected_agent_id`.
    ///
    /// Returns the binding in effect after the transaction, or `None` when
    /// the load balancer has no binding.
    pub fn repoint_binding(
        &self,
        loadbalancer_id: &str,
        expected_agent_id: &str,
        new_agent_id: &str,
    ) -> StateResult<Option<Binding>> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let outcome;
        {
            let mut table = txn.open_table(BINDINGS).map_err(map_err!(Table))?;
            let existing: Option<Binding> =
                match table.get(loadbalancer_id).map_err(map_err!(Read))? {
                    Some(guard) => Some(
                        serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
                    ),
                    None => None,
                };
            outcome = match existing {
                Some(mut binding) if binding.agent_id == expected_agent_id => {
                    binding.agent_id = new_agent_id.to_string();
                    let value = serde_json::to_vec(&binding).map_err(map_err!(Serialize))?;
                    table
                        .insert(loadbalancer_id, value.as_slice())
                        .map_err(map_err!(Write))?;
                    Some(binding)
                }
                other => other,
            };
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%loadbalancer_id, %expected_agent_id, %new_agent_id, "binding re-pointed");
        Ok(outcome)
    }

    /// List all bindings, ordered by load balancer id.
    pub fn list_bindings(&self) -> StateResult<Vec<Binding>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(BINDINGS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let binding: Binding =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(binding);
        }
        Ok(results)
    }

    pub fn list_bindings_for_agent(&self, agent_id: &str) -> StateResult<Vec<Binding>> {
        Ok(self
            .list_bindings()?
            .into_iter()
            .filter(|b| b.agent_id == agent_id)
            .collect())
    }

    /// Delete a binding. Returns true if it existed.
    pub fn delete_binding(&self, loadbalancer_id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(BINDINGS).map_err(map_err!(Table))?;
            existed = table
                .remove(loadbalancer_id)
                .map_err(map_err!(Write))?
                .is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%loadbalancer_id, existed, "binding deleted");
        Ok(existed)
    }

    // ── Entities ───────────────────────────────────────────────────

    /// Insert or update an entity record.
    pub fn put_entity<E: Entity>(&self, entity: &E) -> StateResult<()> {
        let key = entity_key(E::KIND, entity.id());
        let value = serde_json::to_vec(entity).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ENTITIES).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, status = %entity.provisioning_status(), "entity stored");
        Ok(())
    }

    pub fn get_entity<E: Entity>(&self, id: &str) -> StateResult<Option<E>> {
        let key = entity_key(E::KIND, id);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ENTITIES).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let entity: E =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(entity))
            }
            None => Ok(None),
        }
    }

    /// List every record of one kind.
    pub fn list_entities<E: Entity>(&self) -> StateResult<Vec<E>> {
        let prefix = format!("{}/", E::KIND.wire_tag());
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ENTITIES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let entity: E =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(entity);
            }
        }
        Ok(results)
    }

    /// List the records of one kind that belong to a root load balancer.
    pub fn list_entities_for_loadbalancer<E: Entity>(
        &self,
        loadbalancer_id: &str,
    ) -> StateResult<Vec<E>> {
        Ok(self
            .list_entities::<E>()?
            .into_iter()
            .filter(|e| e.loadbalancer_id() == loadbalancer_id)
            .collect())
    }

    /// Apply `apply` to an entity record inside one write transaction.
    ///
    /// Returns the updated record, or `None` if no record exists.
    pub fn update_entity<E: Entity>(
        &self,
        id: &str,
        apply: impl FnOnce(&mut E),
    ) -> StateResult<Option<E>> {
        let key = entity_key(E::KIND, id);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let updated;
        {
            let mut table = txn.open_table(ENTITIES).map_err(map_err!(Table))?;
            let current: Option<E> = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                }
                None => None,
            };
            updated = match current {
                Some(mut entity) => {
                    apply(&mut entity);
                    let value = serde_json::to_vec(&entity).map_err(map_err!(Serialize))?;
                    table
                        .insert(key.as_str(), value.as_slice())
                        .map_err(map_err!(Write))?;
                    Some(entity)
                }
                None => None,
            };
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(updated)
    }

    /// Delete an entity record. Returns true if it existed.
    pub fn delete_entity(&self, kind: EntityKind, id: &str) -> StateResult<bool> {
        let key = entity_key(kind, id);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(ENTITIES).map_err(map_err!(Table))?;
            existed = table.remove(key.as_str()).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "entity deleted");
        Ok(existed)
    }

    // ── VIP ports ──────────────────────────────────────────────────

    pub fn put_port(&self, port: &VipPort) -> StateResult<()> {
        let value = serde_json::to_vec(port).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(PORTS).map_err(map_err!(Table))?;
            table
                .insert(port.port_id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(port_id = %port.port_id, loadbalancer_id = %port.loadbalancer_id, "vip port recorded");
        Ok(())
    }

    pub fn get_port(&self, port_id: &str) -> StateResult<Option<VipPort>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(PORTS).map_err(map_err!(Table))?;
        match table.get(port_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let port: VipPort =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(port))
            }
            None => Ok(None),
        }
    }

    pub fn list_ports(&self) -> StateResult<Vec<VipPort>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(PORTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let port: VipPort =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(port);
        }
        Ok(results)
    }

    pub fn find_port_for_loadbalancer(&self, loadbalancer_id: &str) -> StateResult<Option<VipPort>> {
        Ok(self
            .list_ports()?
            .into_iter()
            .find(|p| p.loadbalancer_id == loadbalancer_id))
    }

    /// Delete a port record. Returns true if it existed.
    pub fn delete_port(&self, port_id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(PORTS).map_err(map_err!(Table))?;
            existed = table.remove(port_id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%port_id, existed, "vip port deleted");
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lbaas_core::{LoadBalancer, Member, OperatingStatus, ProvisioningStatus};
    use std::thread;

    fn test_agent(id: &str) -> Agent {
        Agent {
            id: id.to_string(),
            host: format!("{id}.example"),
            agent_type: "lbaas".to_string(),
            admin_state_up: true,
            heartbeat_timestamp: 1000,
            started_at: 1000,
            configurations: serde_json::json!({}),
        }
    }

    fn test_lb(id: &str) -> LoadBalancer {
        LoadBalancer {
            id: id.to_string(),
            tenant_id: "tenant-1".to_string(),
            vip_subnet_id: "subnet-1".to_string(),
            ..Default::default()
        }
    }

    fn test_member(id: &str, lb: &str) -> Member {
        Member {
            id: id.to_string(),
            loadbalancer_id: lb.to_string(),
            pool_id: "pool-1".to_string(),
            address: "10.0.0.5".to_string(),
            protocol_port: 80,
            weight: 1,
            ..Default::default()
        }
    }

    // ── Agents ─────────────────────────────────────────────────────

    #[test]
    fn agent_put_get_and_list_sorted() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_agent(&test_agent("agent-b")).unwrap();
        store.put_agent(&test_agent("agent-a")).unwrap();

        let fetched = store.get_agent("agent-a").unwrap().unwrap();
        assert_eq!(fetched.host, "agent-a.example");

        let ids: Vec<_> = store.list_agents().unwrap().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["agent-a", "agent-b"]);
    }

    #[test]
    fn agent_update_in_place() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_agent(&test_agent("agent-a")).unwrap();
        let updated = store
            .update_agent("agent-a", |a| a.admin_state_up = false)
            .unwrap()
            .unwrap();
        assert!(!updated.admin_state_up);
        assert!(!store.get_agent("agent-a").unwrap().unwrap().admin_state_up);
        assert!(store.update_agent("nope", |_| {}).unwrap().is_none());
    }

    #[test]
    fn upsert_agent_registers_then_refreshes() {
        let store = StateStore::open_in_memory().unwrap();
        let (agent, inserted) = store
            .upsert_agent("agent-a", || test_agent("agent-a"), |_| panic!("not registered yet"))
            .unwrap();
        assert!(inserted);
        assert_eq!(agent.heartbeat_timestamp, 1000);

        store
            .update_agent("agent-a", |a| a.admin_state_up = false)
            .unwrap();
        let (agent, inserted) = store
            .upsert_agent(
                "agent-a",
                || panic!("already registered"),
                |a| a.heartbeat_timestamp = 2000,
            )
            .unwrap();
        assert!(!inserted);
        assert_eq!(agent.heartbeat_timestamp, 2000);
        assert!(!agent.admin_state_up);
        assert_eq!(store.get_agent("agent-a").unwrap().unwrap(), agent);
    }

    // ── Bindings ───────────────────────────────────────────────────

    #[test]
    fn bind_if_absent_keeps_first_binding() {
        let store = StateStore::open_in_memory().unwrap();
        let (first, created) = store.bind_if_absent("lb-1", "agent-a").unwrap();
        assert!(created);
        assert_eq!(first.agent_id, "agent-a");

        let (second, created) = store.bind_if_absent("lb-1", "agent-b").unwrap();
        assert!(!created);
        assert_eq!(second.agent_id, "agent-a");
        assert_eq!(store.list_bindings().unwrap().len(), 1);
    }

    #[test]
    fn concurrent_bind_if_absent_creates_one_binding() {
        let store = StateStore::open_in_memory().unwrap();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                thread::spawn(move || store.bind_if_absent("lb-1", &format!("agent-{i}")).unwrap())
            })
            .collect();
        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(outcomes.iter().filter(|(_, created)| *created).count(), 1);
        let winner = &outcomes[0].0.agent_id;
        assert!(outcomes.iter().all(|(b, _)| &b.agent_id == winner));
        assert_eq!(store.list_bindings().unwrap().len(), 1);
    }

    #[test]
    fn rebind_agent_moves_only_matching_bindings() {
        let store = StateStore::open_in_memory().unwrap();
        store.bind_if_absent("lb-1", "agent-a").unwrap();
        store.bind_if_absent("lb-2", "agent-a").unwrap();
        store.bind_if_absent("lb-3", "agent-c").unwrap();

        let moved = store.rebind_agent("agent-a", "agent-b").unwrap();
        assert_eq!(moved, 2);
        assert_eq!(store.get_binding("lb-1").unwrap().unwrap().agent_id, "agent-b");
        assert_eq!(store.get_binding("lb-2").unwrap().unwrap().agent_id, "agent-b");
        assert_eq!(store.get_binding("lb-3").unwrap().unwrap().agent_id, "agent-c");

        assert_eq!(store.rebind_agent("agent-a", "agent-b").unwrap(), 0);
    }

    #[test]
    fn repoint_binding_only_moves_expected_agent() {
        let store = StateStore::open_in_memory().unwrap();
        store.bind_if_absent("lb-1", "agent-a").unwrap();
        store.bind_if_absent("lb-2", "agent-a").unwrap();

        let moved = store.repoint_binding("lb-1", "agent-a", "agent-b").unwrap();
        assert_eq!(moved.unwrap().agent_id, "agent-b");
        assert_eq!(store.get_binding("lb-2").unwrap().unwrap().agent_id, "agent-a");

        // Lost race: someone else already moved it.
        let kept = store.repoint_binding("lb-1", "agent-a", "agent-c").unwrap();
        assert_eq!(kept.unwrap().agent_id, "agent-b");
        assert!(store.repoint_binding("lb-9", "agent-a", "agent-b").unwrap().is_none());
    }

    #[test]
    fn bindings_for_agent_and_delete() {
        let store = StateStore::open_in_memory().unwrap();
        store.bind_if_absent("lb-1", "agent-a").unwrap();
        store.bind_if_absent("lb-2", "agent-b").unwrap();

        let on_a = store.list_bindings_for_agent("agent-a").unwrap();
        assert_eq!(on_a.len(), 1);
        assert_eq!(on_a[0].loadbalancer_id, "lb-1");

        assert!(store.delete_binding("lb-1").unwrap());
        assert!(!store.delete_binding("lb-1").unwrap());
        assert!(store.get_binding("lb-1").unwrap().is_none());
    }

    // ── Entities ───────────────────────────────────────────────────

    #[test]
    fn entity_kinds_share_a_table_without_colliding() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_entity(&test_lb("x")).unwrap();
        store.put_entity(&test_member("x", "x")).unwrap();

        assert_eq!(store.list_entities::<LoadBalancer>().unwrap().len(), 1);
        assert_eq!(store.list_entities::<Member>().unwrap().len(), 1);

        assert!(store.delete_entity(EntityKind::Member, "x").unwrap());
        assert!(store.get_entity::<LoadBalancer>("x").unwrap().is_some());
        assert!(store.get_entity::<Member>("x").unwrap().is_none());
    }

    #[test]
    fn update_entity_applies_and_persists() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_entity(&test_lb("lb-1")).unwrap();

        let updated = store
            .update_entity::<LoadBalancer>("lb-1", |lb| {
                lb.provisioning_status = ProvisioningStatus::Active;
                lb.operating_status = OperatingStatus::Online;
            })
            .unwrap()
            .unwrap();
        assert_eq!(updated.provisioning_status, ProvisioningStatus::Active);

        let stored = store.get_entity::<LoadBalancer>("lb-1").unwrap().unwrap();
        assert_eq!(stored.operating_status, OperatingStatus::Online);

        assert!(
            store
                .update_entity::<LoadBalancer>("missing", |_| {})
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn entities_for_loadbalancer_filter_by_root() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_entity(&test_member("m-1", "lb-1")).unwrap();
        store.put_entity(&test_member("m-2", "lb-1")).unwrap();
        store.put_entity(&test_member("m-3", "lb-2")).unwrap();

        let members = store
            .list_entities_for_loadbalancer::<Member>("lb-1")
            .unwrap();
        assert_eq!(members.len(), 2);
    }

    // ── Ports ──────────────────────────────────────────────────────

    #[test]
    fn port_lifecycle() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .put_port(&VipPort {
                port_id: "port-1".into(),
                loadbalancer_id: "lb-1".into(),
                vip_address: Some("192.0.2.10".into()),
                created_at: 1000,
            })
            .unwrap();

        let found = store.find_port_for_loadbalancer("lb-1").unwrap().unwrap();
        assert_eq!(found.port_id, "port-1");
        assert!(store.get_port("port-1").unwrap().is_some());
        assert!(store.delete_port("port-1").unwrap());
        assert!(store.find_port_for_loadbalancer("lb-1").unwrap().is_none());
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.put_agent(&test_agent("agent-a")).unwrap();
            store.bind_if_absent("lb-1", "agent-a").unwrap();
            store.put_entity(&test_lb("lb-1")).unwrap();
        }

        let store = StateStore::open(&db_path).unwrap();
        assert!(store.get_agent("agent-a").unwrap().is_some());
        assert_eq!(store.get_binding("lb-1").unwrap().unwrap().agent_id, "agent-a");
        assert!(store.get_entity::<LoadBalancer>("lb-1").unwrap().is_some());
    }

    // ── Edge cases ─────────────────────────────────────────────────

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_agents().unwrap().is_empty());
        assert!(store.list_bindings().unwrap().is_empty());
        assert!(store.list_entities::<LoadBalancer>().unwrap().is_empty());
        assert!(store.list_ports().unwrap().is_empty());
        assert!(store.get_binding("nope").unwrap().is_none());
        assert!(!store.delete_entity(EntityKind::Pool, "nope").unwrap());
        assert!(!store.delete_port("nope").unwrap());
    }
}
