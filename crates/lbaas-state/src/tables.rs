//! redb table definitions for the LBaaS state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized records).

use redb::TableDefinition;

/// Agent records keyed by `{agent_id}`.
pub const AGENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("agents");

/// Load balancer bindings keyed by `{loadbalancer_id}`. One row per load balancer.
pub const BINDINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("bindings");

/// Entity records of every kind keyed by `{kind}/{id}`.
pub const ENTITIES: TableDefinition<&str, &[u8]> = TableDefinition::new("entities");

/// VIP ports keyed by `{port_id}`.
pub const PORTS: TableDefinition<&str, &[u8]> = TableDefinition::new("ports");
