//! lbaas-scheduler — agent selection with affinity and failover.
//!
//! Assigns root load balancers to agents and keeps those assignments
//! pointing at live agents.
//!
//! # Architecture
//!
//! ```text
//! AgentScheduler
//!   ├── AgentDirectory
//!   │   ├── report_state() → register / heartbeat an agent
//!   │   ├── list_agents(active) → live-and-enabled filter
//!   │   └── is_agent_down() → heartbeat age vs agent_down_time
//!   ├── StateStore (bindings: lb_id → agent_id)
//!   ├── schedule() → existing live binding, else first eligible candidate
//!   ├── resolve()  → existing binding only (update / delete / stats)
//!   ├── rebind()   → move a dead agent's bindings to a replacement
//!   └── scrub_dead_agents() → rebind every disabled or stale agent
//! ```
//!
//! Environment tags split the fleet into disjoint groups. An untagged
//! request only sees untagged agents and a tagged request only sees agents
//! with exactly that tag.

pub mod directory;
pub mod error;
pub mod scheduler;

pub use directory::AgentDirectory;
pub use error::{SchedulerError, SchedulerResult};
pub use scheduler::{AgentScheduler, ScrubReport};
