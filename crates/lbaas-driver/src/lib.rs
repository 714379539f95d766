//! lbaas-driver — entity lifecycle on the controller side.
//!
//! # Architecture
//!
//! ```text
//! LbaasDriver
//!   ├── EntityManager<E> × 7 (loadbalancer … l7rule)
//!   │   ├── create / update / delete → schedule or resolve, then cast
//!   │   └── successful_completion / failed_completion → status transition
//!   ├── AgentScheduler (lbaas-scheduler)
//!   ├── AgentNotifier  (lbaas-rpc)
//!   └── PortReleaser   (VIP port cleanup)
//!
//! ControllerClient ── controller topic ──► ControllerListener ──► ControllerEndpoint
//!                                           ├── Completion  → CompletionDispatcher
//!                                           │     ├── RoutingTable (kind, event) → Route
//!                                           │     └── EntityPayload → manager
//!                                           ├── StateReport → AgentDirectory::report_state
//!                                           └── Call        → ControllerCallbacks (oneshot reply)
//!
//! DeadAgentScrubber ── every scrub_interval ──► AgentScheduler::scrub_dead_agents
//! ```
//!
//! Requests are dispatched and forgotten. Status only moves past PENDING_*
//! when the agent's completion report comes back through the dispatcher.

pub mod callbacks;
pub mod dispatcher;
pub mod driver;
pub mod endpoint;
pub mod error;
pub mod manager;
pub mod ports;
pub mod tasks;

pub use callbacks::{ControllerCallbacks, LoadBalancerAddress, MemberStatusMap};
pub use dispatcher::{CompletionDispatcher, Route, RoutingTable};
pub use driver::{DriverBuilder, LbaasDriver};
pub use endpoint::{
    AgentStateReport, ControllerCall, ControllerClient, ControllerEndpoint, ControllerMessage,
    Reply,
};
pub use error::{DriverError, DriverResult};
pub use manager::{
    DriverErrorHook, EntityManager, HealthMonitorManager, L7PolicyManager, L7RuleManager,
    ListenerManager, LoadBalancerManager, MemberManager, PoolManager,
};
pub use ports::{PortReleaser, StorePortReleaser};
pub use tasks::{
    ControllerListener, DEFAULT_SCRUB_INTERVAL, DeadAgentScrubber, MIN_SCRUB_INTERVAL,
};
