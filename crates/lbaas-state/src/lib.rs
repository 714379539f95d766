//! lbaas-state — embedded state store for the LBaaS control plane.
//!
//! Backed by [redb](https://docs.rs/redb), holds the agent directory, the
//! load balancer → agent bindings, every entity record, and the VIP ports
//! allocated for load balancers.
//!
//! # Architecture
//!
//! All records are JSON-serialized into redb's `&[u8]` value columns.
//! Entity keys are `{kind}/{id}` so one table holds all seven kinds and a
//! prefix scan lists a single kind.
//!
//! Binding mutations that must be atomic (first-time bind, rebinding an
//! agent's load balancers) each run inside a single write transaction.
//! redb serializes write transactions, so two writers never interleave.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
