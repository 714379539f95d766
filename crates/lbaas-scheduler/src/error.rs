//! Scheduler error types.

use thiserror::Error;

/// Errors that can occur during scheduling operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("no active lbaas agent")]
    NoActiveAgent,

    #[error("no eligible lbaas agent for environment {}", .environment.as_deref().unwrap_or("<untagged>"))]
    NoEligibleAgent { environment: Option<String> },

    #[error("load balancer not bound to an agent: {0}")]
    NotBound(String),

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("state store error: {0}")]
    State(#[from] lbaas_state::StateError),
}

impl SchedulerError {
    /// Whether the error means no agent could take the work, as opposed to
    /// a store or programming fault.
    pub fn is_scheduling_failure(&self) -> bool {
        matches!(
            self,
            SchedulerError::NoActiveAgent
                | SchedulerError::NoEligibleAgent { .. }
                | SchedulerError::NotBound(_)
        )
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduling_failures_are_classified() {
        assert!(SchedulerError::NoActiveAgent.is_scheduling_failure());
        assert!(
            SchedulerError::NoEligibleAgent {
                environment: Some("prod".into())
            }
            .is_scheduling_failure()
        );
        assert!(SchedulerError::NotBound("lb-1".into()).is_scheduling_failure());
        assert!(!SchedulerError::AgentNotFound("a".into()).is_scheduling_failure());
        assert!(
            !SchedulerError::State(lbaas_state::StateError::Read("boom".into()))
                .is_scheduling_failure()
        );
    }

    #[test]
    fn untagged_environment_renders_readably() {
        let err = SchedulerError::NoEligibleAgent { environment: None };
        assert_eq!(err.to_string(), "no eligible lbaas agent for environment <untagged>");
    }
}
