//! Provisioning and operating statuses carried by every entity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an entity sits in its create/update/delete lifecycle.
///
/// Every `Pending*` state is resolved by exactly one completion report
/// from the agent that realized the change, or by a direct transition
/// when no agent could be reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProvisioningStatus {
    Active,
    #[default]
    PendingCreate,
    PendingUpdate,
    PendingDelete,
    Error,
}

impl ProvisioningStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisioningStatus::Active => "ACTIVE",
            ProvisioningStatus::PendingCreate => "PENDING_CREATE",
            ProvisioningStatus::PendingUpdate => "PENDING_UPDATE",
            ProvisioningStatus::PendingDelete => "PENDING_DELETE",
            ProvisioningStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for ProvisioningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the realized object is actually serving traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatingStatus {
    Online,
    #[default]
    Offline,
    Degraded,
    Error,
    NoMonitor,
}

impl OperatingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatingStatus::Online => "ONLINE",
            OperatingStatus::Offline => "OFFLINE",
            OperatingStatus::Degraded => "DEGRADED",
            OperatingStatus::Error => "ERROR",
            OperatingStatus::NoMonitor => "NO_MONITOR",
        }
    }
}

impl fmt::Display for OperatingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_use_upper_snake_case_on_the_wire() {
        let json = serde_json::to_string(&ProvisioningStatus::PendingDelete).unwrap();
        assert_eq!(json, "\"PENDING_DELETE\"");
        let back: OperatingStatus = serde_json::from_str("\"NO_MONITOR\"").unwrap();
        assert_eq!(back, OperatingStatus::NoMonitor);
    }

    #[test]
    fn display_matches_wire_form() {
        assert_eq!(ProvisioningStatus::PendingCreate.to_string(), "PENDING_CREATE");
        assert_eq!(OperatingStatus::Online.to_string(), "ONLINE");
    }
}
