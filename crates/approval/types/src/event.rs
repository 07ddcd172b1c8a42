//! Events emitted by the engine for downstream notification fan-out
//!
//! Delivery is best-effort and fire-and-forget: the state machine's
//! correctness never depends on a subscriber existing.

use crate::{BusinessKey, InstanceId, RoleId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Emitted whenever a transition leaves an instance pending on a
/// role-gated node: "this role now has work to do".
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodePending {
    /// The instance awaiting action
    pub instance_id: InstanceId,
    /// Definition code, denormalized for subscribers
    pub workflow_code: String,
    /// Definition name, denormalized for subscribers
    pub workflow_name: String,
    /// The step now awaiting action
    pub current_step: u32,
    /// The role whose holders should be notified
    pub role_id: RoleId,
    /// The governed business document
    pub business: BusinessKey,
    /// Who originally submitted the workflow
    pub submitted_by_user_id: UserId,
    /// Submitter display name
    pub submitted_by_name: String,
    /// When the workflow was submitted
    pub submitted_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trips_through_json() {
        let event = NodePending {
            instance_id: InstanceId::new("inst-1"),
            workflow_code: "ORDER_DISCOUNT".to_string(),
            workflow_name: "Order discount approval".to_string(),
            current_step: 2,
            role_id: RoleId::new("finance-director"),
            business: BusinessKey::new("ORDER", "42"),
            submitted_by_user_id: UserId::new("alice"),
            submitted_by_name: "Alice".to_string(),
            submitted_at: Utc::now(),
        };

        let json = serde_json::to_string(&event).unwrap();
        let back: NodePending = serde_json::from_str(&json).unwrap();
        assert_eq!(back.instance_id, event.instance_id);
        assert_eq!(back.current_step, 2);
        assert_eq!(back.role_id, event.role_id);
    }
}
