//! The approval log: an append-only audit trail of workflow transitions
//!
//! One row is written for every successful transition, including automatic
//! CC advances. Rows are never updated or deleted; ordered by creation time
//! they reconstruct the full status history of an instance through the
//! `from_status` → `to_status` chain.

use crate::{InstanceId, InstanceStatus, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role credential recorded on automatic (CC/NOTIFY) log rows
pub const SYSTEM_OPERATOR_ROLE: &str = "SYSTEM";

// ── Identifier ───────────────────────────────────────────────────────

/// Unique identifier for an approval log row
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalLogId(pub String);

impl ApprovalLogId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for ApprovalLogId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Approval Log row ─────────────────────────────────────────────────

/// One audit row: who did what to an instance, and the status edge taken
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApprovalLog {
    /// Unique row identifier
    pub id: ApprovalLogId,
    /// The instance this row belongs to
    pub instance_id: InstanceId,
    /// Step at the time of the action; 0 for the initial submit
    pub step_order: u32,
    /// Node display name, denormalized for the audit view
    pub node_name: String,
    /// Who performed the action
    pub operator_id: UserId,
    /// Operator display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator_name: Option<String>,
    /// The role credential used, denormalized ("SYSTEM" on auto rows)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator_role: Option<String>,
    /// The action taken
    pub action: ApprovalAction,
    /// Free-form comment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Status before the transition; `None` only on the submit row
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_status: Option<InstanceStatus>,
    /// Status after the transition
    pub to_status: InstanceStatus,
    /// When the row was appended
    pub created_at: DateTime<Utc>,
}

impl ApprovalLog {
    /// Build a log row for one transition.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        instance_id: InstanceId,
        step_order: u32,
        node_name: impl Into<String>,
        operator_id: UserId,
        action: ApprovalAction,
        from_status: Option<InstanceStatus>,
        to_status: InstanceStatus,
    ) -> Self {
        Self {
            id: ApprovalLogId::generate(),
            instance_id,
            step_order,
            node_name: node_name.into(),
            operator_id,
            operator_name: None,
            operator_role: None,
            action,
            comment: None,
            from_status,
            to_status,
            created_at: Utc::now(),
        }
    }

    pub fn with_operator_name(mut self, name: impl Into<String>) -> Self {
        self.operator_name = Some(name.into());
        self
    }

    pub fn with_operator_role(mut self, role: impl Into<String>) -> Self {
        self.operator_role = Some(role.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

// ── Actions ──────────────────────────────────────────────────────────

/// Every action that can appear in the audit trail
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalAction {
    /// Initiator started (or restarted) the workflow
    Submit,
    /// Approver signed off the current step
    Approve,
    /// Approver refused; the instance terminates
    Reject,
    /// Approver sent the document back to the initiator
    Withdraw,
    /// Initiator revoked their own submission
    Cancel,
    /// Automatic carbon-copy / notify advance
    Cc,
}

impl std::fmt::Display for ApprovalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Submit => "SUBMIT",
            Self::Approve => "APPROVE",
            Self::Reject => "REJECT",
            Self::Withdraw => "WITHDRAW",
            Self::Cancel => "CANCEL",
            Self::Cc => "CC",
        };
        write!(f, "{}", s)
    }
}

/// The subset of actions an operator may request on a pending step.
///
/// CANCEL goes through its own initiator-only entry point and SUBMIT/CC
/// are engine-written, so they are not requestable decisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalDecision {
    Approve,
    Reject,
    Withdraw,
}

impl ApprovalDecision {
    /// The audit-trail action this decision records as
    pub fn as_action(&self) -> ApprovalAction {
        match self {
            Self::Approve => ApprovalAction::Approve,
            Self::Reject => ApprovalAction::Reject,
            Self::Withdraw => ApprovalAction::Withdraw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_builder() {
        let row = ApprovalLog::record(
            InstanceId::new("inst-1"),
            1,
            "Regional director approval",
            UserId::new("bob"),
            ApprovalAction::Approve,
            Some(InstanceStatus::Pending),
            InstanceStatus::Pending,
        )
        .with_operator_name("Bob")
        .with_operator_role("regional-director")
        .with_comment("looks fine");

        assert_eq!(row.step_order, 1);
        assert_eq!(row.action, ApprovalAction::Approve);
        assert_eq!(row.from_status, Some(InstanceStatus::Pending));
        assert_eq!(row.operator_role.as_deref(), Some("regional-director"));
        assert_eq!(row.comment.as_deref(), Some("looks fine"));
    }

    #[test]
    fn test_decision_maps_to_action() {
        assert_eq!(
            ApprovalDecision::Approve.as_action(),
            ApprovalAction::Approve
        );
        assert_eq!(ApprovalDecision::Reject.as_action(), ApprovalAction::Reject);
        assert_eq!(
            ApprovalDecision::Withdraw.as_action(),
            ApprovalAction::Withdraw
        );
    }

    #[test]
    fn test_action_wire_format() {
        assert_eq!(
            serde_json::to_string(&ApprovalAction::Cc).unwrap(),
            "\"CC\""
        );
        assert_eq!(
            serde_json::to_string(&ApprovalAction::Submit).unwrap(),
            "\"SUBMIT\""
        );
    }
}
