//! Workflow instances: one running sign-off execution per business document
//!
//! An instance walks its definition's steps in order. `current_step` only
//! ever increases while the instance is pending, and `finished_at` is set
//! exactly once, on entering a terminal status.

use crate::{ApprovalLog, DefinitionId, OrgId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Identifier ───────────────────────────────────────────────────────

/// Unique identifier for a workflow instance
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub String);

impl InstanceId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Business key ─────────────────────────────────────────────────────

/// The opaque key of the external document a workflow governs
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BusinessKey {
    /// Document kind tag (e.g. "ORDER")
    pub business_type: String,
    /// Document identifier within its kind
    pub business_id: String,
}

impl BusinessKey {
    pub fn new(business_type: impl Into<String>, business_id: impl Into<String>) -> Self {
        Self {
            business_type: business_type.into(),
            business_id: business_id.into(),
        }
    }
}

impl std::fmt::Display for BusinessKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.business_type, self.business_id)
    }
}

// ── Workflow Instance ────────────────────────────────────────────────

/// A running (or finished) execution of a workflow definition
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowInstance {
    /// Unique instance identifier
    pub id: InstanceId,
    /// The definition this instance was started from
    pub definition_id: DefinitionId,
    /// The governed business document
    pub business: BusinessKey,
    /// Display-only document number (e.g. "SO-2024-0042")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_no: Option<String>,
    /// The step currently awaiting action, in `[1, total_steps]` while pending
    pub current_step: u32,
    /// Node count snapshotted at creation time
    pub total_steps: u32,
    /// Lifecycle status
    pub status: InstanceStatus,
    /// Who started the workflow
    pub initiator_id: UserId,
    /// Initiator display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiator_name: Option<String>,
    /// Initiator's organizational unit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiator_org_id: Option<OrgId>,
    /// Why the workflow was started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apply_reason: Option<String>,
    /// Optimistic concurrency counter, bumped on every stored mutation
    pub version: u64,
    /// When the instance was created
    pub created_at: DateTime<Utc>,
    /// When the instance was last mutated
    pub updated_at: DateTime<Utc>,
    /// Set exactly once, on entering a terminal status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowInstance {
    /// Create a pending instance at step 1.
    pub fn new(
        definition_id: DefinitionId,
        business: BusinessKey,
        total_steps: u32,
        initiator_id: UserId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: InstanceId::generate(),
            definition_id,
            business,
            business_no: None,
            current_step: 1,
            total_steps,
            status: InstanceStatus::Pending,
            initiator_id,
            initiator_name: None,
            initiator_org_id: None,
            apply_reason: None,
            version: 0,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    pub fn with_business_no(mut self, business_no: impl Into<String>) -> Self {
        self.business_no = Some(business_no.into());
        self
    }

    pub fn with_initiator_name(mut self, name: impl Into<String>) -> Self {
        self.initiator_name = Some(name.into());
        self
    }

    pub fn with_initiator_org(mut self, org_id: OrgId) -> Self {
        self.initiator_org_id = Some(org_id);
        self
    }

    pub fn with_apply_reason(mut self, reason: impl Into<String>) -> Self {
        self.apply_reason = Some(reason.into());
        self
    }

    /// Move to the next step. Only valid while pending and not on the
    /// last step; `current_step` never decreases.
    pub fn advance(&mut self) {
        debug_assert!(self.status == InstanceStatus::Pending);
        debug_assert!(self.current_step < self.total_steps);
        self.current_step += 1;
        self.updated_at = Utc::now();
    }

    /// Enter a terminal status and stamp `finished_at`.
    pub fn finish(&mut self, status: InstanceStatus) {
        debug_assert!(status.is_terminal());
        let now = Utc::now();
        self.status = status;
        self.finished_at = Some(now);
        self.updated_at = now;
    }

    /// Whether the instance is still awaiting action
    pub fn is_pending(&self) -> bool {
        self.status == InstanceStatus::Pending
    }

    /// Whether the instance has reached a terminal status
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether the current step is the last one
    pub fn on_final_step(&self) -> bool {
        self.current_step >= self.total_steps
    }
}

// ── Instance status ──────────────────────────────────────────────────

/// Lifecycle status of a workflow instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    /// Awaiting action at `current_step`
    Pending,
    /// All steps signed off
    Approved,
    /// Refused by an approver
    Rejected,
    /// Withdrawn by the initiator's own request
    Cancelled,
    /// Sent back to the initiator by an approver
    Withdrawn,
}

impl InstanceStatus {
    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Approved | Self::Rejected | Self::Cancelled | Self::Withdrawn
        )
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Cancelled => "CANCELLED",
            Self::Withdrawn => "WITHDRAWN",
        };
        write!(f, "{}", s)
    }
}

// ── Detail view ──────────────────────────────────────────────────────

/// An instance together with its full audit trail, oldest row first
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstanceDetail {
    pub instance: WorkflowInstance,
    pub logs: Vec<ApprovalLog>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_instance() -> WorkflowInstance {
        WorkflowInstance::new(
            DefinitionId::new("def-1"),
            BusinessKey::new("ORDER", "42"),
            3,
            UserId::new("alice"),
        )
    }

    #[test]
    fn test_new_instance_is_pending_at_step_one() {
        let inst = make_instance();
        assert_eq!(inst.current_step, 1);
        assert_eq!(inst.total_steps, 3);
        assert_eq!(inst.status, InstanceStatus::Pending);
        assert_eq!(inst.version, 0);
        assert!(inst.is_pending());
        assert!(!inst.is_terminal());
        assert!(inst.finished_at.is_none());
    }

    #[test]
    fn test_advance_walks_steps_forward() {
        let mut inst = make_instance();
        inst.advance();
        assert_eq!(inst.current_step, 2);
        assert!(!inst.on_final_step());
        inst.advance();
        assert_eq!(inst.current_step, 3);
        assert!(inst.on_final_step());
    }

    #[test]
    fn test_finish_stamps_finished_at_once() {
        let mut inst = make_instance();
        inst.finish(InstanceStatus::Approved);
        assert_eq!(inst.status, InstanceStatus::Approved);
        assert!(inst.is_terminal());
        assert!(inst.finished_at.is_some());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!InstanceStatus::Pending.is_terminal());
        assert!(InstanceStatus::Approved.is_terminal());
        assert!(InstanceStatus::Rejected.is_terminal());
        assert!(InstanceStatus::Cancelled.is_terminal());
        assert!(InstanceStatus::Withdrawn.is_terminal());
    }

    #[test]
    fn test_short_id_truncates_for_log_fields() {
        let id = InstanceId::new("0123456789abcdef");
        assert_eq!(id.short(), "01234567");
        assert_eq!(InstanceId::new("abc").short(), "abc");
    }

    #[test]
    fn test_business_key_display() {
        let key = BusinessKey::new("ORDER", "42");
        assert_eq!(format!("{}", key), "ORDER#42");
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&InstanceStatus::Withdrawn).unwrap();
        assert_eq!(json, "\"WITHDRAWN\"");
        let back: InstanceStatus = serde_json::from_str("\"PENDING\"").unwrap();
        assert_eq!(back, InstanceStatus::Pending);
    }

    #[test]
    fn test_builder_fields() {
        let inst = make_instance()
            .with_business_no("SO-2024-0042")
            .with_initiator_name("Alice")
            .with_initiator_org(OrgId::new("east-region"))
            .with_apply_reason("discount below floor");
        assert_eq!(inst.business_no.as_deref(), Some("SO-2024-0042"));
        assert_eq!(inst.initiator_name.as_deref(), Some("Alice"));
        assert!(inst.initiator_org_id.is_some());
        assert!(inst.apply_reason.is_some());
    }
}
