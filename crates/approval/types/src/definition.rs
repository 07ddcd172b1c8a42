//! Workflow definitions: immutable templates of ordered approval steps
//!
//! A definition is a flat, totally ordered list of nodes (`step_order`
//! runs 1..=n with no gaps). It is validated once at registration and
//! never structurally mutated afterwards; running instances snapshot the
//! node count so later administrative changes cannot corrupt them.

use crate::{RoleId, WorkflowError, WorkflowResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Identifier ───────────────────────────────────────────────────────

/// Unique identifier for a workflow definition
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DefinitionId(pub String);

impl DefinitionId {
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

impl std::fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Workflow Definition ──────────────────────────────────────────────

/// An approval workflow template
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique identifier
    pub id: DefinitionId,
    /// Globally unique, immutable code (e.g. "ORDER_DISCOUNT")
    pub code: String,
    /// Human-readable name
    pub name: String,
    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Free-form business tag (e.g. "ORDER", "CREDIT_RELEASE")
    pub business_type: String,
    /// Whether new instances may be started from this definition
    pub status: DefinitionStatus,
    /// Ordered steps, sorted by `step_order`
    pub nodes: Vec<WorkflowNode>,
    /// When this definition was registered
    pub created_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    /// Number of steps in this definition
    pub fn total_steps(&self) -> u32 {
        self.nodes.len() as u32
    }

    /// The node at a given step, if any
    pub fn node_at(&self, step_order: u32) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.step_order == step_order)
    }

    /// Whether new instances may be started
    pub fn is_active(&self) -> bool {
        self.status == DefinitionStatus::Active
    }
}

/// Administrative status of a definition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DefinitionStatus {
    /// May be used to start new instances
    Active,
    /// Retired; existing instances keep running, new starts are refused
    Inactive,
}

// ── Workflow Node ────────────────────────────────────────────────────

/// One step within a workflow definition
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// The owning definition
    pub definition_id: DefinitionId,
    /// Position in the sign-off chain, starting at 1
    pub step_order: u32,
    /// Display name (e.g. "Regional director approval")
    pub node_name: String,
    /// Whether this step needs a human decision or auto-advances
    pub node_type: NodeType,
    /// Role required to act on this step; `None` means any operator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_id: Option<RoleId>,
    /// Whether the initiator may resubmit after a withdrawal (informational)
    pub allow_resubmit: bool,
    /// Advisory timeout in hours; 0 means none. No sweeper consumes this.
    pub timeout_hours: u32,
    /// Free-form remark
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
}

impl WorkflowNode {
    /// Whether this step blocks on a human decision
    pub fn requires_decision(&self) -> bool {
        self.node_type == NodeType::Approval
    }
}

/// The kind of a workflow step
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    /// Waits for an approver holding the node's role
    Approval,
    /// Carbon copy; recorded and auto-advanced
    Cc,
    /// Notification fan-out; auto-advanced, never blocks
    Notify,
}

// ── Registration input ───────────────────────────────────────────────

/// Input for registering a new workflow definition
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewDefinition {
    pub code: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub business_type: String,
    pub nodes: Vec<NewNode>,
}

impl NewDefinition {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        business_type: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            description: None,
            business_type: business_type.into(),
            nodes: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_node(mut self, node: NewNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// Validate the node list: non-empty, `step_order` exactly 1..=n.
    pub fn validate(&self) -> WorkflowResult<()> {
        if self.code.trim().is_empty() {
            return Err(WorkflowError::InvalidDefinition(
                "definition code must not be empty".to_string(),
            ));
        }
        if self.nodes.is_empty() {
            return Err(WorkflowError::InvalidDefinition(format!(
                "definition [{}] has no nodes",
                self.code
            )));
        }

        let mut orders: Vec<u32> = self.nodes.iter().map(|n| n.step_order).collect();
        orders.sort_unstable();
        for (idx, order) in orders.iter().enumerate() {
            let expected = idx as u32 + 1;
            if *order != expected {
                return Err(WorkflowError::InvalidDefinition(format!(
                    "definition [{}] step orders must run 1..={} without gaps, found {}",
                    self.code,
                    self.nodes.len(),
                    order
                )));
            }
        }
        Ok(())
    }

    /// Materialize an immutable definition from validated input.
    ///
    /// Call [`NewDefinition::validate`] first; this sorts nodes by step order
    /// and stamps the generated identifier onto each node.
    pub fn into_definition(self) -> WorkflowDefinition {
        let id = DefinitionId::generate();
        let mut nodes: Vec<WorkflowNode> = self
            .nodes
            .into_iter()
            .map(|n| WorkflowNode {
                definition_id: id.clone(),
                step_order: n.step_order,
                node_name: n.node_name,
                node_type: n.node_type,
                role_id: n.role_id,
                allow_resubmit: n.allow_resubmit,
                timeout_hours: n.timeout_hours,
                remark: n.remark,
            })
            .collect();
        nodes.sort_by_key(|n| n.step_order);

        WorkflowDefinition {
            id,
            code: self.code,
            name: self.name,
            description: self.description,
            business_type: self.business_type,
            status: DefinitionStatus::Active,
            nodes,
            created_at: Utc::now(),
        }
    }
}

/// Input for one step of a new definition
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewNode {
    pub step_order: u32,
    pub node_name: String,
    pub node_type: NodeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_id: Option<RoleId>,
    pub allow_resubmit: bool,
    pub timeout_hours: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
}

impl NewNode {
    /// An approval step gated on a role
    pub fn approval(step_order: u32, node_name: impl Into<String>, role_id: RoleId) -> Self {
        Self {
            step_order,
            node_name: node_name.into(),
            node_type: NodeType::Approval,
            role_id: Some(role_id),
            allow_resubmit: true,
            timeout_hours: 0,
            remark: None,
        }
    }

    /// An approval step any authenticated operator may act on
    pub fn open_approval(step_order: u32, node_name: impl Into<String>) -> Self {
        Self {
            step_order,
            node_name: node_name.into(),
            node_type: NodeType::Approval,
            role_id: None,
            allow_resubmit: true,
            timeout_hours: 0,
            remark: None,
        }
    }

    /// A carbon-copy step (auto-advanced)
    pub fn cc(step_order: u32, node_name: impl Into<String>) -> Self {
        Self {
            step_order,
            node_name: node_name.into(),
            node_type: NodeType::Cc,
            role_id: None,
            allow_resubmit: true,
            timeout_hours: 0,
            remark: None,
        }
    }

    /// A notify step (auto-advanced)
    pub fn notify(step_order: u32, node_name: impl Into<String>) -> Self {
        Self {
            step_order,
            node_name: node_name.into(),
            node_type: NodeType::Notify,
            role_id: None,
            allow_resubmit: true,
            timeout_hours: 0,
            remark: None,
        }
    }

    pub fn with_role(mut self, role_id: RoleId) -> Self {
        self.role_id = Some(role_id);
        self
    }

    pub fn with_timeout_hours(mut self, hours: u32) -> Self {
        self.timeout_hours = hours;
        self
    }

    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = Some(remark.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_step_input() -> NewDefinition {
        NewDefinition::new("ORDER_DISCOUNT", "Order discount approval", "ORDER")
            .with_node(NewNode::approval(
                1,
                "Regional director approval",
                RoleId::new("regional-director"),
            ))
            .with_node(NewNode::cc(2, "Finance CC"))
    }

    #[test]
    fn test_validate_and_materialize() {
        let input = two_step_input();
        input.validate().unwrap();

        let def = input.into_definition();
        assert_eq!(def.code, "ORDER_DISCOUNT");
        assert_eq!(def.status, DefinitionStatus::Active);
        assert_eq!(def.total_steps(), 2);
        assert!(def.is_active());

        let first = def.node_at(1).unwrap();
        assert_eq!(first.node_type, NodeType::Approval);
        assert!(first.requires_decision());
        assert_eq!(first.definition_id, def.id);

        let second = def.node_at(2).unwrap();
        assert_eq!(second.node_type, NodeType::Cc);
        assert!(!second.requires_decision());

        assert!(def.node_at(3).is_none());
    }

    #[test]
    fn test_nodes_sorted_by_step_order() {
        let input = NewDefinition::new("QUALITY_ISSUE", "Quality issue", "QUALITY")
            .with_node(NewNode::cc(2, "CC"))
            .with_node(NewNode::open_approval(1, "Supervisor approval"));
        input.validate().unwrap();

        let def = input.into_definition();
        assert_eq!(def.nodes[0].step_order, 1);
        assert_eq!(def.nodes[1].step_order, 2);
    }

    #[test]
    fn test_validate_rejects_empty_nodes() {
        let input = NewDefinition::new("EMPTY", "Empty", "ORDER");
        assert!(matches!(
            input.validate(),
            Err(WorkflowError::InvalidDefinition(_))
        ));
    }

    #[test]
    fn test_validate_rejects_empty_code() {
        let input =
            NewDefinition::new("  ", "Blank code", "ORDER").with_node(NewNode::cc(1, "CC"));
        assert!(matches!(
            input.validate(),
            Err(WorkflowError::InvalidDefinition(_))
        ));
    }

    #[test]
    fn test_validate_rejects_gapped_step_orders() {
        let input = NewDefinition::new("GAPPED", "Gapped", "ORDER")
            .with_node(NewNode::cc(1, "a"))
            .with_node(NewNode::cc(3, "b"));
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_step_orders() {
        let input = NewDefinition::new("DUP", "Dup", "ORDER")
            .with_node(NewNode::cc(1, "a"))
            .with_node(NewNode::cc(1, "b"));
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_step_order() {
        let input = NewDefinition::new("ZERO", "Zero", "ORDER").with_node(NewNode::cc(0, "a"));
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_node_builders() {
        let node = NewNode::approval(1, "CFO approval", RoleId::new("cfo"))
            .with_timeout_hours(48)
            .with_remark("escalate to board if idle");
        assert_eq!(node.timeout_hours, 48);
        assert!(node.remark.is_some());
        assert_eq!(node.role_id, Some(RoleId::new("cfo")));

        let cc = NewNode::cc(2, "Sales CC").with_role(RoleId::new("sales"));
        assert_eq!(cc.node_type, NodeType::Cc);
        assert_eq!(cc.role_id, Some(RoleId::new("sales")));
    }

    #[test]
    fn test_short_id_truncates_for_log_fields() {
        let def = two_step_input().into_definition();
        assert_eq!(def.id.short().len(), 8);
        assert!(def.id.0.starts_with(def.id.short()));
    }

    #[test]
    fn test_status_serializes_upper_case() {
        let json = serde_json::to_string(&DefinitionStatus::Inactive).unwrap();
        assert_eq!(json, "\"INACTIVE\"");
    }
}
