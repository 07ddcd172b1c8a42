//! Domain types for the Signoff approval workflow engine
//!
//! An approval workflow is a linear, role-gated sign-off process over an
//! arbitrary business document. The engine knows nothing about the document
//! beyond its opaque business key (`business_type` + `business_id`).
//!
//! The model has four parts:
//!
//! - [`WorkflowDefinition`] — an immutable template of ordered steps
//! - [`WorkflowNode`] — one step: human approval, CC, or notify
//! - [`WorkflowInstance`] — one running execution against one document
//! - [`ApprovalLog`] — the append-only record of every transition
//!
//! Definitions are immutable once registered. Instances only move along
//! the transitions encoded in [`InstanceStatus`], and every successful
//! move appends exactly one [`ApprovalLog`] row.

#![deny(unsafe_code)]

pub mod actor;
pub mod definition;
pub mod error;
pub mod event;
pub mod instance;
pub mod log;

pub use actor::{OrgId, RoleId, UserId};
pub use definition::{
    DefinitionId, DefinitionStatus, NewDefinition, NewNode, NodeType, WorkflowDefinition,
    WorkflowNode,
};
pub use error::{WorkflowError, WorkflowResult};
pub use event::NodePending;
pub use instance::{BusinessKey, InstanceDetail, InstanceId, InstanceStatus, WorkflowInstance};
pub use log::{ApprovalAction, ApprovalDecision, ApprovalLog, ApprovalLogId, SYSTEM_OPERATOR_ROLE};
