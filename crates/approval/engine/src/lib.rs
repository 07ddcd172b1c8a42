//! Approval workflow engine.
//!
//! The engine drives multi-step, role-gated sign-off processes over
//! arbitrary business documents. It owns every state transition:
//! callers start instances, submit approval decisions, and cancel; the
//! engine checks authorization, applies the transition table, appends
//! the audit trail, and fans out "node pending" notifications.
//!
//! # Key principle
//!
//! **All status changes go through the engine.** Nothing else mutates an
//! instance, and every successful transition leaves exactly one
//! approval-log row behind.
//!
//! # Architecture
//!
//! [`WorkflowEngine`] composes four capability seams:
//!
//! - `WorkflowStore` — atomic instance + log persistence
//! - `DistributedLock` — mutual exclusion around instance creation
//! - [`AuthorizationOracle`] — "does this user hold that role"
//! - [`EventSink`] — best-effort [`NodePending`] fan-out
//!
//! [`NodePending`]: approval_types::NodePending
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use approval_engine::{
//!     NullEventSink, ProcessApproval, StartInstance, StaticRoleOracle, WorkflowEngine,
//! };
//! use approval_lock::InMemoryLock;
//! use approval_store::InMemoryWorkflowStore;
//! use approval_types::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), WorkflowError> {
//! let oracle = Arc::new(StaticRoleOracle::new());
//! oracle.grant(UserId::new("dana"), RoleId::new("regional-director"));
//!
//! let engine = WorkflowEngine::new(
//!     Arc::new(InMemoryWorkflowStore::new()),
//!     Arc::new(InMemoryLock::new()),
//!     oracle,
//!     Arc::new(NullEventSink),
//! );
//!
//! engine
//!     .register_definition(
//!         NewDefinition::new("ORDER_DISCOUNT", "Order discount approval", "ORDER").with_node(
//!             NewNode::approval(1, "Regional director approval", RoleId::new("regional-director")),
//!         ),
//!     )
//!     .await?;
//!
//! let instance = engine
//!     .start_instance(StartInstance::new(
//!         "ORDER_DISCOUNT",
//!         BusinessKey::new("ORDER", "42"),
//!         UserId::new("alice"),
//!     ))
//!     .await?;
//!
//! let instance = engine
//!     .process_approval(
//!         ProcessApproval::new(
//!             instance.id.clone(),
//!             UserId::new("dana"),
//!             ApprovalDecision::Approve,
//!         )
//!         .with_roles(vec![RoleId::new("regional-director")]),
//!     )
//!     .await?;
//! assert_eq!(instance.status, InstanceStatus::Approved);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod engine;
pub mod events;
pub mod oracle;

pub use engine::{CancelInstance, ProcessApproval, StartInstance, TodoQuery, WorkflowEngine};
pub use events::{ChannelEventSink, EventSink, NullEventSink};
pub use oracle::{AuthorizationOracle, StaticRoleOracle};
