//! Error taxonomy for the approval workflow engine
//!
//! Every failure maps to a stable, machine-branchable kind via
//! [`WorkflowError::kind`], so callers can react to *why* an operation
//! failed and not just that it failed.

use crate::{BusinessKey, DefinitionId, InstanceId, InstanceStatus, RoleId, UserId};
use thiserror::Error;

/// Result type for workflow operations
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// All failures a workflow operation can report
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("workflow definition [{0}] not found")]
    DefinitionNotFound(String),

    #[error("workflow definition [{0}] is inactive")]
    DefinitionInactive(String),

    #[error("workflow definition [{0}] already exists")]
    DefinitionExists(String),

    #[error("invalid workflow definition: {0}")]
    InvalidDefinition(String),

    #[error("workflow instance {0} not found")]
    InstanceNotFound(InstanceId),

    #[error("definition {definition_id} has no node at step {step}; instance state is corrupt")]
    NodeNotFound {
        definition_id: DefinitionId,
        step: u32,
    },

    #[error("instance {instance_id} is {status}, operation requires a pending instance")]
    InvalidState {
        instance_id: InstanceId,
        status: InstanceStatus,
    },

    #[error("operator {operator} does not hold required role {role}")]
    Unauthorized { operator: UserId, role: RoleId },

    #[error("{0}")]
    Forbidden(String),

    #[error("business document {business} already has an active workflow (instance {instance_id})")]
    DuplicateActiveInstance {
        business: BusinessKey,
        instance_id: InstanceId,
    },

    #[error("creation lock busy for key {0}; concurrent submit rejected")]
    LockBusy(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl WorkflowError {
    /// Stable error kind for callers and transports to branch on.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DefinitionNotFound(_) | Self::InstanceNotFound(_) | Self::NodeNotFound { .. } => {
                "NOT_FOUND"
            }
            Self::DefinitionInactive(_) => "DEFINITION_INACTIVE",
            Self::DefinitionExists(_) => "DEFINITION_EXISTS",
            Self::InvalidDefinition(_) => "INVALID_DEFINITION",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::DuplicateActiveInstance { .. } | Self::Conflict(_) => "CONFLICT",
            Self::LockBusy(_) => "LOCK_BUSY",
            Self::Storage(_) => "STORAGE",
        }
    }
}
