use crate::StorageResult;
use approval_types::{
    ApprovalLog, BusinessKey, DefinitionId, DefinitionStatus, InstanceId, RoleId,
    WorkflowDefinition, WorkflowInstance,
};
use async_trait::async_trait;

/// Generic query window for paged reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

/// One page of results plus the total match count.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }
}

/// Storage interface for workflow definitions.
#[async_trait]
pub trait DefinitionStore: Send + Sync {
    /// Insert a definition with its nodes. Fails with `Conflict` when the
    /// code is already taken.
    async fn insert_definition(&self, definition: WorkflowDefinition) -> StorageResult<()>;

    /// Get one definition (with nodes, sorted by step order) by code.
    async fn definition_by_code(&self, code: &str) -> StorageResult<Option<WorkflowDefinition>>;

    /// Get one definition by id.
    async fn definition_by_id(
        &self,
        id: &DefinitionId,
    ) -> StorageResult<Option<WorkflowDefinition>>;

    /// Flip a definition's administrative status.
    async fn set_definition_status(
        &self,
        code: &str,
        status: DefinitionStatus,
    ) -> StorageResult<()>;

    /// All `(definition_id, step_order)` pairs of APPROVAL nodes owned by
    /// any of the given roles. Feeds the todo-list query.
    async fn approval_steps_for_roles(
        &self,
        roles: &[RoleId],
    ) -> StorageResult<Vec<(DefinitionId, u32)>>;
}

/// Storage interface for workflow instances.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Insert a new instance together with its SUBMIT log row as one
    /// atomic unit. Fails with `Conflict` when a pending instance already
    /// exists for the same business key.
    async fn create_instance(
        &self,
        instance: WorkflowInstance,
        submit_log: ApprovalLog,
    ) -> StorageResult<()>;

    /// Get one instance by id.
    async fn instance_by_id(&self, id: &InstanceId) -> StorageResult<Option<WorkflowInstance>>;

    /// The pending instance for a business key, if any.
    async fn active_instance_for(
        &self,
        business: &BusinessKey,
    ) -> StorageResult<Option<WorkflowInstance>>;

    /// The most recently created instance for a business key, if any.
    async fn latest_instance_for(
        &self,
        business: &BusinessKey,
    ) -> StorageResult<Option<WorkflowInstance>>;

    /// Persist a mutated instance together with its log row as one atomic
    /// unit. The write only succeeds when the stored version still equals
    /// `expected_version`; the winner's version is bumped and returned,
    /// the loser gets `VersionMismatch`.
    async fn update_instance(
        &self,
        instance: &WorkflowInstance,
        expected_version: u64,
        log: ApprovalLog,
    ) -> StorageResult<WorkflowInstance>;

    /// Pending instances whose `(definition_id, current_step)` matches one
    /// of the given approval steps, newest first.
    async fn pending_instances_at(
        &self,
        steps: &[(DefinitionId, u32)],
        window: QueryWindow,
    ) -> StorageResult<Page<WorkflowInstance>>;
}

/// Storage interface for the append-only approval log.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// All log rows for one instance, oldest first.
    async fn logs_for_instance(&self, id: &InstanceId) -> StorageResult<Vec<ApprovalLog>>;
}

/// Unified storage bundle the engine runs against.
pub trait WorkflowStore: DefinitionStore + InstanceStore + LogStore + Send + Sync {}

impl<T> WorkflowStore for T where T: DefinitionStore + InstanceStore + LogStore + Send + Sync {}
