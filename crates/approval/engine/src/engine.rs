//! The workflow engine: orchestrates the approval state machine
//!
//! Every state change funnels through here. The engine:
//! 1. Registers and retires workflow definitions
//! 2. Starts instances under a per-business-key creation lock
//! 3. Applies approval decisions behind the role gate
//! 4. Auto-advances CC/NOTIFY steps
//! 5. Appends one audit row per successful transition
//! 6. Emits `NodePending` after every transition that stays pending

use crate::{AuthorizationOracle, EventSink};
use approval_lock::DistributedLock;
use approval_store::{Page, QueryWindow, StorageError, WorkflowStore};
use approval_types::{
    ApprovalDecision, ApprovalLog, BusinessKey, DefinitionStatus, InstanceDetail, InstanceId,
    InstanceStatus, NewDefinition, NodePending, OrgId, RoleId, UserId, WorkflowDefinition,
    WorkflowError, WorkflowInstance, WorkflowResult, SYSTEM_OPERATOR_ROLE,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// TTL of the creation lock. Generous against slow storage, short enough
/// that a crashed holder does not wedge the business key for long.
const START_LOCK_TTL: Duration = Duration::from_secs(15);

// ── Operation inputs ─────────────────────────────────────────────────

/// Input for starting a workflow instance
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StartInstance {
    pub definition_code: String,
    pub business: BusinessKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_no: Option<String>,
    pub initiator_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiator_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiator_org_id: Option<OrgId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apply_reason: Option<String>,
}

impl StartInstance {
    pub fn new(
        definition_code: impl Into<String>,
        business: BusinessKey,
        initiator_id: UserId,
    ) -> Self {
        Self {
            definition_code: definition_code.into(),
            business,
            business_no: None,
            initiator_id,
            initiator_name: None,
            initiator_org_id: None,
            apply_reason: None,
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
}

/// Input for one approval decision on a pending step
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessApproval {
    pub instance_id: InstanceId,
    pub operator_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator_name: Option<String>,
    /// The operator's full role set, recorded on the audit row. The gate
    /// itself asks the authorization oracle, never this list.
    pub operator_roles: Vec<RoleId>,
    pub decision: ApprovalDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ProcessApproval {
    pub fn new(instance_id: InstanceId, operator_id: UserId, decision: ApprovalDecision) -> Self {
        Self {
            instance_id,
            operator_id,
            operator_name: None,
            operator_roles: Vec::new(),
            decision,
            comment: None,
        }
    }

    pub fn with_operator_name(mut self, name: impl Into<String>) -> Self {
        self.operator_name = Some(name.into());
        self
    }

    pub fn with_roles(mut self, roles: Vec<RoleId>) -> Self {
        self.operator_roles = roles;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Input for an initiator cancelling their own pending workflow
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CancelInstance {
    pub instance_id: InstanceId,
    pub operator_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl CancelInstance {
    pub fn new(instance_id: InstanceId, operator_id: UserId) -> Self {
        Self {
            instance_id,
            operator_id,
            operator_name: None,
            comment: None,
        }
    }

    pub fn with_operator_name(mut self, name: impl Into<String>) -> Self {
        self.operator_name = Some(name.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Input for the caller's pending-approval list
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TodoQuery {
    pub user_id: UserId,
    /// Role codes from the caller's session. An empty list short-circuits
    /// to an empty page; membership itself is resolved via the oracle.
    pub roles: Vec<RoleId>,
    /// Carried for API parity with the session payload; not a filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<OrgId>,
    pub page: usize,
    pub page_size: usize,
}

impl TodoQuery {
    pub fn new(user_id: UserId, roles: Vec<RoleId>) -> Self {
        Self {
            user_id,
            roles,
            org_id: None,
            page: 1,
            page_size: 20,
        }
    }

    pub fn with_org(mut self, org_id: OrgId) -> Self {
        self.org_id = Some(org_id);
        self
    }

    pub fn with_page(mut self, page: usize, page_size: usize) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }
}

// ── The engine ───────────────────────────────────────────────────────

/// The approval workflow engine — coordinates, never decides business rules
pub struct WorkflowEngine {
    store: Arc<dyn WorkflowStore>,
    lock: Arc<dyn DistributedLock>,
    oracle: Arc<dyn AuthorizationOracle>,
    events: Arc<dyn EventSink>,
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        lock: Arc<dyn DistributedLock>,
        oracle: Arc<dyn AuthorizationOracle>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            lock,
            oracle,
            events,
        }
    }

    // ── Definition management ────────────────────────────────────────

    /// Register a new workflow definition (administrative operation).
    ///
    /// Validates the node list and enforces code uniqueness. Definitions
    /// are immutable once registered.
    pub async fn register_definition(
        &self,
        input: NewDefinition,
    ) -> WorkflowResult<WorkflowDefinition> {
        input.validate()?;
        if self.store.definition_by_code(&input.code).await?.is_some() {
            return Err(WorkflowError::DefinitionExists(input.code));
        }

        let definition = input.into_definition();
        self.store.insert_definition(definition.clone()).await?;
        tracing::info!(
            id = definition.id.short(),
            code = %definition.code,
            nodes = definition.nodes.len(),
            "workflow definition registered"
        );
        Ok(definition)
    }

    /// Get a definition by code, whatever its status.
    pub async fn definition_by_code(&self, code: &str) -> WorkflowResult<WorkflowDefinition> {
        self.store
            .definition_by_code(code)
            .await?
            .ok_or_else(|| WorkflowError::DefinitionNotFound(code.to_string()))
    }

    /// Retire a definition. Running instances keep going; new starts are
    /// refused with `DefinitionInactive`.
    pub async fn deactivate_definition(&self, code: &str) -> WorkflowResult<()> {
        match self
            .store
            .set_definition_status(code, DefinitionStatus::Inactive)
            .await
        {
            Ok(()) => {
                tracing::info!(code, "workflow definition deactivated");
                Ok(())
            }
            Err(StorageError::NotFound(_)) => {
                Err(WorkflowError::DefinitionNotFound(code.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    // ── Instance lifecycle ───────────────────────────────────────────

    /// Start an approval workflow for a business document.
    ///
    /// Creation runs under a per-business-key lock so that concurrent
    /// duplicate submits fail fast instead of queueing. The lock is
    /// always released, whatever the outcome inside it.
    pub async fn start_instance(&self, params: StartInstance) -> WorkflowResult<WorkflowInstance> {
        let key = format!(
            "workflow:start:{}:{}",
            params.business.business_type, params.business.business_id
        );
        let token = match self.lock.acquire(&key, START_LOCK_TTL).await {
            Some(token) => token,
            None => {
                tracing::warn!(
                    key = %key,
                    initiator = %params.initiator_id,
                    "duplicate submit rejected, creation lock busy"
                );
                return Err(WorkflowError::LockBusy(key));
            }
        };

        let result = self.start_locked(params).await;

        if !self.lock.release(&key, &token).await {
            tracing::warn!(key = %key, "creation lock expired before release");
        }
        result
    }

    async fn start_locked(&self, params: StartInstance) -> WorkflowResult<WorkflowInstance> {
        let definition = {
            let def = self.definition_by_code(&params.definition_code).await?;
            if !def.is_active() {
                return Err(WorkflowError::DefinitionInactive(params.definition_code));
            }
            def
        };

        // The lock narrows the race window; the uniqueness rule itself is
        // re-checked here and enforced once more by the store.
        if let Some(existing) = self.store.active_instance_for(&params.business).await? {
            return Err(WorkflowError::DuplicateActiveInstance {
                business: params.business,
                instance_id: existing.id,
            });
        }

        let mut instance = WorkflowInstance::new(
            definition.id.clone(),
            params.business,
            definition.total_steps(),
            params.initiator_id,
        );
        if let Some(no) = params.business_no {
            instance = instance.with_business_no(no);
        }
        if let Some(name) = params.initiator_name {
            instance = instance.with_initiator_name(name);
        }
        if let Some(org) = params.initiator_org_id {
            instance = instance.with_initiator_org(org);
        }
        if let Some(reason) = params.apply_reason {
            instance = instance.with_apply_reason(reason);
        }

        let mut submit = ApprovalLog::record(
            instance.id.clone(),
            0,
            "Submit",
            instance.initiator_id.clone(),
            approval_types::ApprovalAction::Submit,
            None,
            InstanceStatus::Pending,
        );
        if let Some(name) = &instance.initiator_name {
            submit = submit.with_operator_name(name.clone());
        }
        if let Some(reason) = &instance.apply_reason {
            submit = submit.with_comment(reason.clone());
        }

        self.store.create_instance(instance.clone(), submit).await?;
        tracing::info!(
            instance_id = instance.id.short(),
            business = %instance.business,
            code = %definition.code,
            "approval workflow started"
        );

        let instance = self.auto_advance(instance, &definition).await?;
        self.emit_if_pending(&instance, &definition);
        Ok(instance)
    }

    /// Apply one approval decision to the current step of an instance.
    pub async fn process_approval(
        &self,
        params: ProcessApproval,
    ) -> WorkflowResult<WorkflowInstance> {
        let instance = self
            .store
            .instance_by_id(&params.instance_id)
            .await?
            .ok_or_else(|| WorkflowError::InstanceNotFound(params.instance_id.clone()))?;
        if !instance.is_pending() {
            return Err(WorkflowError::InvalidState {
                instance_id: instance.id,
                status: instance.status,
            });
        }

        let definition = self
            .store
            .definition_by_id(&instance.definition_id)
            .await?
            .ok_or_else(|| WorkflowError::DefinitionNotFound(instance.definition_id.to_string()))?;
        let node = definition
            .node_at(instance.current_step)
            .ok_or_else(|| WorkflowError::NodeNotFound {
                definition_id: definition.id.clone(),
                step: instance.current_step,
            })?
            .clone();

        // Authorization gate. A refused attempt mutates nothing and
        // leaves no audit row.
        if let Some(role) = &node.role_id {
            if !self.oracle.has_role(&params.operator_id, role).await {
                tracing::warn!(
                    instance_id = instance.id.short(),
                    operator = %params.operator_id,
                    role = %role,
                    step = node.step_order,
                    "unauthorized approval attempt blocked"
                );
                return Err(WorkflowError::Unauthorized {
                    operator: params.operator_id,
                    role: role.clone(),
                });
            }
        }

        let expected_version = instance.version;
        let mut instance = instance;
        let to_status = match params.decision {
            ApprovalDecision::Approve => {
                if instance.on_final_step() {
                    instance.finish(InstanceStatus::Approved);
                    InstanceStatus::Approved
                } else {
                    instance.advance();
                    InstanceStatus::Pending
                }
            }
            ApprovalDecision::Reject => {
                instance.finish(InstanceStatus::Rejected);
                InstanceStatus::Rejected
            }
            ApprovalDecision::Withdraw => {
                instance.finish(InstanceStatus::Withdrawn);
                InstanceStatus::Withdrawn
            }
        };

        let mut log = ApprovalLog::record(
            instance.id.clone(),
            node.step_order,
            node.node_name.clone(),
            params.operator_id,
            params.decision.as_action(),
            Some(InstanceStatus::Pending),
            to_status,
        );
        if let Some(name) = params.operator_name {
            log = log.with_operator_name(name);
        }
        if let Some(role) = params.operator_roles.first() {
            log = log.with_operator_role(role.0.clone());
        }
        if let Some(comment) = params.comment {
            log = log.with_comment(comment);
        }

        let mut instance = self
            .store
            .update_instance(&instance, expected_version, log)
            .await?;
        tracing::info!(
            instance_id = instance.id.short(),
            action = %params.decision.as_action(),
            status = %instance.status,
            step = node.step_order,
            "approval processed"
        );

        if instance.is_pending() {
            instance = self.auto_advance(instance, &definition).await?;
            self.emit_if_pending(&instance, &definition);
        }
        Ok(instance)
    }

    /// Cancel a pending workflow. Only the original initiator may do this.
    pub async fn cancel_instance(
        &self,
        params: CancelInstance,
    ) -> WorkflowResult<WorkflowInstance> {
        let instance = self
            .store
            .instance_by_id(&params.instance_id)
            .await?
            .ok_or_else(|| WorkflowError::InstanceNotFound(params.instance_id.clone()))?;
        if !instance.is_pending() {
            return Err(WorkflowError::InvalidState {
                instance_id: instance.id,
                status: instance.status,
            });
        }
        if instance.initiator_id != params.operator_id {
            return Err(WorkflowError::Forbidden(
                "only the initiator may cancel their own request".to_string(),
            ));
        }

        let expected_version = instance.version;
        let mut instance = instance;
        instance.finish(InstanceStatus::Cancelled);

        let mut log = ApprovalLog::record(
            instance.id.clone(),
            instance.current_step,
            "Cancel",
            params.operator_id,
            approval_types::ApprovalAction::Cancel,
            Some(InstanceStatus::Pending),
            InstanceStatus::Cancelled,
        );
        if let Some(name) = params.operator_name {
            log = log.with_operator_name(name);
        }
        if let Some(comment) = params.comment {
            log = log.with_comment(comment);
        }

        let instance = self
            .store
            .update_instance(&instance, expected_version, log)
            .await?;
        tracing::info!(
            instance_id = instance.id.short(),
            "workflow cancelled by initiator"
        );
        Ok(instance)
    }

    // ── Read side ────────────────────────────────────────────────────

    /// Pending instances whose current step the caller may approve.
    pub async fn my_todos(&self, query: TodoQuery) -> WorkflowResult<Page<WorkflowInstance>> {
        if query.roles.is_empty() {
            return Ok(Page::empty());
        }
        let role_ids = self.oracle.roles_for(&query.user_id).await;
        if role_ids.is_empty() {
            return Ok(Page::empty());
        }
        let steps = self.store.approval_steps_for_roles(&role_ids).await?;
        if steps.is_empty() {
            return Ok(Page::empty());
        }

        let page = query.page.max(1);
        let window = QueryWindow {
            limit: query.page_size,
            offset: (page - 1) * query.page_size,
        };
        Ok(self.store.pending_instances_at(&steps, window).await?)
    }

    /// One instance with its full audit trail.
    pub async fn instance_by_id(&self, id: &InstanceId) -> WorkflowResult<InstanceDetail> {
        let instance = self
            .store
            .instance_by_id(id)
            .await?
            .ok_or_else(|| WorkflowError::InstanceNotFound(id.clone()))?;
        let logs = self.store.logs_for_instance(&instance.id).await?;
        Ok(InstanceDetail { instance, logs })
    }

    /// The most recent instance for a business document, if any.
    pub async fn instance_by_business(
        &self,
        business: &BusinessKey,
    ) -> WorkflowResult<Option<InstanceDetail>> {
        let Some(instance) = self.store.latest_instance_for(business).await? else {
            return Ok(None);
        };
        let logs = self.store.logs_for_instance(&instance.id).await?;
        Ok(Some(InstanceDetail { instance, logs }))
    }

    /// Guard for outside business services: fails with a conflict while
    /// the document has a workflow in flight.
    pub async fn assert_no_active_instance(&self, business: &BusinessKey) -> WorkflowResult<()> {
        if let Some(existing) = self.store.active_instance_for(business).await? {
            return Err(WorkflowError::DuplicateActiveInstance {
                business: business.clone(),
                instance_id: existing.id,
            });
        }
        Ok(())
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Walk forward through CC/NOTIFY steps, one audit row each, until
    /// an APPROVAL step or the end of the chain.
    async fn auto_advance(
        &self,
        mut instance: WorkflowInstance,
        definition: &WorkflowDefinition,
    ) -> WorkflowResult<WorkflowInstance> {
        // Iteration ceiling bounds the walk even against a malformed
        // definition.
        let mut remaining = instance.total_steps;
        while remaining > 0 && instance.is_pending() {
            remaining -= 1;
            let node = match definition.node_at(instance.current_step) {
                Some(node) if !node.requires_decision() => node.clone(),
                _ => break,
            };

            let expected_version = instance.version;
            let to_status = if instance.on_final_step() {
                instance.finish(InstanceStatus::Approved);
                InstanceStatus::Approved
            } else {
                instance.advance();
                InstanceStatus::Pending
            };

            let mut log = ApprovalLog::record(
                instance.id.clone(),
                node.step_order,
                node.node_name.clone(),
                instance.initiator_id.clone(),
                approval_types::ApprovalAction::Cc,
                Some(InstanceStatus::Pending),
                to_status,
            )
            .with_operator_role(SYSTEM_OPERATOR_ROLE)
            .with_comment("auto-forwarded");
            if let Some(name) = &instance.initiator_name {
                log = log.with_operator_name(name.clone());
            }

            instance = self
                .store
                .update_instance(&instance, expected_version, log)
                .await?;
            tracing::debug!(
                instance_id = instance.id.short(),
                step = node.step_order,
                node_type = ?node.node_type,
                "auto-advanced non-approval step"
            );
        }
        Ok(instance)
    }

    /// Emit `NodePending` when the instance rests on a role-gated step.
    /// Best-effort: failures stay inside the sink.
    fn emit_if_pending(&self, instance: &WorkflowInstance, definition: &WorkflowDefinition) {
        if !instance.is_pending() {
            return;
        }
        let Some(node) = definition.node_at(instance.current_step) else {
            return;
        };
        let Some(role_id) = &node.role_id else {
            return;
        };

        let event = NodePending {
            instance_id: instance.id.clone(),
            workflow_code: definition.code.clone(),
            workflow_name: definition.name.clone(),
            current_step: instance.current_step,
            role_id: role_id.clone(),
            business: instance.business.clone(),
            submitted_by_user_id: instance.initiator_id.clone(),
            submitted_by_name: instance
                .initiator_name
                .clone()
                .unwrap_or_else(|| format!("user#{}", instance.initiator_id)),
            submitted_at: instance.created_at,
        };
        tracing::debug!(
            instance_id = instance.id.short(),
            role = %role_id,
            step = instance.current_step,
            "node pending"
        );
        self.events.node_pending(event);
    }
}
