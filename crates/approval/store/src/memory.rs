//! In-memory reference implementation of the workflow storage traits.
//!
//! This adapter is deterministic and test-friendly. Production deployments
//! should use a transactional backend for source-of-truth data.
//!
//! A single lock guards the whole state so that instance + log writes are
//! atomic, matching the "single transaction or equivalent" contract the
//! engine relies on.

use crate::traits::{DefinitionStore, InstanceStore, LogStore, Page, QueryWindow};
use crate::{StorageError, StorageResult};
use approval_types::{
    ApprovalLog, BusinessKey, DefinitionId, DefinitionStatus, InstanceId, InstanceStatus, NodeType,
    RoleId, WorkflowDefinition, WorkflowInstance,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
struct State {
    definitions: HashMap<DefinitionId, WorkflowDefinition>,
    definitions_by_code: HashMap<String, DefinitionId>,
    instances: HashMap<InstanceId, WorkflowInstance>,
    /// Append order doubles as the creation-time order within an instance.
    logs: Vec<ApprovalLog>,
}

/// In-memory workflow storage adapter.
#[derive(Default)]
pub struct InMemoryWorkflowStore {
    state: RwLock<State>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of log rows across all instances (test helper).
    pub fn log_count(&self) -> usize {
        self.state.read().map(|s| s.logs.len()).unwrap_or(0)
    }
}

fn poisoned(what: &str) -> StorageError {
    StorageError::Backend(format!("{what} lock poisoned"))
}

#[async_trait]
impl DefinitionStore for InMemoryWorkflowStore {
    async fn insert_definition(&self, definition: WorkflowDefinition) -> StorageResult<()> {
        let mut state = self.state.write().map_err(|_| poisoned("store"))?;
        if state.definitions_by_code.contains_key(&definition.code) {
            tracing::warn!(code = %definition.code, "definition code already taken");
            return Err(StorageError::Conflict(format!(
                "definition code [{}] already exists",
                definition.code
            )));
        }
        state
            .definitions_by_code
            .insert(definition.code.clone(), definition.id.clone());
        state.definitions.insert(definition.id.clone(), definition);
        Ok(())
    }

    async fn definition_by_code(&self, code: &str) -> StorageResult<Option<WorkflowDefinition>> {
        let state = self.state.read().map_err(|_| poisoned("store"))?;
        Ok(state
            .definitions_by_code
            .get(code)
            .and_then(|id| state.definitions.get(id))
            .cloned())
    }

    async fn definition_by_id(
        &self,
        id: &DefinitionId,
    ) -> StorageResult<Option<WorkflowDefinition>> {
        let state = self.state.read().map_err(|_| poisoned("store"))?;
        Ok(state.definitions.get(id).cloned())
    }

    async fn set_definition_status(
        &self,
        code: &str,
        status: DefinitionStatus,
    ) -> StorageResult<()> {
        let mut state = self.state.write().map_err(|_| poisoned("store"))?;
        let id = state
            .definitions_by_code
            .get(code)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("definition [{code}]")))?;
        let def = state
            .definitions
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("definition [{code}]")))?;
        def.status = status;
        Ok(())
    }

    async fn approval_steps_for_roles(
        &self,
        roles: &[RoleId],
    ) -> StorageResult<Vec<(DefinitionId, u32)>> {
        let state = self.state.read().map_err(|_| poisoned("store"))?;
        let mut steps = Vec::new();
        for def in state.definitions.values() {
            for node in &def.nodes {
                if node.node_type != NodeType::Approval {
                    continue;
                }
                if let Some(role) = &node.role_id {
                    if roles.contains(role) {
                        steps.push((def.id.clone(), node.step_order));
                    }
                }
            }
        }
        Ok(steps)
    }
}

#[async_trait]
impl InstanceStore for InMemoryWorkflowStore {
    async fn create_instance(
        &self,
        instance: WorkflowInstance,
        submit_log: ApprovalLog,
    ) -> StorageResult<()> {
        let mut state = self.state.write().map_err(|_| poisoned("store"))?;

        // Same uniqueness rule as the engine's pre-check, enforced again
        // at the storage layer: at most one pending instance per key.
        if let Some(existing) = state
            .instances
            .values()
            .find(|i| i.business == instance.business && i.status == InstanceStatus::Pending)
        {
            tracing::warn!(
                business = %instance.business,
                existing = %existing.id,
                "pending instance already exists for business key"
            );
            return Err(StorageError::Conflict(format!(
                "business {} already has pending instance {}",
                instance.business, existing.id
            )));
        }
        if state.instances.contains_key(&instance.id) {
            return Err(StorageError::Conflict(format!(
                "instance {} already exists",
                instance.id
            )));
        }

        state.instances.insert(instance.id.clone(), instance);
        state.logs.push(submit_log);
        Ok(())
    }

    async fn instance_by_id(&self, id: &InstanceId) -> StorageResult<Option<WorkflowInstance>> {
        let state = self.state.read().map_err(|_| poisoned("store"))?;
        Ok(state.instances.get(id).cloned())
    }

    async fn active_instance_for(
        &self,
        business: &BusinessKey,
    ) -> StorageResult<Option<WorkflowInstance>> {
        let state = self.state.read().map_err(|_| poisoned("store"))?;
        Ok(state
            .instances
            .values()
            .find(|i| &i.business == business && i.status == InstanceStatus::Pending)
            .cloned())
    }

    async fn latest_instance_for(
        &self,
        business: &BusinessKey,
    ) -> StorageResult<Option<WorkflowInstance>> {
        let state = self.state.read().map_err(|_| poisoned("store"))?;
        Ok(state
            .instances
            .values()
            .filter(|i| &i.business == business)
            .max_by_key(|i| i.created_at)
            .cloned())
    }

    async fn update_instance(
        &self,
        instance: &WorkflowInstance,
        expected_version: u64,
        log: ApprovalLog,
    ) -> StorageResult<WorkflowInstance> {
        let mut state = self.state.write().map_err(|_| poisoned("store"))?;
        let stored = state
            .instances
            .get_mut(&instance.id)
            .ok_or_else(|| StorageError::NotFound(format!("instance {}", instance.id)))?;

        if stored.version != expected_version {
            tracing::warn!(
                instance_id = %instance.id,
                expected = expected_version,
                found = stored.version,
                "concurrent update lost the version race"
            );
            return Err(StorageError::VersionMismatch(format!(
                "instance {} was modified concurrently (expected version {}, found {})",
                instance.id, expected_version, stored.version
            )));
        }

        let mut updated = instance.clone();
        updated.version = expected_version + 1;
        *stored = updated.clone();
        state.logs.push(log);
        Ok(updated)
    }

    async fn pending_instances_at(
        &self,
        steps: &[(DefinitionId, u32)],
        window: QueryWindow,
    ) -> StorageResult<Page<WorkflowInstance>> {
        let state = self.state.read().map_err(|_| poisoned("store"))?;
        let mut matches: Vec<WorkflowInstance> = state
            .instances
            .values()
            .filter(|i| {
                i.status == InstanceStatus::Pending
                    && steps
                        .iter()
                        .any(|(def, step)| def == &i.definition_id && *step == i.current_step)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matches.len();
        let items = apply_window(matches, window);
        Ok(Page { items, total })
    }
}

#[async_trait]
impl LogStore for InMemoryWorkflowStore {
    async fn logs_for_instance(&self, id: &InstanceId) -> StorageResult<Vec<ApprovalLog>> {
        let state = self.state.read().map_err(|_| poisoned("store"))?;
        Ok(state
            .logs
            .iter()
            .filter(|l| &l.instance_id == id)
            .cloned()
            .collect())
    }
}

fn apply_window<T>(items: Vec<T>, window: QueryWindow) -> Vec<T> {
    let iter = items.into_iter().skip(window.offset);
    if window.limit == 0 {
        iter.collect()
    } else {
        iter.take(window.limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approval_types::{ApprovalAction, NewDefinition, NewNode, UserId};

    fn sample_definition(code: &str) -> WorkflowDefinition {
        NewDefinition::new(code, "Sample", "ORDER")
            .with_node(NewNode::approval(
                1,
                "Director approval",
                RoleId::new("director"),
            ))
            .with_node(NewNode::cc(2, "Finance CC"))
            .into_definition()
    }

    fn sample_instance(def: &WorkflowDefinition, business_id: &str) -> WorkflowInstance {
        WorkflowInstance::new(
            def.id.clone(),
            BusinessKey::new("ORDER", business_id),
            def.total_steps(),
            UserId::new("alice"),
        )
    }

    fn submit_log(instance: &WorkflowInstance) -> ApprovalLog {
        ApprovalLog::record(
            instance.id.clone(),
            0,
            "Submit",
            instance.initiator_id.clone(),
            ApprovalAction::Submit,
            None,
            InstanceStatus::Pending,
        )
    }

    #[tokio::test]
    async fn definition_code_is_unique() {
        let store = InMemoryWorkflowStore::new();
        store
            .insert_definition(sample_definition("ORDER_DISCOUNT"))
            .await
            .unwrap();
        let result = store
            .insert_definition(sample_definition("ORDER_DISCOUNT"))
            .await;
        assert!(matches!(result, Err(StorageError::Conflict(_))));

        let fetched = store
            .definition_by_code("ORDER_DISCOUNT")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.total_steps(), 2);
    }

    #[tokio::test]
    async fn set_status_flips_definition() {
        let store = InMemoryWorkflowStore::new();
        store
            .insert_definition(sample_definition("ORDER_DISCOUNT"))
            .await
            .unwrap();
        store
            .set_definition_status("ORDER_DISCOUNT", DefinitionStatus::Inactive)
            .await
            .unwrap();
        let def = store
            .definition_by_code("ORDER_DISCOUNT")
            .await
            .unwrap()
            .unwrap();
        assert!(!def.is_active());

        let missing = store
            .set_definition_status("NOPE", DefinitionStatus::Inactive)
            .await;
        assert!(matches!(missing, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn one_pending_instance_per_business_key() {
        let store = InMemoryWorkflowStore::new();
        let def = sample_definition("ORDER_DISCOUNT");
        store.insert_definition(def.clone()).await.unwrap();

        let first = sample_instance(&def, "42");
        store
            .create_instance(first.clone(), submit_log(&first))
            .await
            .unwrap();

        let second = sample_instance(&def, "42");
        let result = store
            .create_instance(second.clone(), submit_log(&second))
            .await;
        assert!(matches!(result, Err(StorageError::Conflict(_))));

        // A different key is fine.
        let other = sample_instance(&def, "43");
        store
            .create_instance(other.clone(), submit_log(&other))
            .await
            .unwrap();

        let active = store
            .active_instance_for(&BusinessKey::new("ORDER", "42"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.id, first.id);
    }

    #[tokio::test]
    async fn update_is_version_checked() {
        let store = InMemoryWorkflowStore::new();
        let def = sample_definition("ORDER_DISCOUNT");
        store.insert_definition(def.clone()).await.unwrap();

        let instance = sample_instance(&def, "42");
        store
            .create_instance(instance.clone(), submit_log(&instance))
            .await
            .unwrap();

        let mut mutated = instance.clone();
        mutated.advance();
        let log = ApprovalLog::record(
            instance.id.clone(),
            1,
            "Director approval",
            UserId::new("bob"),
            ApprovalAction::Approve,
            Some(InstanceStatus::Pending),
            InstanceStatus::Pending,
        );

        let winner = store
            .update_instance(&mutated, 0, log.clone())
            .await
            .unwrap();
        assert_eq!(winner.version, 1);
        assert_eq!(winner.current_step, 2);

        // A second writer that loaded version 0 must lose definitively.
        let loser = store.update_instance(&mutated, 0, log).await;
        assert!(matches!(loser, Err(StorageError::VersionMismatch(_))));
    }

    #[tokio::test]
    async fn logs_keep_append_order() {
        let store = InMemoryWorkflowStore::new();
        let def = sample_definition("ORDER_DISCOUNT");
        store.insert_definition(def.clone()).await.unwrap();

        let instance = sample_instance(&def, "42");
        store
            .create_instance(instance.clone(), submit_log(&instance))
            .await
            .unwrap();

        let mut mutated = instance.clone();
        mutated.finish(InstanceStatus::Rejected);
        let reject = ApprovalLog::record(
            instance.id.clone(),
            1,
            "Director approval",
            UserId::new("bob"),
            ApprovalAction::Reject,
            Some(InstanceStatus::Pending),
            InstanceStatus::Rejected,
        );
        store.update_instance(&mutated, 0, reject).await.unwrap();

        let logs = store.logs_for_instance(&instance.id).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].action, ApprovalAction::Submit);
        assert_eq!(logs[1].action, ApprovalAction::Reject);
    }

    #[tokio::test]
    async fn todo_query_matches_roles_and_pages() {
        let store = InMemoryWorkflowStore::new();
        let def = sample_definition("ORDER_DISCOUNT");
        store.insert_definition(def.clone()).await.unwrap();

        for n in 0..3 {
            let instance = sample_instance(&def, &format!("{n}"));
            store
                .create_instance(instance.clone(), submit_log(&instance))
                .await
                .unwrap();
        }

        let steps = store
            .approval_steps_for_roles(&[RoleId::new("director")])
            .await
            .unwrap();
        assert_eq!(steps, vec![(def.id.clone(), 1)]);

        let page = store
            .pending_instances_at(&steps, QueryWindow { limit: 2, offset: 0 })
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);

        let rest = store
            .pending_instances_at(&steps, QueryWindow { limit: 2, offset: 2 })
            .await
            .unwrap();
        assert_eq!(rest.items.len(), 1);

        // No steps for an unknown role.
        let none = store
            .approval_steps_for_roles(&[RoleId::new("nobody")])
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
