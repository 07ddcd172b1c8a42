//! Authorization oracle: the engine's view of role membership
//!
//! Role storage lives outside the engine. The oracle answers two
//! questions only: "does this user hold that role" (the gate on every
//! state-changing action) and "which roles does this user hold" (feeds
//! the todo-list query). Implementers decide the storage shape.

use approval_types::{RoleId, UserId};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Boolean role-membership oracle consumed, never implemented, by the
/// state machine core.
#[async_trait]
pub trait AuthorizationOracle: Send + Sync {
    /// Whether `user` currently holds `role`.
    async fn has_role(&self, user: &UserId, role: &RoleId) -> bool;

    /// All roles `user` currently holds.
    async fn roles_for(&self, user: &UserId) -> Vec<RoleId>;
}

/// In-memory role table.
///
/// Suitable for tests and single-node deployments; production setups
/// back this trait with their RBAC store.
#[derive(Default)]
pub struct StaticRoleOracle {
    grants: RwLock<HashMap<UserId, HashSet<RoleId>>>,
}

impl StaticRoleOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `role` to `user`.
    pub fn grant(&self, user: UserId, role: RoleId) {
        if let Ok(mut grants) = self.grants.write() {
            grants.entry(user).or_default().insert(role);
        }
    }

    /// Revoke `role` from `user`.
    pub fn revoke(&self, user: &UserId, role: &RoleId) {
        if let Ok(mut grants) = self.grants.write() {
            if let Some(roles) = grants.get_mut(user) {
                roles.remove(role);
            }
        }
    }
}

#[async_trait]
impl AuthorizationOracle for StaticRoleOracle {
    async fn has_role(&self, user: &UserId, role: &RoleId) -> bool {
        self.grants
            .read()
            .map(|grants| {
                grants
                    .get(user)
                    .map(|roles| roles.contains(role))
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    async fn roles_for(&self, user: &UserId) -> Vec<RoleId> {
        let mut roles = self
            .grants
            .read()
            .map(|grants| {
                grants
                    .get(user)
                    .map(|roles| roles.iter().cloned().collect::<Vec<_>>())
                    .unwrap_or_default()
            })
            .unwrap_or_default();
        // Deterministic order for queries built from this list.
        roles.sort_by(|a, b| a.0.cmp(&b.0));
        roles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn grant_and_revoke() {
        let oracle = StaticRoleOracle::new();
        let dana = UserId::new("dana");
        let director = RoleId::new("regional-director");

        assert!(!oracle.has_role(&dana, &director).await);

        oracle.grant(dana.clone(), director.clone());
        assert!(oracle.has_role(&dana, &director).await);

        oracle.revoke(&dana, &director);
        assert!(!oracle.has_role(&dana, &director).await);
    }

    #[tokio::test]
    async fn roles_for_is_sorted() {
        let oracle = StaticRoleOracle::new();
        let dana = UserId::new("dana");
        oracle.grant(dana.clone(), RoleId::new("finance"));
        oracle.grant(dana.clone(), RoleId::new("audit"));

        let roles = oracle.roles_for(&dana).await;
        assert_eq!(roles, vec![RoleId::new("audit"), RoleId::new("finance")]);

        assert!(oracle.roles_for(&UserId::new("nobody")).await.is_empty());
    }
}
