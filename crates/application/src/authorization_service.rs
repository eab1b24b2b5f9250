use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use lumora_core::{AppError, AppResult, UserId, UserIdentity};
use lumora_domain::{
    Permission, PermissionAction, PermissionObject, RoleAssignment, RoleChange, RoleDomain,
    SpaceRole, Subject,
};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

mod role_graph;

pub(crate) use role_graph::StampedChange;
use role_graph::RoleGraph;

/// Role policy shipped with the service.
pub const DEFAULT_ROLE_POLICY: &str = include_str!("authorization_service/default_policy.conf");

/// Repository port for persisted subject to role edges.
#[async_trait]
pub trait RoleAssignmentRepository: Send + Sync {
    /// Lists every persisted role assignment.
    async fn list_assignments(&self) -> AppResult<Vec<RoleAssignment>>;

    /// Persists a batch of role changes in order.
    async fn save_changes(&self, changes: &[RoleChange]) -> AppResult<()>;
}

/// Permission resolver backed by an in-memory role graph.
///
/// Every check is denied until [`AuthorizationService::initialize`] succeeds.
#[derive(Clone)]
pub struct AuthorizationService {
    repository: Arc<dyn RoleAssignmentRepository>,
    policy: Arc<str>,
    graph: Arc<RwLock<Option<RoleGraph>>>,
    sequence: Arc<AtomicU64>,
    apply_lock: Arc<Mutex<()>>,
}

impl AuthorizationService {
    /// Creates an uninitialized resolver using the default role policy.
    #[must_use]
    pub fn new(repository: Arc<dyn RoleAssignmentRepository>) -> Self {
        Self {
            repository,
            policy: Arc::from(DEFAULT_ROLE_POLICY),
            graph: Arc::new(RwLock::new(None)),
            sequence: Arc::new(AtomicU64::new(0)),
            apply_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Replaces the role policy table used on initialization.
    #[must_use]
    pub fn with_policy(mut self, policy: impl Into<Arc<str>>) -> Self {
        self.policy = policy.into();
        self
    }

    /// Loads the policy and persisted assignments and starts answering checks.
    pub async fn initialize(&self) -> AppResult<()> {
        let mut graph = RoleGraph::from_policy(&self.policy)?;
        let assignments = self.repository.list_assignments().await?;
        graph.load_assignments(&assignments);
        graph.rebuild_role_links();

        let assignment_count = graph.assignment_count();
        *self.graph.write().await = Some(graph);
        info!(assignment_count, "role graph initialized");

        Ok(())
    }

    /// Returns whether the resolver has been initialized.
    pub async fn is_initialized(&self) -> bool {
        self.graph.read().await.is_some()
    }

    /// Returns whether the subject holds the permission in the domain.
    ///
    /// Anonymous subjects may only view pictures in the public domain.
    pub async fn check(&self, subject: Subject, domain: RoleDomain, permission: Permission) -> bool {
        let graph = self.graph.read().await;
        let Some(graph) = graph.as_ref() else {
            debug!(
                domain = %domain,
                permission = permission.as_str(),
                "permission denied: role graph not initialized"
            );
            return false;
        };

        match subject {
            Subject::Anonymous => {
                domain == RoleDomain::Public && permission == Permission::PictureView
            }
            Subject::User(user_id) => graph.allows(user_id, domain, permission),
        }
    }

    /// Object and action form of [`AuthorizationService::check`]; pairs outside
    /// the permission enumeration are denied.
    pub async fn check_parts(
        &self,
        subject: Subject,
        domain: RoleDomain,
        object: PermissionObject,
        action: PermissionAction,
    ) -> bool {
        match Permission::from_parts(object, action) {
            Ok(permission) => self.check(subject, domain, permission).await,
            Err(_) => false,
        }
    }

    /// Ensures the caller holds the permission in the domain.
    pub async fn require_permission(
        &self,
        user: Option<&UserIdentity>,
        domain: RoleDomain,
        permission: Permission,
    ) -> AppResult<()> {
        let subject = Subject::from(user.map(UserIdentity::user_id));
        if self.check(subject, domain, permission).await {
            return Ok(());
        }

        match subject.graph_key() {
            None => Err(AppError::Unauthorized("authentication required".to_owned())),
            Some(subject) => Err(AppError::Forbidden(format!(
                "subject '{subject}' is missing permission '{}' in domain '{domain}'",
                permission.as_str()
            ))),
        }
    }

    /// Lists the permissions the subject holds in the domain.
    pub async fn permissions_for(&self, subject: Subject, domain: RoleDomain) -> Vec<Permission> {
        let graph = self.graph.read().await;
        let Some(graph) = graph.as_ref() else {
            return Vec::new();
        };

        match subject {
            Subject::Anonymous if domain == RoleDomain::Public => vec![Permission::PictureView],
            Subject::Anonymous => Vec::new(),
            Subject::User(user_id) => graph.permissions(user_id, domain),
        }
    }

    /// Returns the role the user holds in the domain.
    pub async fn role_of(&self, user_id: UserId, domain: RoleDomain) -> Option<SpaceRole> {
        self.graph
            .read()
            .await
            .as_ref()
            .and_then(|graph| graph.role_of(user_id, domain))
    }

    /// Tags a change with the next submission sequence number.
    pub(crate) fn stamp(&self, change: RoleChange) -> StampedChange {
        StampedChange {
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed) + 1,
            change,
        }
    }

    /// Applies role changes in order, rebuilds inheritance links once and
    /// persists the batch.
    ///
    /// Changes stay applied in memory when persistence fails.
    pub async fn apply_changes(&self, changes: &[RoleChange]) -> AppResult<()> {
        let stamped: Vec<StampedChange> =
            changes.iter().map(|change| self.stamp(*change)).collect();
        self.apply_stamped(&stamped).await
    }

    /// Applies stamped changes, skipping any that an already applied newer
    /// submission for the same pair supersedes.
    ///
    /// Batches are applied and persisted one at a time, so the repository
    /// sees changes in the same order as the in-memory graph.
    pub(crate) async fn apply_stamped(&self, changes: &[StampedChange]) -> AppResult<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let _serialized = self.apply_lock.lock().await;
        let applied: Vec<RoleChange> = {
            let mut graph = self.graph.write().await;
            let Some(graph) = graph.as_mut() else {
                return Err(AppError::Internal(
                    "role graph is not initialized".to_owned(),
                ));
            };

            let mut applied = Vec::with_capacity(changes.len());
            for stamped in changes {
                if graph.apply(stamped) {
                    applied.push(stamped.change);
                }
            }
            graph.rebuild_role_links();
            applied
        };

        let superseded = changes.len() - applied.len();
        if superseded > 0 {
            debug!(superseded, "skipped role changes replaced by newer submissions");
        }
        if applied.is_empty() {
            return Ok(());
        }

        self.repository.save_changes(&applied).await
    }
}
