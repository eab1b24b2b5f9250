use lumora_core::{AppError, AppResult, SpaceId, UserId, UserIdentity};
use lumora_domain::{Permission, RoleDomain, SpaceRole, Subject};
use tracing::info;

use crate::{AuthorizationService, RoleAssignmentWriter};

/// Membership use-cases that translate into role graph changes.
///
/// Role changes are eventually consistent: they become visible once the
/// writer flushes its next batch.
#[derive(Clone)]
pub struct SpaceMembershipService {
    authorization_service: AuthorizationService,
    role_writer: RoleAssignmentWriter,
}

impl SpaceMembershipService {
    /// Creates the service.
    #[must_use]
    pub fn new(authorization_service: AuthorizationService, role_writer: RoleAssignmentWriter) -> Self {
        Self {
            authorization_service,
            role_writer,
        }
    }

    /// Grants a newly registered account the default public role.
    pub fn register_user(&self, user_id: UserId) {
        self.role_writer
            .assign(user_id, SpaceRole::Viewer, RoleDomain::Public);
        info!(user_id = %user_id, "default role queued for registered user");
    }

    /// Makes the creator of a space its administrator.
    pub fn grant_space_owner(&self, user_id: UserId, space_id: SpaceId) {
        self.role_writer
            .assign(user_id, SpaceRole::Admin, RoleDomain::Space(space_id));
        info!(user_id = %user_id, space_id = %space_id, "space owner role queued");
    }

    /// Adds a member to a space.
    pub async fn add_member(
        &self,
        actor: &UserIdentity,
        space_id: SpaceId,
        member_id: UserId,
        role: SpaceRole,
    ) -> AppResult<()> {
        let domain = self.require_manager(actor, space_id).await?;
        if let Some(existing) = self.authorization_service.role_of(member_id, domain).await {
            return Err(AppError::Conflict(format!(
                "user '{member_id}' is already a {} of space '{space_id}'",
                existing.as_str()
            )));
        }

        self.role_writer.assign(member_id, role, domain);
        info!(
            actor = %actor.user_id(),
            member_id = %member_id,
            space_id = %space_id,
            role = role.as_str(),
            "space member add queued"
        );
        Ok(())
    }

    /// Replaces a member's role in a space.
    pub async fn change_member_role(
        &self,
        actor: &UserIdentity,
        space_id: SpaceId,
        member_id: UserId,
        role: SpaceRole,
    ) -> AppResult<()> {
        let domain = self.require_manager(actor, space_id).await?;
        self.require_member(member_id, space_id, domain).await?;

        self.role_writer.assign(member_id, role, domain);
        info!(
            actor = %actor.user_id(),
            member_id = %member_id,
            space_id = %space_id,
            role = role.as_str(),
            "space member role change queued"
        );
        Ok(())
    }

    /// Removes a member from a space.
    pub async fn remove_member(
        &self,
        actor: &UserIdentity,
        space_id: SpaceId,
        member_id: UserId,
    ) -> AppResult<()> {
        let domain = self.require_manager(actor, space_id).await?;
        self.require_member(member_id, space_id, domain).await?;

        if member_id == actor.user_id() {
            return Err(AppError::Validation(
                "space managers cannot remove themselves".to_owned(),
            ));
        }

        self.role_writer.revoke(member_id, domain);
        info!(
            actor = %actor.user_id(),
            member_id = %member_id,
            space_id = %space_id,
            "space member removal queued"
        );
        Ok(())
    }

    /// Lists the caller's effective permissions in a space.
    pub async fn permissions_for(&self, actor: &UserIdentity, space_id: SpaceId) -> Vec<Permission> {
        self.authorization_service
            .permissions_for(Subject::User(actor.user_id()), RoleDomain::Space(space_id))
            .await
    }

    async fn require_manager(&self, actor: &UserIdentity, space_id: SpaceId) -> AppResult<RoleDomain> {
        let domain = RoleDomain::Space(space_id);
        self.authorization_service
            .require_permission(Some(actor), domain, Permission::SpaceUserManage)
            .await?;
        Ok(domain)
    }

    async fn require_member(
        &self,
        member_id: UserId,
        space_id: SpaceId,
        domain: RoleDomain,
    ) -> AppResult<SpaceRole> {
        self.authorization_service
            .role_of(member_id, domain)
            .await
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "user '{member_id}' is not a member of space '{space_id}'"
                ))
            })
    }
}
