use std::fmt::{Display, Formatter};
use std::str::FromStr;

use lumora_core::{AppError, SpaceId, UserId};
use serde::{Deserialize, Serialize};

const PUBLIC_DOMAIN: &str = "public";
const SPACE_DOMAIN_PREFIX: &str = "space_";
const USER_SUBJECT_PREFIX: &str = "user_";

/// Roles a subject can hold inside one role domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceRole {
    /// May view pictures.
    Viewer,
    /// May view and modify pictures.
    Editor,
    /// May modify pictures and manage space members.
    Admin,
}

impl SpaceRole {
    /// Returns a stable storage value for this role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Editor => "editor",
            Self::Admin => "admin",
        }
    }

    /// Returns all known roles.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[SpaceRole] = &[SpaceRole::Viewer, SpaceRole::Editor, SpaceRole::Admin];

        ALL
    }
}

impl FromStr for SpaceRole {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "viewer" => Ok(Self::Viewer),
            "editor" => Ok(Self::Editor),
            "admin" => Ok(Self::Admin),
            _ => Err(AppError::Validation(format!("unknown space role '{value}'"))),
        }
    }
}

/// Objects guarded by permission checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionObject {
    /// Pictures stored in a domain.
    #[serde(rename = "picture")]
    Picture,
    /// Membership records of a space.
    #[serde(rename = "spaceUser")]
    SpaceUser,
}

impl PermissionObject {
    /// Returns the stable policy value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Picture => "picture",
            Self::SpaceUser => "spaceUser",
        }
    }
}

impl FromStr for PermissionObject {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "picture" => Ok(Self::Picture),
            "spaceUser" => Ok(Self::SpaceUser),
            _ => Err(AppError::Validation(format!(
                "unknown permission object '{value}'"
            ))),
        }
    }
}

/// Actions performed against a permission object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionAction {
    /// Read access.
    View,
    /// Modify access.
    Edit,
    /// Delete access.
    Delete,
    /// Upload access.
    Upload,
    /// Administrative access.
    Manage,
}

impl PermissionAction {
    /// Returns the stable policy value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Edit => "edit",
            Self::Delete => "delete",
            Self::Upload => "upload",
            Self::Manage => "manage",
        }
    }
}

impl FromStr for PermissionAction {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "view" => Ok(Self::View),
            "edit" => Ok(Self::Edit),
            "delete" => Ok(Self::Delete),
            "upload" => Ok(Self::Upload),
            "manage" => Ok(Self::Manage),
            _ => Err(AppError::Validation(format!(
                "unknown permission action '{value}'"
            ))),
        }
    }
}

/// Permissions enforced by application policy checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Permission {
    /// Allows viewing pictures.
    #[serde(rename = "picture:view")]
    PictureView,
    /// Allows editing pictures.
    #[serde(rename = "picture:edit")]
    PictureEdit,
    /// Allows deleting pictures.
    #[serde(rename = "picture:delete")]
    PictureDelete,
    /// Allows uploading pictures.
    #[serde(rename = "picture:upload")]
    PictureUpload,
    /// Allows managing space members.
    #[serde(rename = "spaceUser:manage")]
    SpaceUserManage,
}

impl Permission {
    /// Returns a stable storage value for this permission.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PictureView => "picture:view",
            Self::PictureEdit => "picture:edit",
            Self::PictureDelete => "picture:delete",
            Self::PictureUpload => "picture:upload",
            Self::SpaceUserManage => "spaceUser:manage",
        }
    }

    /// Returns all known permissions.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[Permission] = &[
            Permission::PictureView,
            Permission::PictureEdit,
            Permission::PictureDelete,
            Permission::PictureUpload,
            Permission::SpaceUserManage,
        ];

        ALL
    }

    /// Returns the guarded object.
    #[must_use]
    pub fn object(&self) -> PermissionObject {
        match self {
            Self::SpaceUserManage => PermissionObject::SpaceUser,
            _ => PermissionObject::Picture,
        }
    }

    /// Returns the guarded action.
    #[must_use]
    pub fn action(&self) -> PermissionAction {
        match self {
            Self::PictureView => PermissionAction::View,
            Self::PictureEdit => PermissionAction::Edit,
            Self::PictureDelete => PermissionAction::Delete,
            Self::PictureUpload => PermissionAction::Upload,
            Self::SpaceUserManage => PermissionAction::Manage,
        }
    }

    /// Combines an object and an action; pairs outside the fixed enumeration are rejected.
    pub fn from_parts(object: PermissionObject, action: PermissionAction) -> Result<Self, AppError> {
        match (object, action) {
            (PermissionObject::Picture, PermissionAction::View) => Ok(Self::PictureView),
            (PermissionObject::Picture, PermissionAction::Edit) => Ok(Self::PictureEdit),
            (PermissionObject::Picture, PermissionAction::Delete) => Ok(Self::PictureDelete),
            (PermissionObject::Picture, PermissionAction::Upload) => Ok(Self::PictureUpload),
            (PermissionObject::SpaceUser, PermissionAction::Manage) => Ok(Self::SpaceUserManage),
            _ => Err(AppError::Validation(format!(
                "unsupported permission '{}:{}'",
                object.as_str(),
                action.as_str()
            ))),
        }
    }
}

impl FromStr for Permission {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let Some((object, action)) = value.split_once(':') else {
            return Err(AppError::Validation(format!(
                "unknown permission value '{value}'"
            )));
        };

        Self::from_parts(object.parse()?, action.parse()?)
    }
}

/// Namespace scoping role assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RoleDomain {
    /// Platform-wide domain.
    Public,
    /// Domain of one storage space.
    Space(SpaceId),
}

impl RoleDomain {
    /// Returns the space id for space domains.
    #[must_use]
    pub fn space_id(&self) -> Option<SpaceId> {
        match self {
            Self::Public => None,
            Self::Space(space_id) => Some(*space_id),
        }
    }

    /// Returns the domain a picture's permissions are evaluated in.
    #[must_use]
    pub fn for_space(space_id: Option<SpaceId>) -> Self {
        space_id.map_or(Self::Public, Self::Space)
    }
}

impl Display for RoleDomain {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Public => formatter.write_str(PUBLIC_DOMAIN),
            Self::Space(space_id) => write!(formatter, "{SPACE_DOMAIN_PREFIX}{space_id}"),
        }
    }
}

impl FromStr for RoleDomain {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value == PUBLIC_DOMAIN {
            return Ok(Self::Public);
        }

        value
            .strip_prefix(SPACE_DOMAIN_PREFIX)
            .ok_or_else(|| AppError::Validation(format!("unknown role domain '{value}'")))?
            .parse::<SpaceId>()
            .map(Self::Space)
    }
}

impl TryFrom<String> for RoleDomain {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RoleDomain> for String {
    fn from(value: RoleDomain) -> Self {
        value.to_string()
    }
}

/// Caller evaluated by the permission resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    /// Request without an authenticated session.
    Anonymous,
    /// Authenticated account.
    User(UserId),
}

impl Subject {
    /// Returns the graph key (`user_<id>`) for authenticated subjects.
    #[must_use]
    pub fn graph_key(&self) -> Option<String> {
        match self {
            Self::Anonymous => None,
            Self::User(user_id) => Some(format!("{USER_SUBJECT_PREFIX}{user_id}")),
        }
    }

    /// Parses a graph key back into a subject.
    pub fn from_graph_key(value: &str) -> Result<Self, AppError> {
        value
            .strip_prefix(USER_SUBJECT_PREFIX)
            .ok_or_else(|| AppError::Validation(format!("unknown subject '{value}'")))?
            .parse::<UserId>()
            .map(Self::User)
    }
}

impl From<Option<UserId>> for Subject {
    fn from(value: Option<UserId>) -> Self {
        value.map_or(Self::Anonymous, Self::User)
    }
}

/// One subject to role edge inside a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleAssignment {
    /// Assigned account.
    pub user_id: UserId,
    /// Domain the role applies in.
    pub domain: RoleDomain,
    /// Assigned role.
    pub role: SpaceRole,
}

impl RoleAssignment {
    /// Creates a role assignment.
    #[must_use]
    pub fn new(user_id: UserId, role: SpaceRole, domain: RoleDomain) -> Self {
        Self {
            user_id,
            domain,
            role,
        }
    }
}

/// Pending mutation of the role graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleChange {
    /// Replace whatever role the user holds in the domain with a new one.
    Assign(RoleAssignment),
    /// Remove the user's role in the domain.
    Revoke {
        /// Affected account.
        user_id: UserId,
        /// Affected domain.
        domain: RoleDomain,
    },
}

impl RoleChange {
    /// Returns the (user, domain) pair the change applies to.
    #[must_use]
    pub fn key(&self) -> (UserId, RoleDomain) {
        match self {
            Self::Assign(assignment) => (assignment.user_id, assignment.domain),
            Self::Revoke { user_id, domain } => (*user_id, *domain),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use lumora_core::{SpaceId, UserId};
    use proptest::prelude::*;

    use super::{Permission, PermissionAction, PermissionObject, RoleDomain, Subject};

    #[test]
    fn permission_parses_object_action_pairs() {
        let parsed = Permission::from_str("spaceUser:manage");
        assert_eq!(parsed.ok(), Some(Permission::SpaceUserManage));
        assert_eq!(Permission::PictureEdit.object(), PermissionObject::Picture);
        assert_eq!(Permission::PictureEdit.action(), PermissionAction::Edit);
    }

    #[test]
    fn unsupported_pairs_are_rejected() {
        assert!(Permission::from_str("spaceUser:view").is_err());
        assert!(Permission::from_str("picture:manage").is_err());
        assert!(Permission::from_str("picture").is_err());
    }

    #[test]
    fn role_domain_renders_storage_values() {
        let space = SpaceId::new(9).map(RoleDomain::Space);
        assert_eq!(space.ok().map(|domain| domain.to_string()), Some("space_9".to_owned()));
        assert_eq!(RoleDomain::Public.to_string(), "public");
        assert!(RoleDomain::from_str("space_").is_err());
        assert!(RoleDomain::from_str("global").is_err());
    }

    #[test]
    fn anonymous_subject_has_no_graph_key() {
        assert_eq!(Subject::Anonymous.graph_key(), None);
        let user = UserId::new(3).map(Subject::User);
        assert_eq!(
            user.ok().and_then(|subject| subject.graph_key()),
            Some("user_3".to_owned())
        );
    }

    proptest! {
        #[test]
        fn only_public_and_space_domains_parse(value in "\\PC{0,16}") {
            let parsed = RoleDomain::from_str(&value);
            if let Ok(domain) = parsed {
                prop_assert!(value == "public" || value.starts_with("space_"));
                prop_assert_eq!(domain.space_id().is_some(), value != "public");
            }
        }
    }
}
