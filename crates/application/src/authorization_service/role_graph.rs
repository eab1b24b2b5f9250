use std::collections::{BTreeSet, HashMap, HashSet};

use lumora_core::{AppError, AppResult, UserId};
use lumora_domain::{Permission, RoleAssignment, RoleChange, RoleDomain, SpaceRole};

/// Role change tagged with its submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StampedChange {
    pub(crate) sequence: u64,
    pub(crate) change: RoleChange,
}

/// In-memory role graph: static role policy plus subject to role edges.
///
/// `links` is derived state. It maps every (user, domain) edge to the
/// permissions reachable through the assigned role and its inherited roles,
/// and is only refreshed by [`RoleGraph::rebuild_role_links`]. `sequences`
/// keeps the newest submission applied per pair, revocations included.
#[derive(Debug, Clone, Default)]
pub(crate) struct RoleGraph {
    role_permissions: HashMap<SpaceRole, BTreeSet<Permission>>,
    inherited_roles: HashMap<SpaceRole, Vec<SpaceRole>>,
    assignments: HashMap<(UserId, RoleDomain), SpaceRole>,
    links: HashMap<(UserId, RoleDomain), BTreeSet<Permission>>,
    sequences: HashMap<(UserId, RoleDomain), u64>,
}

impl RoleGraph {
    /// Parses a policy table made of `p, role, object, action` and
    /// `g, role, inherited_role` lines. Blank lines and `#` comments are skipped.
    pub(crate) fn from_policy(policy: &str) -> AppResult<Self> {
        let mut graph = Self::default();

        for (index, raw_line) in policy.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            match fields.as_slice() {
                ["p", role, object, action] => {
                    let permission =
                        Permission::from_parts(object.parse()?, action.parse()?)?;
                    graph
                        .role_permissions
                        .entry(role.parse()?)
                        .or_default()
                        .insert(permission);
                }
                ["g", role, inherited] => {
                    graph
                        .inherited_roles
                        .entry(role.parse()?)
                        .or_default()
                        .push(inherited.parse()?);
                }
                _ => {
                    return Err(AppError::Validation(format!(
                        "invalid policy line {}: '{line}'",
                        index + 1
                    )));
                }
            }
        }

        Ok(graph)
    }

    pub(crate) fn load_assignments(&mut self, assignments: &[RoleAssignment]) {
        for assignment in assignments {
            self.assignments
                .insert((assignment.user_id, assignment.domain), assignment.role);
        }
    }

    /// Applies one change unless a newer submission for the same
    /// (user, domain) pair was already applied. An assignment replaces the
    /// previous role, so a pair never holds two roles.
    pub(crate) fn apply(&mut self, stamped: &StampedChange) -> bool {
        let key = stamped.change.key();
        if self
            .sequences
            .get(&key)
            .is_some_and(|applied| *applied > stamped.sequence)
        {
            return false;
        }
        self.sequences.insert(key, stamped.sequence);

        match stamped.change {
            RoleChange::Assign(assignment) => {
                self.assignments.insert(key, assignment.role);
            }
            RoleChange::Revoke { .. } => {
                self.assignments.remove(&key);
            }
        }
        true
    }

    pub(crate) fn rebuild_role_links(&mut self) {
        let mut closures: HashMap<SpaceRole, BTreeSet<Permission>> = HashMap::new();
        for role in SpaceRole::all() {
            closures.insert(*role, self.reachable_permissions(*role));
        }

        self.links = self
            .assignments
            .iter()
            .map(|(key, role)| (*key, closures.get(role).cloned().unwrap_or_default()))
            .collect();
    }

    pub(crate) fn allows(
        &self,
        user_id: UserId,
        domain: RoleDomain,
        permission: Permission,
    ) -> bool {
        self.links
            .get(&(user_id, domain))
            .is_some_and(|permissions| permissions.contains(&permission))
    }

    pub(crate) fn permissions(&self, user_id: UserId, domain: RoleDomain) -> Vec<Permission> {
        self.links
            .get(&(user_id, domain))
            .map(|permissions| permissions.iter().copied().collect())
            .unwrap_or_default()
    }

    pub(crate) fn role_of(&self, user_id: UserId, domain: RoleDomain) -> Option<SpaceRole> {
        self.assignments.get(&(user_id, domain)).copied()
    }

    pub(crate) fn assignment_count(&self) -> usize {
        self.assignments.len()
    }

    fn reachable_permissions(&self, role: SpaceRole) -> BTreeSet<Permission> {
        let mut permissions = BTreeSet::new();
        let mut visited = HashSet::new();
        let mut stack = vec![role];

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }

            if let Some(direct) = self.role_permissions.get(&current) {
                permissions.extend(direct.iter().copied());
            }
            if let Some(parents) = self.inherited_roles.get(&current) {
                stack.extend(parents.iter().copied());
            }
        }

        permissions
    }
}
