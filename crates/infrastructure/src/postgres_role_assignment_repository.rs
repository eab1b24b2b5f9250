use async_trait::async_trait;
use sqlx::{FromRow, PgPool};

use lumora_application::RoleAssignmentRepository;
use lumora_core::{AppError, AppResult, UserId};
use lumora_domain::{RoleAssignment, RoleChange, RoleDomain, SpaceRole};

/// PostgreSQL-backed store of the role graph's user edges.
#[derive(Clone)]
pub struct PostgresRoleAssignmentRepository {
    pool: PgPool,
}

impl PostgresRoleAssignmentRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct RoleAssignmentRow {
    user_id: i64,
    domain: String,
    role: String,
}

#[async_trait]
impl RoleAssignmentRepository for PostgresRoleAssignmentRepository {
    async fn list_assignments(&self) -> AppResult<Vec<RoleAssignment>> {
        let rows = sqlx::query_as::<_, RoleAssignmentRow>(
            "SELECT user_id, domain, role FROM role_assignments ORDER BY user_id, domain",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list role assignments: {error}")))?;

        rows.into_iter()
            .map(|row| -> AppResult<RoleAssignment> {
                Ok(RoleAssignment::new(
                    UserId::new(row.user_id)?,
                    row.role.parse::<SpaceRole>()?,
                    row.domain.parse::<RoleDomain>()?,
                ))
            })
            .collect()
    }

    async fn save_changes(&self, changes: &[RoleChange]) -> AppResult<()> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to begin role assignment transaction: {error}"))
        })?;

        for change in changes {
            match change {
                RoleChange::Assign(assignment) => {
                    sqlx::query(
                        r#"
                        INSERT INTO role_assignments (user_id, domain, role)
                        VALUES ($1, $2, $3)
                        ON CONFLICT (user_id, domain)
                        DO UPDATE SET role = EXCLUDED.role, updated_at = NOW()
                        "#,
                    )
                    .bind(assignment.user_id.as_i64())
                    .bind(assignment.domain.to_string())
                    .bind(assignment.role.as_str())
                    .execute(&mut *transaction)
                    .await
                    .map_err(|error| {
                        AppError::Internal(format!("failed to save role assignment: {error}"))
                    })?;
                }
                RoleChange::Revoke { user_id, domain } => {
                    sqlx::query("DELETE FROM role_assignments WHERE user_id = $1 AND domain = $2")
                        .bind(user_id.as_i64())
                        .bind(domain.to_string())
                        .execute(&mut *transaction)
                        .await
                        .map_err(|error| {
                            AppError::Internal(format!("failed to revoke role assignment: {error}"))
                        })?;
                }
            }
        }

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit role assignment transaction: {error}"))
        })
    }
}
