use async_trait::async_trait;
use sqlx::{FromRow, PgPool};

use lumora_application::PictureCatalog;
use lumora_core::{AppError, AppResult, PictureId, SpaceId, UserId};
use lumora_domain::{PictureSummary, SpaceSummary, SpaceType};

/// PostgreSQL-backed lookup of pictures and spaces.
#[derive(Clone)]
pub struct PostgresPictureCatalog {
    pool: PgPool,
}

impl PostgresPictureCatalog {
    /// Creates a catalog with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct PictureRow {
    id: i64,
    owner_id: i64,
    space_id: Option<i64>,
}

#[derive(Debug, FromRow)]
struct SpaceRow {
    id: i64,
    owner_id: i64,
    space_type: String,
}

#[async_trait]
impl PictureCatalog for PostgresPictureCatalog {
    async fn find_picture(&self, picture_id: PictureId) -> AppResult<Option<PictureSummary>> {
        let row = sqlx::query_as::<_, PictureRow>(
            "SELECT id, owner_id, space_id FROM pictures WHERE id = $1",
        )
        .bind(picture_id.as_i64())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to load picture '{picture_id}': {error}"))
        })?;

        row.map(|row| -> AppResult<PictureSummary> {
            Ok(PictureSummary {
                id: PictureId::new(row.id)?,
                owner_id: UserId::new(row.owner_id)?,
                space_id: row.space_id.map(SpaceId::new).transpose()?,
            })
        })
        .transpose()
    }

    async fn find_space(&self, space_id: SpaceId) -> AppResult<Option<SpaceSummary>> {
        let row = sqlx::query_as::<_, SpaceRow>(
            "SELECT id, owner_id, space_type FROM spaces WHERE id = $1",
        )
        .bind(space_id.as_i64())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load space '{space_id}': {error}")))?;

        row.map(|row| -> AppResult<SpaceSummary> {
            Ok(SpaceSummary {
                id: SpaceId::new(row.id)?,
                owner_id: UserId::new(row.owner_id)?,
                space_type: SpaceType::parse(row.space_type.as_str())?,
            })
        })
        .transpose()
    }
}
