use lumora_core::{AppError, PictureId, SpaceId, UserId};
use serde::{Deserialize, Serialize};

/// Kind of storage space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceType {
    /// Owned by one account.
    Private,
    /// Shared with members holding space roles.
    Team,
}

impl SpaceType {
    /// Returns a stable storage value for this space type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Team => "team",
        }
    }

    /// Parses a storage value into a space type.
    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "private" => Ok(Self::Private),
            "team" => Ok(Self::Team),
            _ => Err(AppError::Validation(format!("unknown space type '{value}'"))),
        }
    }
}

/// Space attributes needed by authorization decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaceSummary {
    /// Space identity.
    pub id: SpaceId,
    /// Owning account.
    pub owner_id: UserId,
    /// Kind of space.
    pub space_type: SpaceType,
}

/// Picture attributes needed by authorization decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureSummary {
    /// Picture identity.
    pub id: PictureId,
    /// Uploading account.
    pub owner_id: UserId,
    /// Space holding the picture; `None` for the public gallery.
    pub space_id: Option<SpaceId>,
}
