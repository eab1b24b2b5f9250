use async_trait::async_trait;
use lumora_core::{AppResult, PictureId, SpaceId};
use lumora_domain::{PictureSummary, SpaceSummary};

/// Persistent bidirectional text connection of one edit participant.
#[async_trait]
pub trait EditConnection: Send + Sync {
    /// Writes one text frame.
    async fn send(&self, message: String) -> AppResult<()>;

    /// Reads the next text frame; `None` once the peer is gone.
    async fn receive(&self) -> Option<String>;

    /// Closes the connection. Closing twice is a no-op.
    async fn close(&self);
}

/// Read access to the pictures and spaces gating edit sessions.
#[async_trait]
pub trait PictureCatalog: Send + Sync {
    /// Finds a picture by id.
    async fn find_picture(&self, picture_id: PictureId) -> AppResult<Option<PictureSummary>>;

    /// Finds a space by id.
    async fn find_space(&self, space_id: SpaceId) -> AppResult<Option<SpaceSummary>>;
}
