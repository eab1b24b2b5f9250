mod common;
mod outpainting;
mod spaces;

pub use common::{HealthDependencyStatus, HealthResponse, UserIdentityResponse};
pub use outpainting::{
    CreateOutpaintingJobRequest, CreateOutpaintingJobResponse, OutpaintingJobResponse,
};
pub use spaces::{AddSpaceMemberRequest, SpacePermissionsResponse, UpdateSpaceMemberRequest};

#[cfg(test)]
mod tests {
    use super::{
        AddSpaceMemberRequest, CreateOutpaintingJobRequest, CreateOutpaintingJobResponse,
        HealthDependencyStatus, HealthResponse, OutpaintingJobResponse, SpacePermissionsResponse,
        UpdateSpaceMemberRequest, UserIdentityResponse,
    };

    use crate::error::ErrorResponse;
    use ts_rs::Config;
    use ts_rs::TS;

    #[test]
    fn export_ts_bindings() -> Result<(), ts_rs::ExportError> {
        let config = Config::default();

        CreateOutpaintingJobRequest::export(&config)?;
        CreateOutpaintingJobResponse::export(&config)?;
        OutpaintingJobResponse::export(&config)?;
        AddSpaceMemberRequest::export(&config)?;
        UpdateSpaceMemberRequest::export(&config)?;
        SpacePermissionsResponse::export(&config)?;
        HealthDependencyStatus::export(&config)?;
        HealthResponse::export(&config)?;
        UserIdentityResponse::export(&config)?;
        ErrorResponse::export(&config)?;

        Ok(())
    }
}
