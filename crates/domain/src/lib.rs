//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod outpainting;
mod picture_edit;
mod security;
mod space;

pub use outpainting::{
    ANALYSIS_LABEL, JobTransition, NewOutpaintingJob, OutpaintingJob, OutpaintingJobStatus,
    OutpaintingJobView, OutpaintingResult, RESULT_URL_LABEL, parse_outpainting_output,
};
pub use picture_edit::{EditAction, EditMessageType, EditParticipant, EditRequest, EditResponse};
pub use security::{
    Permission, PermissionAction, PermissionObject, RoleAssignment, RoleChange, RoleDomain,
    SpaceRole, Subject,
};
pub use space::{PictureSummary, SpaceSummary, SpaceType};
