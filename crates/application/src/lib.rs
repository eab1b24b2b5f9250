//! Application services and ports.

#![forbid(unsafe_code)]

mod authorization_service;
mod outpainting_ports;
mod outpainting_service;
mod outpainting_worker;
mod picture_edit_ports;
mod picture_edit_service;
mod role_assignment_writer;
mod space_membership_service;

#[cfg(test)]
mod test_support;

pub use authorization_service::{
    AuthorizationService, DEFAULT_ROLE_POLICY, RoleAssignmentRepository,
};
pub use outpainting_ports::{
    DeadLetter, DeadLetterReason, InferenceClient, InferenceError, InferenceErrorKind, JobQueue,
    OutpaintingJobRepository, OutpaintingPrompt, QueueDelivery, classify_error_text,
};
pub use outpainting_service::{ENQUEUE_FAILED_MESSAGE, OutpaintingService, SubmitOutpaintingJob};
pub use outpainting_worker::{
    JobOutcome, MaintenanceReport, OutpaintingWorker, OutpaintingWorkerConfig,
};
pub use picture_edit_ports::{EditConnection, PictureCatalog};
pub use picture_edit_service::{EditSessionTicket, PictureEditSessionManager};
pub use role_assignment_writer::{RoleAssignmentWriter, RoleWriterConfig};
pub use space_membership_service::SpaceMembershipService;
