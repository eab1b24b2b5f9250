mod inference;
mod queue;
mod repository;

pub use inference::{
    InferenceClient, InferenceError, InferenceErrorKind, OutpaintingPrompt, classify_error_text,
};
pub use queue::{DeadLetter, DeadLetterReason, JobQueue, QueueDelivery};
pub use repository::OutpaintingJobRepository;
