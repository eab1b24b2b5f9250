//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod channel_pool;
mod http_inference_client;
mod in_memory_job_queue;
mod in_memory_outpainting_job_repository;
mod job_queue_policy;
mod postgres_outpainting_job_repository;
mod postgres_picture_catalog;
mod postgres_role_assignment_repository;
mod redis_job_queue;

pub use channel_pool::{ChannelPool, PooledChannel};
pub use http_inference_client::{HttpInferenceClient, InferenceSettings};
pub use in_memory_job_queue::InMemoryJobQueue;
pub use in_memory_outpainting_job_repository::InMemoryOutpaintingJobRepository;
pub use job_queue_policy::JobQueuePolicy;
pub use postgres_outpainting_job_repository::PostgresOutpaintingJobRepository;
pub use postgres_picture_catalog::PostgresPictureCatalog;
pub use postgres_role_assignment_repository::PostgresRoleAssignmentRepository;
pub use redis_job_queue::RedisJobQueue;
