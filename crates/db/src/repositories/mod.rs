//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument. All mutual exclusion between
//! concurrent workers is enforced by conditional updates in the store.

pub mod file_health_repo;
pub mod import_queue_repo;

pub use file_health_repo::FileHealthRepo;
pub use import_queue_repo::ImportQueueRepo;
