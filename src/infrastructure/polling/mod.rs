//! Handed-off job persistence

mod storage_repository;

pub use storage_repository::StoragePendingJobRepository;
