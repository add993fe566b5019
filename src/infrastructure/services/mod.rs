//! Infrastructure services

mod collection_service;

pub use collection_service::{
    CollectionService, CollectionServiceTrait, ResultView, ResumeReport,
};

#[cfg(test)]
pub use collection_service::MockCollectionServiceTrait;
