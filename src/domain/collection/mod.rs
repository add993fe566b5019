//! Collection domain - requests, collected results and their storage

mod repository;
mod request;
mod result;

pub use repository::CollectorResultRepository;
pub use request::{BatchId, CollectionRequest, CorrelationId};
pub use result::{domain_of, Citation, CollectorResult};

#[cfg(test)]
pub use repository::MockCollectorResultRepository;
#[cfg(test)]
pub(crate) use request::fixtures;
