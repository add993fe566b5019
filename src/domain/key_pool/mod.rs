//! Key pool domain - credentials partitioned by operation kind

mod entity;
mod pool;

pub use entity::{
    BackoffPolicy, Credential, CredentialLease, KeyPoolError, OperationKind, SlotKey,
};
pub use pool::KeyPool;

#[cfg(test)]
pub use pool::stub;
