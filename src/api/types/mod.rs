//! Wire types for the HTTP API

pub mod collection;
pub mod error;
pub mod json;

pub use collection::{BatchAccepted, BatchProgressResponse, SubmitCollectionRequest};
pub use error::{ApiError, ApiErrorResponse};
pub use json::{Json, ValidJson};
