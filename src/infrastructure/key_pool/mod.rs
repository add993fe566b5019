//! Key pool infrastructure

mod in_memory;
mod loader;

pub use in_memory::{InMemoryKeyPool, SlotSnapshot};
pub use loader::{CredentialConfig, KeyPoolConfig};
