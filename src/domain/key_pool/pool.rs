use std::fmt::Debug;
use std::time::Duration;

use super::entity::{CredentialLease, KeyPoolError, OperationKind, SlotKey};

/// Shared pool of provider credentials, partitioned by operation kind
pub trait KeyPool: Send + Sync + Debug {
    /// Leases the least recently used credential of (operation, provider)
    /// that is not backing off.
    fn acquire(
        &self,
        operation: OperationKind,
        provider: &str,
    ) -> Result<CredentialLease, KeyPoolError>;

    /// Leases one specific slot regardless of its backoff, e.g. to poll a
    /// job with the credential that submitted it.
    fn lease_slot(&self, key: &SlotKey) -> Option<CredentialLease>;

    /// Records a rate limit against the leased slot and returns how long
    /// that slot now backs off.
    fn report_rate_limited(&self, lease: &CredentialLease, retry_after: Option<Duration>)
        -> Duration;

    /// Clears the slot's consecutive rate-limit count.
    fn report_success(&self, lease: &CredentialLease);
}

#[cfg(test)]
pub mod stub {
    use super::*;
    use crate::domain::key_pool::Credential;

    /// Hands out one never-limited credential for any (operation, provider)
    #[derive(Debug, Default)]
    pub struct StaticKeyPool;

    impl KeyPool for StaticKeyPool {
        fn acquire(
            &self,
            operation: OperationKind,
            provider: &str,
        ) -> Result<CredentialLease, KeyPoolError> {
            Ok(CredentialLease::new(
                SlotKey::new(operation, provider, "static"),
                Credential::new("static", "secret"),
            ))
        }

        fn lease_slot(&self, key: &SlotKey) -> Option<CredentialLease> {
            Some(CredentialLease::new(
                key.clone(),
                Credential::new(key.credential_id(), "secret"),
            ))
        }

        fn report_rate_limited(
            &self,
            _lease: &CredentialLease,
            _retry_after: Option<Duration>,
        ) -> Duration {
            Duration::ZERO
        }

        fn report_success(&self, _lease: &CredentialLease) {}
    }
}
