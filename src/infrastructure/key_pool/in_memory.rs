//! Slot-locked credential pool
//!
//! Every credential slot carries its own mutex; there is no pool-wide lock
//! on the acquire or report paths.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::key_pool::{
    BackoffPolicy, Credential, CredentialLease, KeyPool, KeyPoolError, OperationKind, SlotKey,
};
use crate::infrastructure::observability::record_key_backoff;

#[derive(Debug, Default, Clone)]
struct SlotState {
    last_used_at: Option<Instant>,
    consecutive_rate_limit_hits: u32,
    last_hit_at: Option<Instant>,
    backoff_until: Option<Instant>,
}

impl SlotState {
    fn backing_off(&self, now: Instant) -> Option<Duration> {
        self.backoff_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }
}

#[derive(Debug)]
struct CredentialSlot {
    key: SlotKey,
    credential: Credential,
    state: Mutex<SlotState>,
}

impl CredentialSlot {
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        // A panic while holding the guard cannot leave the counters torn.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Point-in-time view of one slot
#[derive(Debug, Clone, PartialEq)]
pub struct SlotSnapshot {
    pub credential_id: String,
    pub consecutive_rate_limit_hits: u32,
    pub last_used_at: Option<Instant>,
    pub backoff_until: Option<Instant>,
}

/// In-process [`KeyPool`]
#[derive(Debug, Default)]
pub struct InMemoryKeyPool {
    slots: HashMap<(OperationKind, String), Vec<Arc<CredentialSlot>>>,
    policies: HashMap<OperationKind, BackoffPolicy>,
    default_policy: BackoffPolicy,
}

impl InMemoryKeyPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_policy(mut self, policy: BackoffPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    pub fn with_policy(mut self, operation: OperationKind, policy: BackoffPolicy) -> Self {
        self.policies.insert(operation, policy);
        self
    }

    pub fn with_credential(
        mut self,
        operation: OperationKind,
        provider: impl Into<String>,
        credential: Credential,
    ) -> Self {
        self.add_credential(operation, provider, credential);
        self
    }

    pub fn add_credential(
        &mut self,
        operation: OperationKind,
        provider: impl Into<String>,
        credential: Credential,
    ) {
        let provider = provider.into();
        let key = SlotKey::new(operation, provider.clone(), credential.id());
        let slot = Arc::new(CredentialSlot {
            key,
            credential,
            state: Mutex::new(SlotState::default()),
        });

        self.slots.entry((operation, provider)).or_default().push(slot);
    }

    pub fn policy(&self, operation: OperationKind) -> &BackoffPolicy {
        self.policies.get(&operation).unwrap_or(&self.default_policy)
    }

    pub fn slot_count(&self) -> usize {
        self.slots.values().map(Vec::len).sum()
    }

    pub fn snapshot(&self, key: &SlotKey) -> Option<SlotSnapshot> {
        let slot = self.find(key)?;
        let state = slot.lock();

        Some(SlotSnapshot {
            credential_id: slot.key.credential_id().to_string(),
            consecutive_rate_limit_hits: state.consecutive_rate_limit_hits,
            last_used_at: state.last_used_at,
            backoff_until: state.backoff_until,
        })
    }

    fn find(&self, key: &SlotKey) -> Option<&Arc<CredentialSlot>> {
        self.slots
            .get(&(key.operation(), key.provider().to_string()))?
            .iter()
            .find(|slot| slot.key == *key)
    }
}

impl KeyPool for InMemoryKeyPool {
    fn acquire(
        &self,
        operation: OperationKind,
        provider: &str,
    ) -> Result<CredentialLease, KeyPoolError> {
        let slots = self
            .slots
            .get(&(operation, provider.to_string()))
            .filter(|slots| !slots.is_empty())
            .ok_or_else(|| KeyPoolError::NoCredentials {
                operation,
                provider: provider.to_string(),
            })?;

        let now = Instant::now();
        let mut candidates: Vec<(Option<Instant>, &Arc<CredentialSlot>)> = Vec::new();
        let mut shortest_wait: Option<Duration> = None;

        for slot in slots {
            let state = slot.lock();
            match state.backing_off(now) {
                Some(wait) => {
                    shortest_wait = Some(shortest_wait.map_or(wait, |w| w.min(wait)));
                }
                None => candidates.push((state.last_used_at, slot)),
            }
        }

        // Never-used slots sort first.
        candidates.sort_by_key(|(last_used, _)| *last_used);

        for (_, slot) in candidates {
            let mut state = slot.lock();
            if state.backing_off(now).is_some() {
                continue;
            }
            state.last_used_at = Some(now);

            debug!(slot = %slot.key, "Leased credential");
            return Ok(CredentialLease::new(slot.key.clone(), slot.credential.clone()));
        }

        Err(KeyPoolError::Backoff {
            operation,
            provider: provider.to_string(),
            retry_after: shortest_wait.unwrap_or_default(),
        })
    }

    fn lease_slot(&self, key: &SlotKey) -> Option<CredentialLease> {
        let slot = self.find(key)?;
        slot.lock().last_used_at = Some(Instant::now());

        Some(CredentialLease::new(slot.key.clone(), slot.credential.clone()))
    }

    fn report_rate_limited(
        &self,
        lease: &CredentialLease,
        retry_after: Option<Duration>,
    ) -> Duration {
        let Some(slot) = self.find(lease.key()) else {
            warn!(slot = %lease.key(), "Rate limit reported for unknown slot");
            return Duration::ZERO;
        };

        let policy = self.policy(lease.key().operation());
        let now = Instant::now();
        let mut state = slot.lock();

        let window_expired = state
            .last_hit_at
            .is_some_and(|last| now.duration_since(last) > policy.hit_window());
        if window_expired {
            state.consecutive_rate_limit_hits = 0;
        }

        state.consecutive_rate_limit_hits += 1;
        state.last_hit_at = Some(now);

        let mut delay = policy.delay_for_hits(state.consecutive_rate_limit_hits);
        if let Some(hint) = retry_after {
            delay = delay.max(hint).min(Duration::from_millis(policy.max_backoff_ms));
        }

        let candidate = now + delay;
        let until = state.backoff_until.map_or(candidate, |prev| prev.max(candidate));
        state.backoff_until = Some(until);

        let remaining = until - now;
        warn!(
            slot = %slot.key,
            hits = state.consecutive_rate_limit_hits,
            backoff_ms = remaining.as_millis() as u64,
            "Credential rate limited, backing off"
        );
        record_key_backoff(lease.key().operation().as_str(), lease.key().provider());

        remaining
    }

    fn report_success(&self, lease: &CredentialLease) {
        if let Some(slot) = self.find(lease.key()) {
            slot.lock().consecutive_rate_limit_hits = 0;
        }
    }
}
