//! API credential rotation
//!
//! One pool owns the credential list. Workers hold cached client handles
//! stamped with the pool version; a handle is stale the instant its stamp
//! differs from the pool's current version and must be discarded before
//! the next use. Rotation is compare-and-advance: concurrent callers that
//! all observed the same exhausted credential rotate it exactly once.

use crate::platform::error::{ApiError, CallError, FailureClass};
use std::future::Future;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// No credentials remain in the pool
#[derive(Debug, Clone, Copy, Error)]
#[error("no API credentials remaining")]
pub struct PoolExhausted;

/// A client bound to one credential, stamped with the pool version
#[derive(Debug)]
pub struct ClientHandle<A> {
    pub api: Arc<A>,
    /// Index of the credential this client is bound to
    pub ordinal: usize,
    /// Pool version at construction time
    pub version: u64,
}

impl<A> Clone for ClientHandle<A> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            ordinal: self.ordinal,
            version: self.version,
        }
    }
}

struct PoolState<A> {
    /// Monotonically non-decreasing within a pool lifetime
    active: usize,
    /// Strictly increases on every rotation
    version: u64,
    /// Shared handle for the active credential, built lazily
    handle: Option<ClientHandle<A>>,
}

/// Thread-safe rotation over a list of API credentials
pub struct CredentialPool<A> {
    keys: Vec<String>,
    build: Box<dyn Fn(&str) -> A + Send + Sync>,
    state: Mutex<PoolState<A>>,
}

impl<A: Send + Sync + 'static> CredentialPool<A> {
    /// Creates a pool over `keys`, building clients with `build`
    pub fn new<F>(keys: Vec<String>, build: F) -> Self
    where
        F: Fn(&str) -> A + Send + Sync + 'static,
    {
        Self {
            keys,
            build: Box::new(build),
            state: Mutex::new(PoolState {
                active: 0,
                version: 0,
                handle: None,
            }),
        }
    }

    /// Number of credentials this pool started with
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// True while `handle` is still bound to the active credential
    pub fn is_current(&self, handle: &ClientHandle<A>) -> bool {
        let state = self.state.lock().unwrap();
        handle.version == state.version
    }

    /// Returns a handle bound to the active credential
    ///
    /// The shared handle is built under the pool lock after re-checking
    /// the version, so concurrent callers that all noticed a stale handle
    /// construct the replacement once.
    pub fn current_client(&self) -> Result<ClientHandle<A>, PoolExhausted> {
        let mut state = self.state.lock().unwrap();
        if state.active >= self.keys.len() {
            return Err(PoolExhausted);
        }

        if let Some(handle) = &state.handle {
            if handle.version == state.version {
                return Ok(handle.clone());
            }
        }

        let key = &self.keys[state.active];
        let handle = ClientHandle {
            api: Arc::new((self.build)(key)),
            ordinal: state.active,
            version: state.version,
        };
        tracing::debug!(
            "Built client for credential #{} ({})",
            handle.ordinal + 1,
            redact_key(key)
        );
        state.handle = Some(handle.clone());
        Ok(handle)
    }

    /// Revalidates a caller's cached handle, refreshing it when stale
    pub fn checkout(
        &self,
        cached: &mut Option<ClientHandle<A>>,
    ) -> Result<ClientHandle<A>, PoolExhausted> {
        if let Some(handle) = cached {
            if self.is_current(handle) {
                return Ok(handle.clone());
            }
        }
        let fresh = self.current_client()?;
        *cached = Some(fresh.clone());
        Ok(fresh)
    }

    /// Advances to the next credential if no other caller already has
    ///
    /// Only advances when `observed_index` still equals the active index;
    /// returns `true` as well when another caller already advanced past
    /// the observation. Returns `false` only when no credentials remain.
    pub fn try_advance(&self, observed_index: usize) -> bool {
        let mut state = self.state.lock().unwrap();

        if state.active > observed_index {
            return true;
        }

        if state.active == observed_index {
            state.active += 1;
            if state.active >= self.keys.len() {
                return false;
            }
            state.version += 1;
            state.handle = None;
            tracing::info!(
                "Rotated to credential #{} ({})",
                state.active + 1,
                redact_key(&self.keys[state.active])
            );
            return true;
        }

        false
    }
}

/// Key material never appears whole in logs
fn redact_key(key: &str) -> String {
    if key.len() > 15 {
        format!("{}...{}", &key[..10], &key[key.len() - 5..])
    } else {
        key.to_string()
    }
}

/// Runs one API operation with rotation on credential exhaustion
///
/// The operation is retried with the next credential whenever the failure
/// classifies as credential exhaustion, bounded by the pool size.
/// Permanently-invalid records surface as `CallError::Skipped`, pool
/// exhaustion as `CallError::QuotaExhausted`, and anything else as
/// `CallError::Failed` for the caller's own retry budget.
pub async fn call_with_rotation<A, T, F, Fut>(
    pool: &CredentialPool<A>,
    cached: &mut Option<ClientHandle<A>>,
    op: F,
) -> Result<T, CallError>
where
    A: Send + Sync + 'static,
    F: Fn(Arc<A>) -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let max_attempts = pool.len().max(1);
    let mut attempt = 0;

    loop {
        let handle = pool.checkout(cached).map_err(|_| CallError::QuotaExhausted)?;

        match op(Arc::clone(&handle.api)).await {
            Ok(value) => return Ok(value),
            Err(err) => match err.classify() {
                FailureClass::NotFound | FailureClass::PermanentlyDisabled => {
                    return Err(CallError::Skipped {
                        class: err.classify(),
                        message: err.to_string(),
                    });
                }
                FailureClass::CredentialExhausted => {
                    tracing::warn!(
                        "Credential #{} exhausted: {}",
                        handle.ordinal + 1,
                        err
                    );
                    cached.take();
                    if !pool.try_advance(handle.ordinal) {
                        return Err(CallError::QuotaExhausted);
                    }
                    attempt += 1;
                    if attempt >= max_attempts {
                        return Err(CallError::QuotaExhausted);
                    }
                }
                FailureClass::Unrelated => return Err(CallError::Failed(err)),
            },
        }
    }
}
