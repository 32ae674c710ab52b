use std::future::Future;
use std::time::Duration;

use common::IdempotencyKey;
use tokio::time::Instant;

use crate::{IdempotencyError, IdempotencyRecord, IdempotencyStore, StoredResponse};

/// Timing for [`IdempotencyGuard`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardConfig {
    /// How long a completed response is replayed.
    pub ttl: Duration,

    /// How long a claim survives if its owner never finishes.
    pub in_flight_ttl: Duration,

    pub poll_interval: Duration,

    /// How long a caller waits on someone else's claim before giving up.
    pub wait_timeout: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            in_flight_ttl: Duration::from_secs(30),
            poll_interval: Duration::from_millis(50),
            wait_timeout: Duration::from_secs(5),
        }
    }
}

/// Result of a guarded call.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardOutcome {
    /// The operation ran in this call.
    Executed(StoredResponse),

    /// The operation had already completed; its stored response is returned.
    Replayed(StoredResponse),
}

impl GuardOutcome {
    pub fn response(&self) -> &StoredResponse {
        match self {
            GuardOutcome::Executed(r) | GuardOutcome::Replayed(r) => r,
        }
    }

    pub fn into_response(self) -> StoredResponse {
        match self {
            GuardOutcome::Executed(r) | GuardOutcome::Replayed(r) => r,
        }
    }

    pub fn is_replayed(&self) -> bool {
        matches!(self, GuardOutcome::Replayed(_))
    }
}

enum Claim<S: IdempotencyStore + Clone + 'static> {
    Won(ClaimGuard<S>),
    Replayed(StoredResponse),
}

/// Removes an unfinished claim when dropped.
///
/// Covers the owning task being cancelled between claiming and completing.
struct ClaimGuard<S: IdempotencyStore + Clone + 'static> {
    store: S,
    key: IdempotencyKey,
    armed: bool,
}

impl<S: IdempotencyStore + Clone + 'static> ClaimGuard<S> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<S: IdempotencyStore + Clone + 'static> Drop for ClaimGuard<S> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(key = %self.key, "abandoned idempotency claim left to expire");
            return;
        };

        let store = self.store.clone();
        let key = self.key;
        handle.spawn(async move {
            if let Err(e) = store.remove(key).await {
                tracing::warn!(%key, error = %e, "failed to release abandoned idempotency claim");
            }
        });
    }
}

/// Runs an operation at most once per idempotency key.
///
/// Successful responses are stored and replayed for `ttl`. Failures release
/// the key so the caller can retry. If a successful response cannot be
/// stored, the response is still returned and the key stays claimed until
/// `in_flight_ttl` lapses.
#[derive(Clone)]
pub struct IdempotencyGuard<S> {
    store: S,
    config: GuardConfig,
}

impl<S: IdempotencyStore + Clone + 'static> IdempotencyGuard<S> {
    pub fn new(store: S, config: GuardConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Runs `operation` under `key`, or replays its earlier response.
    #[tracing::instrument(skip(self, operation))]
    pub async fn execute<F, Fut, E>(
        &self,
        key: Option<IdempotencyKey>,
        operation: F,
    ) -> Result<GuardOutcome, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<StoredResponse, E>>,
        E: From<IdempotencyError>,
    {
        let key = key.ok_or(IdempotencyError::KeyMissing)?;

        let mut claim = match self.claim(key).await? {
            Claim::Replayed(response) => {
                metrics::counter!("idempotency_replays_total").increment(1);
                tracing::info!(%key, status = response.status, "replaying stored response");
                return Ok(GuardOutcome::Replayed(response));
            }
            Claim::Won(claim) => claim,
        };

        match operation().await {
            Ok(response) => {
                claim.disarm();
                metrics::counter!("idempotency_executions_total").increment(1);
                if let Err(e) = self.record_completed(key, &response).await {
                    // The in-flight claim stays until `in_flight_ttl`; a retry
                    // after that runs the operation again.
                    metrics::counter!("idempotency_record_failures_total").increment(1);
                    tracing::error!(
                        %key,
                        error = %e,
                        "operation succeeded but its response was not stored"
                    );
                }
                Ok(GuardOutcome::Executed(response))
            }
            Err(err) => {
                claim.disarm();
                if let Err(e) = self.store.remove(key).await {
                    tracing::warn!(%key, error = %e, "failed to release idempotency claim");
                }
                Err(err)
            }
        }
    }

    /// Stores the completed response, retrying the write once.
    async fn record_completed(
        &self,
        key: IdempotencyKey,
        response: &StoredResponse,
    ) -> Result<(), IdempotencyError> {
        let record = IdempotencyRecord::completed(response.clone());
        match self.store.put(key, record.clone(), self.config.ttl).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(%key, error = %e, "retrying store of completed response");
                self.store.put(key, record, self.config.ttl).await
            }
        }
    }

    async fn claim(&self, key: IdempotencyKey) -> Result<Claim<S>, IdempotencyError> {
        let deadline = Instant::now() + self.config.wait_timeout;

        loop {
            match self.store.get_if_present(key).await? {
                Some(record) => {
                    if let Some(response) = record.into_response() {
                        return Ok(Claim::Replayed(response));
                    }
                }
                None => {
                    let won = self
                        .store
                        .put_if_absent(key, IdempotencyRecord::in_flight(), self.config.in_flight_ttl)
                        .await?;
                    if won {
                        return Ok(Claim::Won(ClaimGuard {
                            store: self.store.clone(),
                            key,
                            armed: true,
                        }));
                    }
                }
            }

            if Instant::now() >= deadline {
                tracing::warn!(%key, "gave up waiting on in-flight request");
                return Err(IdempotencyError::InProgress(key));
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}
