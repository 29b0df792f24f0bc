//! Silent access-token retrieval with single-flight refresh.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};

use crate::auth::AuthError;

use super::SessionCore;

type SharedRefresh = Shared<BoxFuture<'static, Result<String, AuthError>>>;

struct InFlight {
    id: u64,
    future: SharedRefresh,
    /// Set once any [`RefreshOrigin::Caller`] waits on this flight.
    caller_waiting: Arc<AtomicBool>,
}

/// Where a refresh was requested from. Decides how a failure is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefreshOrigin {
    /// A caller asked for a token; failures are recorded on the state.
    Caller,
    /// Bootstrap on start; failure quietly means "signed out" unless a
    /// caller has joined the flight meanwhile.
    Startup,
}

/// Hands out access tokens, refreshing through at most one exchange at a time.
///
/// The fast path only reads the state machine. The slow path attaches to the
/// in-flight refresh if there is one, otherwise starts it; the slot lock is
/// held only long enough to make that choice.
pub struct RefreshCoordinator {
    core: Arc<SessionCore>,
    in_flight: Arc<Mutex<Option<InFlight>>>,
    next_id: AtomicU64,
}

impl RefreshCoordinator {
    pub(crate) fn new(core: Arc<SessionCore>) -> Self {
        Self {
            core,
            in_flight: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
        }
    }

    /// A usable access token, refreshing it first if it is missing or within
    /// the skew buffer of expiry.
    ///
    /// # Errors
    ///
    /// [`AuthError::MissingRefreshToken`] when nothing is persisted, or the
    /// exchange error. Either way the session has ended.
    pub async fn get_access_token_silently(&self) -> Result<String, AuthError> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }
        self.refresh(RefreshOrigin::Caller).await
    }

    pub(crate) async fn refresh(&self, origin: RefreshOrigin) -> Result<String, AuthError> {
        let future = {
            let mut slot = lock(&self.in_flight);
            match slot.as_ref() {
                Some(flight) => {
                    tracing::debug!(flight = flight.id, ?origin, "joining in-flight refresh");
                    if origin == RefreshOrigin::Caller {
                        flight.caller_waiting.store(true, Ordering::SeqCst);
                    }
                    flight.future.clone()
                }
                None => {
                    // A refresh may have finished between the fast-path check
                    // and taking the slot.
                    if origin == RefreshOrigin::Caller {
                        if let Some(token) = self.cached_token() {
                            return Ok(token);
                        }
                    }
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(flight = id, ?origin, "starting refresh");
                    let caller_waiting = Arc::new(AtomicBool::new(origin == RefreshOrigin::Caller));
                    let future = run_flight(
                        self.core.clone(),
                        self.in_flight.clone(),
                        id,
                        caller_waiting.clone(),
                    )
                    .boxed()
                    .shared();
                    *slot = Some(InFlight {
                        id,
                        future: future.clone(),
                        caller_waiting,
                    });
                    future
                }
            }
        };
        future.await
    }

    fn cached_token(&self) -> Option<String> {
        self.core
            .state
            .fresh_access_token(Utc::now(), self.core.config.skew())
    }
}

async fn run_flight(
    core: Arc<SessionCore>,
    in_flight: Arc<Mutex<Option<InFlight>>>,
    id: u64,
    caller_waiting: Arc<AtomicBool>,
) -> Result<String, AuthError> {
    let generation = core.state.generation();
    let result = exchange_refresh_token(&core, generation).await;

    match &result {
        Ok(_) => tracing::debug!(flight = id, "refresh succeeded"),
        Err(err) if err.ends_session() => {
            tracing::debug!(flight = id, error = %err, "refresh failed");
            if caller_waiting.load(Ordering::SeqCst) {
                core.state.apply_failure(generation, err);
            } else {
                core.state.settle_unauthenticated(generation);
            }
        }
        Err(_) => {}
    }

    let mut slot = lock(&in_flight);
    if slot.as_ref().is_some_and(|flight| flight.id == id) {
        *slot = None;
    }
    result
}

async fn exchange_refresh_token(core: &SessionCore, generation: u64) -> Result<String, AuthError> {
    let refresh_token = core
        .slot
        .load()
        .await
        .ok_or(AuthError::MissingRefreshToken)?;
    let tokens = core
        .client
        .refresh(&refresh_token, core.config.scopes())
        .await?;
    core.commit(generation, tokens).await
}

fn lock(slot: &Mutex<Option<InFlight>>) -> MutexGuard<'_, Option<InFlight>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
