//! Observable session state and the transitions that drive it.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use strum::{Display, EnumString};
use tokio::sync::watch;

use crate::auth::{AuthError, IdentityTokenDecoder, TokenSet, UserClaims};

/// Lifecycle phase of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum SessionPhase {
    Loading,
    Authenticated,
    Unauthenticated,
    /// The session cannot proceed until it is reconfigured; retry goes back
    /// through `Loading`.
    Error,
}

/// Human-readable failure recorded on the state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub kind: &'static str,
    pub message: String,
}

impl From<&AuthError> for ErrorInfo {
    fn from(error: &AuthError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Point-in-time snapshot published to observers.
///
/// `user` is only ever present in [`SessionPhase::Authenticated`].
/// `is_authenticated` is also carried through `Loading` so a UI does not
/// flicker to a signed-out view while a new login is running.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub is_authenticated: bool,
    pub user: Option<UserClaims>,
    pub error: Option<ErrorInfo>,
}

impl SessionState {
    fn loading(is_authenticated: bool) -> Self {
        Self {
            phase: SessionPhase::Loading,
            is_authenticated,
            user: None,
            error: None,
        }
    }

    fn unauthenticated(error: Option<ErrorInfo>) -> Self {
        Self {
            phase: SessionPhase::Unauthenticated,
            is_authenticated: false,
            user: None,
            error,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.phase == SessionPhase::Loading
    }
}

struct AccessToken {
    token: String,
    expires_at: DateTime<Utc>,
}

struct Inner {
    generation: u64,
    access: Option<AccessToken>,
}

/// Owns the session phase and the in-memory access token.
///
/// Every transition takes the inner lock, mutates, and publishes the new
/// [`SessionState`] before releasing it, so observers only ever see complete
/// states. Operations that started under an older generation are rejected.
pub struct SessionStateMachine {
    inner: Mutex<Inner>,
    tx: watch::Sender<SessionState>,
    decoder: Arc<dyn IdentityTokenDecoder>,
}

impl SessionStateMachine {
    pub fn new(decoder: Arc<dyn IdentityTokenDecoder>) -> Self {
        let (tx, _rx) = watch::channel(SessionState::loading(false));
        Self {
            inner: Mutex::new(Inner {
                generation: 0,
                access: None,
            }),
            tx,
            decoder,
        }
    }

    pub fn current(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    /// Subscribe to state changes via a [`watch::Receiver`].
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// The in-memory access token, if it is still usable for at least `skew`.
    pub fn fresh_access_token(&self, now: DateTime<Utc>, skew: Duration) -> Option<String> {
        let inner = self.lock();
        inner
            .access
            .as_ref()
            .filter(|access| {
                access
                    .expires_at
                    .checked_sub_signed(skew)
                    .is_some_and(|deadline| now < deadline)
            })
            .map(|access| access.token.clone())
    }

    /// Start a new attempt (login or retry). Returns the attempt's generation.
    pub fn begin_loading(&self) -> u64 {
        let mut inner = self.lock();
        inner.generation += 1;
        let was_authenticated = self.tx.borrow().is_authenticated;
        self.tx.send_replace(SessionState::loading(was_authenticated));
        inner.generation
    }

    /// Move to `Authenticated` with `tokens`. Returns `false` if `generation`
    /// is stale, in which case nothing changes.
    pub fn apply_token_set(&self, generation: u64, tokens: &TokenSet) -> bool {
        self.authenticate(generation, tokens, false).is_some()
    }

    /// Like [`apply_token_set`](Self::apply_token_set), but also advances the
    /// generation so that work started before the login finished (a refresh
    /// running alongside it) can no longer land. Returns the new generation.
    pub fn complete_login(&self, generation: u64, tokens: &TokenSet) -> Option<u64> {
        self.authenticate(generation, tokens, true)
    }

    fn authenticate(&self, generation: u64, tokens: &TokenSet, advance: bool) -> Option<u64> {
        // Decode before taking the lock; the decoder is caller-supplied.
        let user = tokens
            .id_token
            .as_deref()
            .and_then(|id_token| match self.decoder.decode(id_token) {
                Ok(claims) => Some(claims),
                Err(err) => {
                    tracing::warn!(error = %err, "identity token could not be decoded; continuing without user claims");
                    None
                }
            });

        let mut inner = self.lock();
        if inner.generation != generation {
            tracing::debug!(
                generation,
                current = inner.generation,
                "discarding token set from a superseded session"
            );
            return None;
        }
        if advance {
            inner.generation += 1;
        }
        inner.access = Some(AccessToken {
            token: tokens.access_token.clone(),
            expires_at: tokens.expires_at,
        });
        self.tx.send_replace(SessionState {
            phase: SessionPhase::Authenticated,
            is_authenticated: true,
            user,
            error: None,
        });
        Some(inner.generation)
    }

    /// Record a failure and drop the access token.
    ///
    /// Configuration errors park the session in [`SessionPhase::Error`];
    /// everything else leaves it `Unauthenticated`.
    pub fn apply_failure(&self, generation: u64, error: &AuthError) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation {
            return false;
        }
        inner.access = None;
        let info = Some(ErrorInfo::from(error));
        let state = match error {
            AuthError::Configuration(_) => SessionState {
                phase: SessionPhase::Error,
                is_authenticated: false,
                user: None,
                error: info,
            },
            _ => SessionState::unauthenticated(info),
        };
        self.tx.send_replace(state);
        true
    }

    /// `Unauthenticated` without recording an error.
    pub fn settle_unauthenticated(&self, generation: u64) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation {
            return false;
        }
        inner.access = None;
        self.tx.send_replace(SessionState::unauthenticated(None));
        true
    }

    /// Clear everything and invalidate all in-flight work.
    pub fn reset(&self) -> u64 {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.access = None;
        self.tx.send_replace(SessionState::unauthenticated(None));
        inner.generation
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::JwtPayloadDecoder;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    fn machine() -> SessionStateMachine {
        SessionStateMachine::new(Arc::new(JwtPayloadDecoder))
    }

    fn tokens(id_token: Option<String>, lifetime: Duration) -> TokenSet {
        TokenSet {
            access_token: "access".to_string(),
            id_token,
            refresh_token: None,
            expires_at: Utc::now() + lifetime,
        }
    }

    fn id_token(sub: &str) -> String {
        format!(
            "e30.{}.sig",
            URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"{sub}","name":"Test"}}"#))
        )
    }

    #[test]
    fn starts_loading_with_no_token() {
        let sm = machine();
        let state = sm.current();
        assert_eq!(state.phase, SessionPhase::Loading);
        assert!(!state.is_authenticated);
        assert!(sm.fresh_access_token(Utc::now(), Duration::zero()).is_none());
    }

    #[test]
    fn token_set_with_identity_token_sets_user() {
        let sm = machine();
        let generation = sm.generation();
        assert!(sm.apply_token_set(generation, &tokens(Some(id_token("u-1")), Duration::hours(1))));

        let state = sm.current();
        assert_eq!(state.phase, SessionPhase::Authenticated);
        assert!(state.is_authenticated);
        assert_eq!(state.user.unwrap().sub, "u-1");
        assert_eq!(
            sm.fresh_access_token(Utc::now(), Duration::seconds(120)).as_deref(),
            Some("access")
        );
    }

    #[test]
    fn malformed_identity_token_still_authenticates() {
        let sm = machine();
        let generation = sm.generation();
        assert!(sm.apply_token_set(generation, &tokens(Some("garbage".to_string()), Duration::hours(1))));

        let state = sm.current();
        assert_eq!(state.phase, SessionPhase::Authenticated);
        assert!(state.user.is_none());
        assert!(state.error.is_none());
    }

    #[test]
    fn stale_generation_is_rejected() {
        let sm = machine();
        let stale = sm.generation();
        sm.reset();

        assert!(!sm.apply_token_set(stale, &tokens(None, Duration::hours(1))));
        assert!(!sm.apply_failure(stale, &AuthError::MissingRefreshToken));
        assert_eq!(sm.current(), SessionState::unauthenticated(None));
        assert!(sm.fresh_access_token(Utc::now(), Duration::zero()).is_none());
    }

    #[test]
    fn failure_records_error_and_drops_token() {
        let sm = machine();
        let generation = sm.generation();
        sm.apply_token_set(generation, &tokens(None, Duration::hours(1)));
        sm.apply_failure(
            generation,
            &AuthError::TokenExchangeFailure {
                status: Some(400),
                message: "invalid_grant".to_string(),
            },
        );

        let state = sm.current();
        assert_eq!(state.phase, SessionPhase::Unauthenticated);
        assert_eq!(state.error.unwrap().kind, "token_exchange_failure");
        assert!(sm.fresh_access_token(Utc::now(), Duration::zero()).is_none());
    }

    #[test]
    fn configuration_failure_enters_error_phase_and_retry_loads() {
        let sm = machine();
        let generation = sm.generation();
        sm.apply_failure(generation, &AuthError::Configuration("bad issuer".to_string()));
        assert_eq!(sm.current().phase, SessionPhase::Error);

        sm.begin_loading();
        assert_eq!(sm.current().phase, SessionPhase::Loading);
    }

    #[test]
    fn begin_loading_preserves_authenticated_flag_but_not_user() {
        let sm = machine();
        let generation = sm.generation();
        sm.apply_token_set(generation, &tokens(Some(id_token("u-2")), Duration::hours(1)));

        let next = sm.begin_loading();
        assert_eq!(next, generation + 1);
        let state = sm.current();
        assert_eq!(state.phase, SessionPhase::Loading);
        assert!(state.is_authenticated);
        assert!(state.user.is_none());
    }

    #[test]
    fn completed_login_supersedes_work_from_its_generation() {
        let sm = machine();
        let generation = sm.begin_loading();

        let after = sm
            .complete_login(generation, &tokens(Some(id_token("u-3")), Duration::hours(1)))
            .expect("current generation");
        assert_eq!(after, generation + 1);
        assert_eq!(sm.generation(), after);

        // A refresh that captured `generation` before the login finished.
        assert!(!sm.apply_failure(generation, &AuthError::MissingRefreshToken));
        assert!(!sm.apply_token_set(generation, &tokens(None, Duration::hours(1))));
        let state = sm.current();
        assert_eq!(state.phase, SessionPhase::Authenticated);
        assert_eq!(state.user.unwrap().sub, "u-3");
    }

    #[test]
    fn completing_a_stale_login_changes_nothing() {
        let sm = machine();
        let generation = sm.begin_loading();
        sm.reset();
        assert_eq!(sm.complete_login(generation, &tokens(None, Duration::hours(1))), None);
        assert_eq!(sm.current().phase, SessionPhase::Unauthenticated);
    }

    #[test]
    fn expiry_at_calendar_edge_is_not_fresh() {
        let sm = machine();
        let generation = sm.generation();
        let mut edge = tokens(None, Duration::zero());
        edge.expires_at = DateTime::<Utc>::MIN_UTC;
        sm.apply_token_set(generation, &edge);
        assert!(sm
            .fresh_access_token(Utc::now(), Duration::seconds(120))
            .is_none());
        assert!(!sm.current().is_loading());
    }

    #[test]
    fn near_expiry_token_is_not_fresh() {
        let sm = machine();
        let generation = sm.generation();
        sm.apply_token_set(generation, &tokens(None, Duration::seconds(60)));
        assert!(sm
            .fresh_access_token(Utc::now(), Duration::seconds(120))
            .is_none());
    }

    #[tokio::test]
    async fn observers_are_notified() {
        let sm = machine();
        let mut rx = sm.subscribe();
        let generation = sm.generation();
        sm.apply_token_set(generation, &tokens(None, Duration::hours(1)));

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().phase, SessionPhase::Authenticated);
        assert_eq!("authenticated".parse::<SessionPhase>().unwrap(), SessionPhase::Authenticated);
    }
}
