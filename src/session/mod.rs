//! The session: one owned object composing state, login, refresh and logout.
//!
//! - [`Session::start`]: bootstrap from the persisted refresh token
//! - [`Session::login`]: authorization code + PKCE through the browser
//! - [`Session::get_access_token_silently`]: cached or refreshed access token
//! - [`Session::logout`]: local reset, remote logout, slot cleared
//! - [`Session::subscribe`]: observe [`SessionState`] changes

pub mod login;
pub mod logout;
pub mod refresh;
pub mod slot;
pub mod state;

pub use login::{AuthorizationRequest, LoginCoordinator};
pub use logout::LogoutCoordinator;
pub use refresh::RefreshCoordinator;
pub use slot::RefreshTokenSlot;
pub use state::{ErrorInfo, SessionPhase, SessionState, SessionStateMachine};

use std::sync::Arc;

use tokio::sync::watch;

use crate::auth::{
    AuthError, BrowserLauncher, FileTokenStore, IdentityTokenDecoder, JwtPayloadDecoder,
    LoginOptions, SecureTokenStore, TokenEndpointClient, TokenSet,
};
use crate::config::SessionConfig;

use refresh::RefreshOrigin;

/// Shared collaborators of the coordinators.
pub(crate) struct SessionCore {
    pub(crate) config: SessionConfig,
    pub(crate) state: SessionStateMachine,
    pub(crate) slot: RefreshTokenSlot,
    pub(crate) client: TokenEndpointClient,
    pub(crate) browser: Arc<dyn BrowserLauncher>,
}

impl SessionCore {
    /// Apply `tokens` for `generation`, then persist the refresh token.
    ///
    /// Persistence runs after the transition is published and cannot fail it.
    pub(crate) async fn commit(&self, generation: u64, tokens: TokenSet) -> Result<String, AuthError> {
        if !self.state.apply_token_set(generation, &tokens) {
            return Err(AuthError::Superseded);
        }
        if let Some(refresh_token) = tokens.refresh_token.as_deref() {
            self.slot.persist(&self.state, generation, refresh_token).await;
        }
        Ok(tokens.access_token)
    }

    /// Apply the tokens a login obtained, advancing the generation so that a
    /// refresh running alongside the login is superseded.
    pub(crate) async fn commit_login(&self, generation: u64, tokens: TokenSet) -> Result<(), AuthError> {
        let Some(current) = self.state.complete_login(generation, &tokens) else {
            return Err(AuthError::Superseded);
        };
        if let Some(refresh_token) = tokens.refresh_token.as_deref() {
            self.slot.persist(&self.state, current, refresh_token).await;
        }
        Ok(())
    }
}

/// Builder for [`Session`].
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use oidc_session::auth::{BrowserLauncher, MemoryTokenStore};
/// use oidc_session::config::SessionConfig;
/// use oidc_session::session::SessionBuilder;
///
/// # fn example(browser: Arc<dyn BrowserLauncher>) -> Result<(), oidc_session::auth::AuthError> {
/// let session = SessionBuilder::new(SessionConfig::new("tenant.example.com", "client-id"), browser)
///     .with_store(Arc::new(MemoryTokenStore::new()))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct SessionBuilder {
    config: SessionConfig,
    browser: Arc<dyn BrowserLauncher>,
    store: Option<Arc<dyn SecureTokenStore>>,
    decoder: Arc<dyn IdentityTokenDecoder>,
    http: Option<reqwest::Client>,
}

impl SessionBuilder {
    pub fn new(config: SessionConfig, browser: Arc<dyn BrowserLauncher>) -> Self {
        Self {
            config,
            browser,
            store: None,
            decoder: Arc::new(JwtPayloadDecoder),
            http: None,
        }
    }

    /// Defaults to [`FileTokenStore::new_default`].
    pub fn with_store(mut self, store: Arc<dyn SecureTokenStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn IdentityTokenDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = Some(client);
        self
    }

    /// # Errors
    ///
    /// [`AuthError::Configuration`] when the issuer domain does not form a
    /// valid token endpoint URL.
    pub fn build(self) -> Result<Session, AuthError> {
        let token_url = self.config.token_url()?;
        let mut client =
            TokenEndpointClient::new(token_url, self.config.client_id(), self.decoder.clone());
        if let Some(http) = self.http {
            client = client.with_http_client(http);
        }
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(FileTokenStore::new_default()));

        let core = Arc::new(SessionCore {
            state: SessionStateMachine::new(self.decoder),
            slot: RefreshTokenSlot::new(store),
            client,
            browser: self.browser,
            config: self.config,
        });
        Ok(Session {
            refresh: RefreshCoordinator::new(core.clone()),
            login: LoginCoordinator::new(core.clone()),
            logout: LogoutCoordinator::new(core.clone()),
            core,
        })
    }
}

/// A single user session for this process.
///
/// All methods take `&self`; share it behind an `Arc` when several tasks
/// need it.
pub struct Session {
    core: Arc<SessionCore>,
    refresh: RefreshCoordinator,
    login: LoginCoordinator,
    logout: LogoutCoordinator,
}

impl Session {
    pub fn builder(config: SessionConfig, browser: Arc<dyn BrowserLauncher>) -> SessionBuilder {
        SessionBuilder::new(config, browser)
    }

    /// Bootstrap from the persisted refresh token.
    ///
    /// Call once at process start. Failure (including "nothing persisted")
    /// just leaves the session `Unauthenticated`.
    pub async fn start(&self) {
        match self.refresh.refresh(RefreshOrigin::Startup).await {
            Ok(_) => tracing::debug!("session restored from persisted refresh token"),
            Err(err) => tracing::debug!(error = %err, "no session restored at startup"),
        }
    }

    /// See [`LoginCoordinator::login`].
    pub async fn login(&self, options: LoginOptions) -> Result<(), AuthError> {
        self.login.login(options).await
    }

    /// See [`RefreshCoordinator::get_access_token_silently`].
    pub async fn get_access_token_silently(&self) -> Result<String, AuthError> {
        self.refresh.get_access_token_silently().await
    }

    /// See [`LogoutCoordinator::logout`].
    pub async fn logout(&self) {
        self.logout.logout().await
    }

    pub fn state(&self) -> SessionState {
        self.core.state.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.core.state.subscribe()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.core.config
    }

    /// Whether a refresh token is currently persisted.
    pub async fn has_persisted_refresh_token(&self) -> bool {
        self.core.slot.load().await.is_some()
    }
}
