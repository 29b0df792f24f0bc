//! Authorization-code + PKCE login.

use std::collections::BTreeMap;
use std::sync::Arc;

use reqwest::Url;

use crate::auth::pkce::{self, PkcePair};
use crate::auth::{AuthError, BrowserResult, LoginOptions};
use crate::config::SessionConfig;

use super::SessionCore;

const GENERIC_AUTHORIZATION_ERROR: &str = "Something went wrong";

/// One login attempt's authorization request. Never reused.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub pkce: PkcePair,
    pub state: String,
    pub extra_params: BTreeMap<String, String>,
    authorize_url: Url,
}

impl AuthorizationRequest {
    /// Build a request with a fresh PKCE pair and `state`.
    ///
    /// `overrides` are merged over the configured extra parameters.
    pub fn new(
        config: &SessionConfig,
        overrides: &BTreeMap<String, String>,
    ) -> Result<Self, AuthError> {
        let mut extra_params = config.authorization_params();
        extra_params.extend(overrides.clone());
        Ok(Self {
            client_id: config.client_id().to_string(),
            redirect_uri: config.redirect_uri().to_string(),
            scopes: config.scopes().to_vec(),
            pkce: PkcePair::generate(),
            state: pkce::generate_state(),
            extra_params,
            authorize_url: config.authorize_url()?,
        })
    }

    /// The full authorization URL. Extra parameters are appended verbatim
    /// and cannot replace the protocol parameters.
    pub fn url(&self) -> Url {
        const RESERVED: [&str; 7] = [
            "client_id",
            "redirect_uri",
            "response_type",
            "scope",
            "state",
            "code_challenge",
            "code_challenge_method",
        ];
        let mut url = self.authorize_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", &self.redirect_uri)
                .append_pair("response_type", "code")
                .append_pair("scope", &self.scopes.join(" "))
                .append_pair("state", &self.state)
                .append_pair("code_challenge", &self.pkce.challenge)
                .append_pair("code_challenge_method", self.pkce.method());
            for (key, value) in &self.extra_params {
                if RESERVED.contains(&key.as_str()) {
                    tracing::warn!(param = %key, "ignoring extra authorization parameter that shadows a protocol parameter");
                    continue;
                }
                query.append_pair(key, value);
            }
        }
        url
    }
}

/// Drives the browser round-trip and the code exchange.
pub struct LoginCoordinator {
    core: Arc<SessionCore>,
}

impl LoginCoordinator {
    pub(crate) fn new(core: Arc<SessionCore>) -> Self {
        Self { core }
    }

    /// Run one login attempt.
    ///
    /// A cancelled or dismissed browser is not an error: the session settles
    /// to `Unauthenticated` and `Ok(())` is returned.
    ///
    /// # Errors
    ///
    /// [`AuthError::AuthorizationDenied`] when the provider reports an error
    /// or the returned `state` does not match, the exchange error when the
    /// code is rejected, [`AuthError::Superseded`] if the session was reset
    /// meanwhile.
    pub async fn login(&self, options: LoginOptions) -> Result<(), AuthError> {
        let core = &self.core;
        let generation = core.state.begin_loading();

        let request = match AuthorizationRequest::new(&core.config, &options.authorization_params) {
            Ok(request) => request,
            Err(err) => return Err(self.fail(generation, err)),
        };
        let url = options
            .presentation
            .url
            .clone()
            .unwrap_or_else(|| request.url().to_string());

        tracing::debug!(generation, "opening authorization page");
        match core.browser.open(&url, &options.presentation).await {
            BrowserResult::Success { code, state } => {
                if let Some(returned) = state {
                    if returned != request.state {
                        return Err(self.fail(
                            generation,
                            AuthError::AuthorizationDenied(
                                "state returned by the authorization server does not match".to_string(),
                            ),
                        ));
                    }
                }
                let exchanged = core
                    .client
                    .exchange_code(
                        &code,
                        &request.pkce.verifier,
                        &request.redirect_uri,
                        &options.request.token_params,
                    )
                    .await;
                match exchanged {
                    Ok(tokens) => core.commit_login(generation, tokens).await,
                    Err(err) => Err(self.fail(generation, err)),
                }
            }
            BrowserResult::Error { description } => {
                let description = description
                    .filter(|text| !text.trim().is_empty())
                    .unwrap_or_else(|| GENERIC_AUTHORIZATION_ERROR.to_string());
                Err(self.fail(generation, AuthError::AuthorizationDenied(description)))
            }
            BrowserResult::Cancel | BrowserResult::Dismiss => {
                tracing::debug!(generation, "login abandoned by user");
                core.state.settle_unauthenticated(generation);
                Ok(())
            }
        }
    }

    fn fail(&self, generation: u64, err: AuthError) -> AuthError {
        tracing::debug!(generation, error = %err, "login failed");
        self.core.state.apply_failure(generation, &err);
        err
    }
}
