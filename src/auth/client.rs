use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use reqwest::Url;
use serde::Deserialize;

use super::claims::IdentityTokenDecoder;
use super::error::AuthError;
use super::token::{TokenResponse, TokenSet};

/// Client for the issuer's token endpoint.
///
/// Both grants post `application/x-www-form-urlencoded` bodies and share the
/// same response handling.
#[derive(Clone)]
pub struct TokenEndpointClient {
    http: reqwest::Client,
    token_url: Url,
    client_id: String,
    decoder: Arc<dyn IdentityTokenDecoder>,
}

impl TokenEndpointClient {
    pub fn new(
        token_url: Url,
        client_id: impl Into<String>,
        decoder: Arc<dyn IdentityTokenDecoder>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            token_url,
            client_id: client_id.into(),
            decoder,
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    /// `grant_type=authorization_code` with the PKCE verifier.
    ///
    /// `extra` is appended after the standard fields and cannot override them.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
        extra: &BTreeMap<String, String>,
    ) -> Result<TokenSet, AuthError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("code_verifier", code_verifier),
        ];
        for (key, value) in extra {
            if !form.iter().any(|(existing, _)| *existing == key.as_str()) {
                form.push((key.as_str(), value.as_str()));
            }
        }
        self.post(&form, "authorization code exchange").await
    }

    /// `grant_type=refresh_token`.
    pub async fn refresh(&self, refresh_token: &str, scopes: &[String]) -> Result<TokenSet, AuthError> {
        let scope = scopes.join(" ");
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];
        if !scope.is_empty() {
            form.push(("scope", scope.as_str()));
        }
        self.post(&form, "refresh token exchange").await
    }

    async fn post(&self, form: &[(&str, &str)], operation: &'static str) -> Result<TokenSet, AuthError> {
        tracing::debug!(operation, url = %self.token_url, "posting to token endpoint");
        let resp = self
            .http
            .post(self.token_url.clone())
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::TokenExchangeFailure {
                status: Some(status.as_u16()),
                message: describe_error_body(&body, operation),
            });
        }

        let payload: TokenResponse = resp
            .json()
            .await
            .map_err(|err| AuthError::InvalidResponse(format!("{operation}: {err}")))?;
        Ok(payload.into_token_set(Utc::now(), self.decoder.as_ref()))
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

fn describe_error_body(body: &str, operation: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            error,
            error_description: Some(description),
        }) => format!("{error}: {description}"),
        Ok(ErrorBody { error, .. }) => error,
        Err(_) if body.trim().is_empty() => format!("{operation} rejected"),
        Err(_) => body.trim().chars().take(200).collect(),
    }
}
