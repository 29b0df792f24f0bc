//! Session configuration (code > env).

use std::collections::BTreeMap;

use chrono::Duration;
use reqwest::Url;

use crate::auth::AuthError;

/// Default scopes, comma-delimited as accepted by [`SessionConfig::with_scope`].
pub const DEFAULT_SCOPE: &str = "offline_access,openid,profile,email";

/// Margin subtracted from token expiry before a cached token is handed out.
pub const DEFAULT_SKEW_SECONDS: i64 = 120;

const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8765/callback";

/// Everything the session needs to talk to one issuer.
///
/// ```
/// use oidc_session::config::SessionConfig;
///
/// let config = SessionConfig::new("tenant.example.com", "client-123")
///     .with_scope("openid,profile")
///     .with_audience("https://api.example.com");
/// assert_eq!(config.scopes(), ["openid", "profile"]);
/// assert_eq!(config.token_url().unwrap().as_str(), "https://tenant.example.com/oauth/token");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    domain: String,
    client_id: String,
    redirect_uri: Option<String>,
    scopes: Vec<String>,
    audience: Option<String>,
    nonce: Option<String>,
    extra_params: BTreeMap<String, String>,
    skew: Duration,
}

impl SessionConfig {
    pub fn new(domain: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            client_id: client_id.into(),
            redirect_uri: None,
            scopes: parse_scope(DEFAULT_SCOPE),
            audience: None,
            nonce: None,
            extra_params: BTreeMap::new(),
            skew: Duration::seconds(DEFAULT_SKEW_SECONDS),
        }
    }

    /// Load from `OIDC_*` environment variables (after reading `.env`).
    ///
    /// `OIDC_DOMAIN` and `OIDC_CLIENT_ID` are required. Optional:
    /// `OIDC_REDIRECT_URI`, `OIDC_SCOPE`, `OIDC_AUDIENCE`, `OIDC_NONCE`, and
    /// any `OIDC_PARAM_<NAME>` which becomes the extra parameter `<name>`.
    pub fn from_env() -> Result<Self, AuthError> {
        let _ = dotenvy::dotenv();
        Self::from_vars(std::env::vars())
    }

    /// Same as [`from_env`](Self::from_env) over an explicit variable list.
    pub fn from_vars<I>(vars: I) -> Result<Self, AuthError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: BTreeMap<String, String> = vars.into_iter().collect();
        let required = |name: &str| {
            vars.get(name)
                .filter(|value| !value.trim().is_empty())
                .cloned()
                .ok_or_else(|| AuthError::Configuration(format!("{name} is not set")))
        };

        let mut config = Self::new(required("OIDC_DOMAIN")?, required("OIDC_CLIENT_ID")?);
        if let Some(uri) = vars.get("OIDC_REDIRECT_URI") {
            config = config.with_redirect_uri(uri.clone());
        }
        if let Some(scope) = vars.get("OIDC_SCOPE") {
            config = config.with_scope(scope);
        }
        if let Some(audience) = vars.get("OIDC_AUDIENCE") {
            config = config.with_audience(audience.clone());
        }
        if let Some(nonce) = vars.get("OIDC_NONCE") {
            config = config.with_nonce(nonce.clone());
        }
        for (name, value) in &vars {
            if let Some(param) = name.strip_prefix("OIDC_PARAM_") {
                config = config.with_extra_param(param.to_ascii_lowercase(), value.clone());
            }
        }
        Ok(config)
    }

    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(uri.into());
        self
    }

    /// Comma-delimited scope list; blanks and duplicates are dropped.
    pub fn with_scope(mut self, scope: &str) -> Self {
        self.scopes = parse_scope(scope);
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    pub fn with_extra_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_params.insert(key.into(), value.into());
        self
    }

    pub fn with_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn skew(&self) -> Duration {
        self.skew
    }

    pub fn redirect_uri(&self) -> &str {
        self.redirect_uri.as_deref().unwrap_or(DEFAULT_REDIRECT_URI)
    }

    /// Parameters forwarded verbatim to the authorization endpoint:
    /// `audience`, `nonce`, then the open map (which wins on conflicts).
    pub fn authorization_params(&self) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        if let Some(audience) = &self.audience {
            params.insert("audience".to_string(), audience.clone());
        }
        if let Some(nonce) = &self.nonce {
            params.insert("nonce".to_string(), nonce.clone());
        }
        params.extend(self.extra_params.clone());
        params
    }

    /// Issuer base URL. A bare domain gets `https://`.
    pub fn issuer(&self) -> Result<Url, AuthError> {
        let domain = self.domain.trim().trim_end_matches('/');
        if domain.is_empty() {
            return Err(AuthError::Configuration("issuer domain is empty".to_string()));
        }
        let base = if domain.contains("://") {
            format!("{domain}/")
        } else {
            format!("https://{domain}/")
        };
        Url::parse(&base)
            .map_err(|err| AuthError::Configuration(format!("invalid issuer domain {domain}: {err}")))
    }

    pub fn authorize_url(&self) -> Result<Url, AuthError> {
        self.endpoint("authorize")
    }

    pub fn token_url(&self) -> Result<Url, AuthError> {
        self.endpoint("oauth/token")
    }

    pub fn logout_url(&self) -> Result<Url, AuthError> {
        let mut url = self.endpoint("v2/logout")?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("returnTo", self.redirect_uri());
        Ok(url)
    }

    fn endpoint(&self, path: &str) -> Result<Url, AuthError> {
        self.issuer()?
            .join(path)
            .map_err(|err| AuthError::Configuration(format!("invalid endpoint {path}: {err}")))
    }
}

fn parse_scope(scope: &str) -> Vec<String> {
    let mut scopes: Vec<String> = Vec::new();
    for item in scope.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !scopes.iter().any(|existing| existing == item) {
            scopes.push(item.to_string());
        }
    }
    scopes
}
