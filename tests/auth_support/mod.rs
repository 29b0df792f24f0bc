#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use oidc_session::auth::{
    AuthError, BrowserLauncher, BrowserResult, PresentationOptions,
    SecureTokenStore, REFRESH_TOKEN_KEY,
};
use oidc_session::config::SessionConfig;
use oidc_session::session::Session;
use serde_json::Value;

/// Browser that answers from a script and records every call.
#[derive(Default)]
pub struct ScriptedBrowser {
    script: Mutex<VecDeque<BrowserResult>>,
    opened: Mutex<Vec<(String, PresentationOptions)>>,
    echo_state: bool,
    delay: Option<Duration>,
}

impl ScriptedBrowser {
    pub fn new(script: impl IntoIterator<Item = BrowserResult>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Answers every authorization page with `code` and the request's own `state`.
    pub fn approving(code: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::from([BrowserResult::Success {
                code: code.to_string(),
                state: None,
            }])),
            opened: Mutex::new(Vec::new()),
            echo_state: true,
            delay: None,
        }
    }

    /// Keep the browser open for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn opened(&self) -> Vec<(String, PresentationOptions)> {
        self.opened.lock().expect("browser lock poisoned").clone()
    }

    pub fn opened_urls(&self) -> Vec<reqwest::Url> {
        self.opened()
            .into_iter()
            .map(|(url, _)| reqwest::Url::parse(&url).expect("browser got a valid URL"))
            .collect()
    }
}

#[async_trait]
impl BrowserLauncher for ScriptedBrowser {
    async fn open(&self, url: &str, options: &PresentationOptions) -> BrowserResult {
        self.opened
            .lock()
            .expect("browser lock poisoned")
            .push((url.to_string(), options.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self
            .script
            .lock()
            .expect("browser lock poisoned")
            .pop_front()
            .unwrap_or(BrowserResult::Dismiss);
        match next {
            BrowserResult::Success { code, state: None } if self.echo_state => {
                let state = reqwest::Url::parse(url)
                    .ok()
                    .and_then(|parsed| {
                        parsed
                            .query_pairs()
                            .find(|(key, _)| key == "state")
                            .map(|(_, value)| value.into_owned())
                    });
                BrowserResult::Success { code, state }
            }
            other => other,
        }
    }
}

/// Which store operations fail.
#[derive(Debug, Default, Clone, Copy)]
pub struct Failures {
    pub get: bool,
    pub set: bool,
    pub delete: bool,
}

/// Store backed by a map, with switchable failures and an optional write delay.
#[derive(Default)]
pub struct FlakyStore {
    values: Mutex<HashMap<String, String>>,
    failures: Mutex<Failures>,
    set_delay: Option<Duration>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(failures: Failures) -> Self {
        Self {
            failures: Mutex::new(failures),
            ..Self::default()
        }
    }

    pub fn with_set_delay(mut self, delay: Duration) -> Self {
        self.set_delay = Some(delay);
        self
    }

    pub fn seed(&self, value: &str) {
        self.values
            .lock()
            .expect("store lock poisoned")
            .insert(REFRESH_TOKEN_KEY.to_string(), value.to_string());
    }

    pub fn raw(&self) -> Option<String> {
        self.values
            .lock()
            .expect("store lock poisoned")
            .get(REFRESH_TOKEN_KEY)
            .cloned()
    }

    pub fn set_failures(&self, failures: Failures) {
        *self.failures.lock().expect("store lock poisoned") = failures;
    }

    fn failures(&self) -> Failures {
        *self.failures.lock().expect("store lock poisoned")
    }
}

#[async_trait]
impl SecureTokenStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        if self.failures().get {
            return Err(AuthError::Storage("keychain locked".to_string()));
        }
        Ok(self.values.lock().expect("store lock poisoned").get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), AuthError> {
        if let Some(delay) = self.set_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failures().set {
            return Err(AuthError::Storage("keychain read-only".to_string()));
        }
        self.values
            .lock()
            .expect("store lock poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), AuthError> {
        if self.failures().delete {
            return Err(AuthError::Storage("keychain refused delete".to_string()));
        }
        self.values.lock().expect("store lock poisoned").remove(key);
        Ok(())
    }
}

/// Unsigned JWT with the given payload.
pub fn jwt(payload: Value) -> String {
    format!(
        "{}.{}.signature",
        URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(payload.to_string())
    )
}

pub fn config_for(issuer: &str) -> SessionConfig {
    SessionConfig::new(issuer, "test-client").with_redirect_uri("myapp://callback")
}

pub fn session_with(
    issuer: &str,
    store: Arc<dyn SecureTokenStore>,
    browser: Arc<dyn BrowserLauncher>,
) -> Session {
    Session::builder(config_for(issuer), browser)
        .with_store(store)
        .build()
        .expect("session builds")
}
