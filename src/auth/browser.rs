//! Browser-launch capability and the options that travel with a login.
//!
//! Presentation options only ever reach the [`BrowserLauncher`]; request
//! options only ever reach the token endpoint. Keeping them in separate
//! structs means neither can leak into the other's wire format.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bon::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Outcome of a browser round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserResult {
    /// The redirect came back with an authorization code.
    Success { code: String, state: Option<String> },
    /// The provider redirected with an error.
    Error { description: Option<String> },
    /// The user closed the browser.
    Cancel,
    /// The browser was dismissed programmatically.
    Dismiss,
}

impl BrowserResult {
    /// Parse the redirect URL the browser landed on.
    ///
    /// Query parameters win over fragment parameters, matching how
    /// authorization servers answer `response_mode=query`.
    pub fn from_redirect_url(url: &reqwest::Url) -> Self {
        let mut params: BTreeMap<String, String> = url
            .fragment()
            .map(|fragment| {
                reqwest::Url::parse(&format!("http://fragment/?{fragment}"))
                    .map(|parsed| parsed.query_pairs().into_owned().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default();
        params.extend(url.query_pairs().into_owned());

        if let Some(error) = params.get("error") {
            let description = params
                .get("error_description")
                .cloned()
                .or_else(|| Some(error.clone()));
            return Self::Error { description };
        }
        match params.remove("code") {
            Some(code) => Self::Success {
                code,
                state: params.remove("state"),
            },
            None => Self::Dismiss,
        }
    }
}

/// Opens URLs in a browser and reports how the round-trip ended.
///
/// Implementations must always resolve: a closed window is
/// [`BrowserResult::Cancel`], never a hang.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn open(&self, url: &str, options: &PresentationOptions) -> BrowserResult;
}

/// Style of the dismiss button on in-app browsers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DismissButtonStyle {
    Done,
    Close,
    Cancel,
}

/// How the browser should present the authorization page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Builder, Serialize, Deserialize)]
pub struct PresentationOptions {
    pub toolbar_color: Option<String>,
    pub secondary_toolbar_color: Option<String>,
    pub controls_color: Option<String>,
    pub browser_package: Option<String>,
    pub enable_bar_collapsing: Option<bool>,
    pub show_title: Option<bool>,
    pub enable_default_share_menu_item: Option<bool>,
    pub show_in_recents: Option<bool>,
    pub create_task: Option<bool>,
    pub dismiss_button_style: Option<DismissButtonStyle>,
    pub reader_mode: Option<bool>,
    pub window_name: Option<String>,
    pub window_features: Option<String>,
    /// Replaces the generated authorization URL when set.
    pub url: Option<String>,
    pub use_proxy: Option<bool>,
}

/// Extra form fields sent with the authorization-code exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub token_params: BTreeMap<String, String>,
}

impl RequestOptions {
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.token_params.insert(key.into(), value.into());
        self
    }
}

/// Options for a single [`crate::session::Session::login`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginOptions {
    pub presentation: PresentationOptions,
    pub request: RequestOptions,
    /// Per-call authorization parameters, merged over the configured ones.
    pub authorization_params: BTreeMap<String, String>,
}
