//! OAuth2/OIDC session and token-lifecycle manager.
//!
//! Tracks whether the user is signed in, runs the authorization-code + PKCE
//! login through a browser capability, keeps an access token usable with
//! single-flight silent refresh, and tears everything down on logout.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use oidc_session::prelude::*;
//!
//! # async fn example(browser: Arc<dyn BrowserLauncher>) -> Result<(), AuthError> {
//! let config = SessionConfig::from_env()?;
//! let session = Session::builder(config, browser).build()?;
//! session.start().await;
//! if !session.state().is_authenticated {
//!     session.login(LoginOptions::default()).await?;
//! }
//! let token = session.get_access_token_silently().await?;
//! # let _ = token;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod prelude;
pub mod session;

#[cfg(feature = "cli")]
pub mod cli;
