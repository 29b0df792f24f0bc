//! Convenience re-exports for common use.

pub use crate::auth::{
    AuthError, BrowserLauncher, BrowserResult, LoginOptions, PresentationOptions,
    RequestOptions, SecureTokenStore, TokenSet, UserClaims,
};
pub use crate::config::SessionConfig;
pub use crate::session::{Session, SessionPhase, SessionState};
