//! Capabilities and wire types the session is built from.

pub mod browser;
pub mod claims;
pub mod client;
pub mod error;
pub mod pkce;
pub mod store;
pub mod token;

pub use browser::{
    BrowserLauncher, BrowserResult, DismissButtonStyle, LoginOptions, PresentationOptions,
    RequestOptions,
};
pub use claims::{IdentityTokenDecoder, JwtPayloadDecoder, UserClaims};
pub use client::TokenEndpointClient;
pub use error::AuthError;
pub use pkce::PkcePair;
pub use store::{FileTokenStore, MemoryTokenStore, SecureTokenStore, REFRESH_TOKEN_KEY};
pub use token::{TokenResponse, TokenSet};
