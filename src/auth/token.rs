use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use super::claims::IdentityTokenDecoder;

/// Tokens produced by a single successful exchange at the token endpoint.
///
/// A `TokenSet` is applied to the session as a whole or not at all.
///
/// # Example
/// ```
/// use chrono::{Duration, Utc};
/// use oidc_session::auth::TokenSet;
///
/// let tokens = TokenSet {
///     access_token: "access".to_string(),
///     id_token: None,
///     refresh_token: Some("refresh".to_string()),
///     expires_at: Utc::now() + Duration::hours(1),
/// };
/// assert!(tokens.is_fresh(Utc::now(), Duration::seconds(120)));
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl TokenSet {
    /// `true` while `now < expires_at - skew`.
    /// An expiry so close to the edge of the calendar that subtracting
    /// `skew` overflows counts as not fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        self.expires_at
            .checked_sub_signed(skew)
            .is_some_and(|deadline| now < deadline)
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"..")
            .field("id_token", &self.id_token.as_ref().map(|_| ".."))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| ".."))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Raw JSON body returned by the token endpoint for either grant.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Resolve the response into a [`TokenSet`] anchored at `now`.
    ///
    /// Without `expires_in` the access token's own `exp` claim is used; an
    /// opaque token with no expiry is treated as already stale.
    pub fn into_token_set(self, now: DateTime<Utc>, decoder: &dyn IdentityTokenDecoder) -> TokenSet {
        let expires_at = match self.expires_in {
            Some(secs) => Duration::try_seconds(secs)
                .and_then(|lifetime| now.checked_add_signed(lifetime))
                .unwrap_or(if secs > 0 { DateTime::<Utc>::MAX_UTC } else { now }),
            None => decoder
                .decode(&self.access_token)
                .ok()
                .and_then(|claims| claims.expires_at())
                .unwrap_or(now),
        };
        TokenSet {
            access_token: self.access_token,
            id_token: self.id_token.filter(|token| !token.is_empty()),
            refresh_token: self.refresh_token.filter(|token| !token.is_empty()),
            expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::JwtPayloadDecoder;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    fn response(expires_in: Option<i64>, access_token: &str) -> TokenResponse {
        TokenResponse {
            access_token: access_token.to_string(),
            id_token: Some(String::new()),
            refresh_token: Some("rt".to_string()),
            expires_in,
            token_type: Some("Bearer".to_string()),
            scope: None,
        }
    }

    #[test]
    fn expires_in_is_relative_to_now() {
        let now = Utc::now();
        let set = response(Some(3600), "opaque").into_token_set(now, &JwtPayloadDecoder);
        assert_eq!(set.expires_at, now + Duration::seconds(3600));
        assert_eq!(set.refresh_token.as_deref(), Some("rt"));
        assert!(set.id_token.is_none(), "empty id_token should be dropped");
    }

    #[test]
    fn out_of_range_expires_in_is_clamped() {
        let now = Utc::now();
        let far = response(Some(i64::MAX), "opaque").into_token_set(now, &JwtPayloadDecoder);
        assert_eq!(far.expires_at, DateTime::<Utc>::MAX_UTC);
        assert!(far.is_fresh(now, Duration::seconds(120)));

        let past = response(Some(i64::MIN), "opaque").into_token_set(now, &JwtPayloadDecoder);
        assert_eq!(past.expires_at, now);
        assert!(!past.is_fresh(now, Duration::zero()));
    }

    #[test]
    fn freshness_check_does_not_overflow_at_calendar_edge() {
        let set = TokenSet {
            access_token: "a".to_string(),
            id_token: None,
            refresh_token: None,
            expires_at: DateTime::<Utc>::MIN_UTC,
        };
        assert!(!set.is_fresh(Utc::now(), Duration::seconds(120)));
    }

    #[test]
    fn missing_expires_in_falls_back_to_access_token_exp() {
        let now = Utc::now();
        let exp = now.timestamp() + 900;
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"u1","exp":{exp}}}"#));
        let jwt = format!("e30.{payload}.sig");
        let set = response(None, &jwt).into_token_set(now, &JwtPayloadDecoder);
        assert_eq!(set.expires_at.timestamp(), exp);
    }

    #[test]
    fn opaque_token_without_expiry_is_stale() {
        let now = Utc::now();
        let set = response(None, "opaque").into_token_set(now, &JwtPayloadDecoder);
        assert!(!set.is_fresh(now, Duration::zero()));
    }

    #[test]
    fn freshness_honours_skew() {
        let now = Utc::now();
        let set = TokenSet {
            access_token: "a".to_string(),
            id_token: None,
            refresh_token: None,
            expires_at: now + Duration::seconds(60),
        };
        assert!(set.is_fresh(now, Duration::zero()));
        assert!(!set.is_fresh(now, Duration::seconds(120)));
    }

    #[test]
    fn debug_redacts_secrets() {
        let set = TokenSet {
            access_token: "super-secret".to_string(),
            id_token: Some("id-secret".to_string()),
            refresh_token: Some("refresh-secret".to_string()),
            expires_at: Utc::now(),
        };
        let rendered = format!("{set:?}");
        assert!(!rendered.contains("secret"));
    }
}
