//! Token Types
//!
//! Wire types for the OAuth refresh-token grant.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::credential::OAuthTokens;

/// Refresh request body sent to the token endpoint.
#[derive(Clone, Serialize)]
pub struct RefreshTokenRequest<'a> {
    pub client_id: &'a str,
    pub refresh_token: &'a str,
    pub grant_type: &'static str,
}

impl<'a> RefreshTokenRequest<'a> {
    pub fn new(client_id: &'a str, refresh_token: &'a str) -> Self {
        Self {
            client_id,
            refresh_token,
            grant_type: "refresh_token",
        }
    }
}

/// Token response from the authorization server.
#[derive(Clone, Debug, Deserialize)]
pub struct TokenResponse {
    /// Access token.
    pub access_token: String,
    /// Rotated refresh token; absent means the old one stays valid.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds.
    pub expires_in: u64,
    /// Space-separated granted scopes.
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub is_max: Option<bool>,
    /// Additional fields.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl TokenResponse {
    /// Build the replacement token set for `previous`.
    ///
    /// The old refresh token and scopes are kept when the server omits them.
    /// A missing `is_max` reads as `false`.
    pub fn into_tokens(self, previous: &OAuthTokens, now_ms: i64) -> OAuthTokens {
        let lifetime_ms = i64::try_from(self.expires_in.saturating_mul(1000)).unwrap_or(i64::MAX);

        let scopes = match self.scope {
            Some(scope) if !scope.trim().is_empty() => {
                scope.split_whitespace().map(String::from).collect()
            }
            _ => previous.scopes.clone(),
        };

        OAuthTokens {
            access_token: self.access_token,
            refresh_token: self
                .refresh_token
                .filter(|token| !token.is_empty())
                .or_else(|| previous.refresh_token.clone()),
            expires_at: now_ms.saturating_add(lifetime_ms),
            scopes,
            is_max: self.is_max.unwrap_or(false),
        }
    }
}
