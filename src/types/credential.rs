//! Credential Types
//!
//! On-disk credential file model and its typed runtime view.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{CredentialError, ResilienceError, ResilienceResult};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Opaque credential address: a file path or an in-memory identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialKey(String);

impl CredentialKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Interpret the key as a filesystem path.
    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }
}

impl fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CredentialKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for CredentialKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<PathBuf> for CredentialKey {
    fn from(path: PathBuf) -> Self {
        Self(path.to_string_lossy().into_owned())
    }
}

impl From<&Path> for CredentialKey {
    fn from(path: &Path) -> Self {
        Self(path.to_string_lossy().into_owned())
    }
}

/// Credential type discriminator (`"type"` in the file).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialType {
    #[serde(rename = "oauth")]
    OAuth,
    #[serde(rename = "api_key")]
    ApiKey,
}

impl CredentialType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OAuth => "oauth",
            Self::ApiKey => "api_key",
        }
    }
}

/// OAuth token set stored under `"oauth"`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthTokens {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Expiry in milliseconds since the Unix epoch.
    pub expires_at: i64,
    #[serde(default)]
    pub scopes: BTreeSet<String>,
    #[serde(default)]
    pub is_max: bool,
}

impl OAuthTokens {
    /// True while `now < expires_at - buffer`.
    pub fn is_fresh(&self, now_ms: i64, buffer_ms: i64) -> bool {
        now_ms < self.expires_at.saturating_sub(buffer_ms)
    }

    /// True once the access token itself has expired.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at
    }

    /// Usable refresh token, ignoring empty strings.
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|token| !token.is_empty())
    }
}

impl fmt::Debug for OAuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthTokens")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .field("is_max", &self.is_max)
            .finish()
    }
}

/// Credential file as persisted in durable storage.
///
/// Fields other than `type`, `api_key` and `oauth` are passthrough: they are
/// carried verbatim through every refresh rewrite, unknown keys included.
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialFile {
    #[serde(rename = "type")]
    pub kind: CredentialType,
    #[serde(rename = "accountId", default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth: Option<OAuthTokens>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CredentialFile {
    /// Build an API key credential.
    pub fn api_key(api_key: impl Into<String>) -> Self {
        Self {
            kind: CredentialType::ApiKey,
            account_id: None,
            api_key: Some(api_key.into()),
            oauth: None,
            client_api_key: None,
            slack: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Build an OAuth credential.
    pub fn oauth(tokens: OAuthTokens) -> Self {
        Self {
            kind: CredentialType::OAuth,
            account_id: None,
            api_key: None,
            oauth: Some(tokens),
            client_api_key: None,
            slack: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Parse and validate a credential file body.
    pub fn parse(key: &CredentialKey, body: &str) -> ResilienceResult<Self> {
        let file: Self = serde_json::from_str(body).map_err(|e| invalid(key, e.to_string()))?;
        file.validate().map_err(|message| invalid(key, message))?;
        Ok(file)
    }

    /// Check the type-specific required sub-fields.
    pub fn validate(&self) -> Result<(), String> {
        match self.kind {
            CredentialType::ApiKey => match self.api_key.as_deref() {
                Some(key) if !key.is_empty() => Ok(()),
                _ => Err("api_key credential is missing \"api_key\"".to_string()),
            },
            CredentialType::OAuth => match &self.oauth {
                Some(tokens) if !tokens.access_token.is_empty() => Ok(()),
                Some(_) => Err("oauth credential has an empty accessToken".to_string()),
                None => Err("oauth credential is missing \"oauth\"".to_string()),
            },
        }
    }

    /// Typed view of the authentication material.
    pub fn credential(&self) -> Option<Credential> {
        match self.kind {
            CredentialType::ApiKey => self.api_key.as_ref().map(|key| Credential::ApiKey {
                api_key: SecretString::new(key.clone()),
            }),
            CredentialType::OAuth => self.oauth.clone().map(Credential::OAuth),
        }
    }

    /// Copy of this file with the OAuth sub-object replaced.
    pub fn with_oauth(&self, tokens: OAuthTokens) -> Self {
        Self {
            oauth: Some(tokens),
            ..self.clone()
        }
    }

    /// Serialize to the on-disk JSON form.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn invalid(key: &CredentialKey, message: String) -> ResilienceError {
    CredentialError::Invalid {
        key: key.to_string(),
        message,
    }
    .into()
}

impl fmt::Debug for CredentialFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialFile")
            .field("kind", &self.kind)
            .field("account_id", &self.account_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("oauth", &self.oauth)
            .field(
                "client_api_key",
                &self.client_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("slack", &self.slack.is_some())
            .field("extra_keys", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Per-domain authentication material.
#[derive(Clone)]
pub enum Credential {
    ApiKey { api_key: SecretString },
    OAuth(OAuthTokens),
}

impl Credential {
    pub fn kind(&self) -> CredentialType {
        match self {
            Self::ApiKey { .. } => CredentialType::ApiKey,
            Self::OAuth(_) => CredentialType::OAuth,
        }
    }

    /// Secret usable on the wire: the API key or the access token.
    pub fn secret(&self) -> &str {
        match self {
            Self::ApiKey { api_key } => api_key.expose_secret(),
            Self::OAuth(tokens) => &tokens.access_token,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiKey { .. } => f.write_str("Credential::ApiKey([REDACTED])"),
            Self::OAuth(tokens) => f.debug_tuple("Credential::OAuth").field(tokens).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn key() -> CredentialKey {
        CredentialKey::new("/tmp/example.credentials.json")
    }

    #[test]
    fn test_parse_oauth_with_passthrough() {
        let body = r#"{
            "type": "oauth",
            "accountId": "acct-1",
            "oauth": {
                "accessToken": "at",
                "refreshToken": "rt",
                "expiresAt": 1700000000000,
                "scopes": ["user:inference", "org:create_api_key"],
                "isMax": true
            },
            "client_api_key": "sk-client",
            "slack": {"webhook_url": "https://hooks.example.com/x"},
            "custom": 42
        }"#;

        let file = CredentialFile::parse(&key(), body).unwrap();
        assert_eq!(file.kind, CredentialType::OAuth);
        assert_eq!(file.account_id.as_deref(), Some("acct-1"));
        assert_eq!(file.client_api_key.as_deref(), Some("sk-client"));
        assert_eq!(file.extra.get("custom"), Some(&serde_json::json!(42)));

        let tokens = file.oauth.as_ref().unwrap();
        assert_eq!(tokens.refresh_token(), Some("rt"));
        assert!(tokens.is_max);
        assert_eq!(tokens.scopes.len(), 2);

        let reparsed: serde_json::Value =
            serde_json::from_str(&file.to_json_pretty().unwrap()).unwrap();
        assert_eq!(reparsed["slack"]["webhook_url"], "https://hooks.example.com/x");
        assert_eq!(reparsed["custom"], 42);
        assert_eq!(reparsed["oauth"]["expiresAt"], 1700000000000i64);
    }

    #[test]
    fn test_parse_api_key() {
        let file = CredentialFile::parse(&key(), r#"{"type":"api_key","api_key":"sk-1"}"#).unwrap();
        match file.credential() {
            Some(Credential::ApiKey { api_key }) => assert_eq!(api_key.expose_secret(), "sk-1"),
            other => panic!("unexpected credential: {:?}", other),
        }
    }

    #[test]
    fn test_structurally_invalid_files() {
        let cases = [
            r#"{"api_key":"sk-1"}"#,
            r#"{"type":"api_key"}"#,
            r#"{"type":"oauth"}"#,
            r#"{"type":"oauth","oauth":{"refreshToken":"rt","expiresAt":1}}"#,
            r#"{"type":"session","api_key":"sk-1"}"#,
            "not json",
        ];

        for body in cases {
            let error = CredentialFile::parse(&key(), body).unwrap_err();
            assert!(
                matches!(error, ResilienceError::Credential(CredentialError::Invalid { .. })),
                "expected invalid credential for {}",
                body
            );
        }
    }

    #[test]
    fn test_freshness_window() {
        let tokens = OAuthTokens {
            access_token: "at".to_string(),
            refresh_token: None,
            expires_at: 100_000,
            scopes: BTreeSet::new(),
            is_max: false,
        };

        assert!(tokens.is_fresh(39_999, 60_000));
        assert!(!tokens.is_fresh(40_000, 60_000));
        assert!(!tokens.is_expired(99_999));
        assert!(tokens.is_expired(100_000));
        assert_eq!(tokens.refresh_token(), None);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let file = CredentialFile::api_key("sk-secret");
        let rendered = format!("{:?}", file);
        assert!(!rendered.contains("sk-secret"));
    }
}
