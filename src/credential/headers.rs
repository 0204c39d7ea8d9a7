//! Outbound authorization headers.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};

use crate::error::{ConfigurationError, CredentialError, ResilienceResult};
use crate::types::{BetaHeader, Credential};

/// Headers authenticating a request with `credential`.
///
/// OAuth sends `Authorization: Bearer` plus the beta header; an API key goes
/// in `api_key_header` as-is.
pub fn authorization_headers(
    credential: &Credential,
    api_key_header: &str,
    beta_header: Option<&BetaHeader>,
) -> ResilienceResult<HeaderMap> {
    let mut headers = HeaderMap::new();

    match credential {
        Credential::OAuth(_) => {
            let mut bearer = header_value(&format!("Bearer {}", credential.secret()))?;
            bearer.set_sensitive(true);
            headers.insert(AUTHORIZATION, bearer);

            if let Some(beta) = beta_header {
                headers.insert(header_name(&beta.name)?, header_value(&beta.value)?);
            }
        }
        Credential::ApiKey { .. } => {
            let mut key = header_value(credential.secret())?;
            key.set_sensitive(true);
            headers.insert(header_name(api_key_header)?, key);
        }
    }

    Ok(headers)
}

fn header_name(name: &str) -> ResilienceResult<HeaderName> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
        ConfigurationError::InvalidValue {
            field: "header_name".to_string(),
            message: format!("{}: {}", name, e),
        }
        .into()
    })
}

fn header_value(value: &str) -> ResilienceResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| {
        CredentialError::Invalid {
            key: "-".to_string(),
            message: "credential contains characters not allowed in a header".to_string(),
        }
        .into()
    })
}
