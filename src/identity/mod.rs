//! Identity resolution against the external identity service
//!
//! A caller's credential is sent to the identity service once per request.
//! A positive decision yields an [`Identity`]; anything else is an
//! authentication failure. There are no retries: the caller resubmits.

use crate::backend::build_http_client;
use crate::config::IdentityConfig;
use crate::domain::{Credential, Identity};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Resolves a credential into an identity
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve(&self, credential: &Credential) -> Result<Identity>;
}

#[derive(Serialize)]
struct AuthnRequest<'a> {
    credential: &'a Credential,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthnResponse {
    authenticated: bool,
    #[serde(default)]
    distinguished_name: Option<String>,
    #[serde(default)]
    authorities: Vec<String>,
}

/// HTTP client for the identity service
#[derive(Clone)]
pub struct IdentityClient {
    base_url: String,
    http_client: Client,
}

impl IdentityClient {
    pub fn new(config: &IdentityConfig) -> Result<Self> {
        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            http_client: build_http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl IdentityProvider for IdentityClient {
    async fn resolve(&self, credential: &Credential) -> Result<Identity> {
        let url = format!("{}/authn", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .json(&AuthnRequest { credential })
            .send()
            .await
            .map_err(|e| {
                AppError::Authentication(format!("Identity service unreachable: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(AppError::Authentication(format!(
                "Identity service rejected the request: {}",
                response.status()
            )));
        }

        let decision: AuthnResponse = response.json().await.map_err(|e| {
            AppError::Authentication(format!("Failed to parse identity decision: {}", e))
        })?;

        match decision {
            AuthnResponse {
                authenticated: true,
                distinguished_name: Some(dn),
                authorities,
            } if !dn.is_empty() => Ok(Identity::new(dn, authorities)),
            AuthnResponse {
                authenticated: true,
                ..
            } => Err(AppError::Authentication(
                "Identity decision is missing a distinguished name".to_string(),
            )),
            _ => Err(AppError::Authentication(
                "Credential was not accepted".to_string(),
            )),
        }
    }
}

/// Pull the caller's credential out of the request headers.
///
/// `Authorization: Basic base64(apiKey:)` and `Authorization: Bearer apiKey`
/// carry an API key; otherwise the certificate principal header set by the
/// TLS terminator is used.
pub fn extract_credential(headers: &HeaderMap, cert_header: &str) -> Result<Credential> {
    if let Some(value) = headers.get(AUTHORIZATION) {
        let value = value
            .to_str()
            .map_err(|_| AppError::Authentication("Invalid authorization header encoding".to_string()))?;
        return parse_authorization(value);
    }

    headers
        .get(cert_header)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|dn| !dn.is_empty())
        .map(|dn| Credential::Certificate(dn.to_string()))
        .ok_or_else(|| AppError::Authentication("Missing credential".to_string()))
}

fn parse_authorization(value: &str) -> Result<Credential> {
    if let Some(token) = value.strip_prefix("Bearer ") {
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::Authentication("Empty bearer credential".to_string()));
        }
        return Ok(Credential::ApiKey(token.to_string()));
    }

    if let Some(encoded) = value.strip_prefix("Basic ") {
        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|_| AppError::Authentication("Invalid basic credential".to_string()))?;
        let decoded = String::from_utf8(decoded)
            .map_err(|_| AppError::Authentication("Invalid basic credential".to_string()))?;
        // The API key is the user part; the password part is ignored
        let key = decoded.split(':').next().unwrap_or_default().trim();
        if key.is_empty() {
            return Err(AppError::Authentication("Empty basic credential".to_string()));
        }
        return Ok(Credential::ApiKey(key.to_string()));
    }

    Err(AppError::Authentication(
        "Authorization header must use Basic or Bearer scheme".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const CERT_HEADER: &str = "x-client-certificate-dn";

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_basic_api_key() {
        let encoded = STANDARD.encode("my-api-key:");
        let credential =
            extract_credential(&headers(&[("authorization", &format!("Basic {}", encoded))]), CERT_HEADER)
                .unwrap();
        assert_eq!(credential, Credential::ApiKey("my-api-key".to_string()));
    }

    #[test]
    fn test_bearer_api_key() {
        let credential =
            extract_credential(&headers(&[("authorization", "Bearer key-123")]), CERT_HEADER).unwrap();
        assert_eq!(credential, Credential::ApiKey("key-123".to_string()));
    }

    #[test]
    fn test_certificate_principal() {
        let credential =
            extract_credential(&headers(&[(CERT_HEADER, "CN=carol,OU=ops")]), CERT_HEADER).unwrap();
        assert_eq!(credential, Credential::Certificate("CN=carol,OU=ops".to_string()));
    }

    #[test]
    fn test_authorization_header_takes_precedence() {
        let credential = extract_credential(
            &headers(&[("authorization", "Bearer k"), (CERT_HEADER, "CN=carol")]),
            CERT_HEADER,
        )
        .unwrap();
        assert_eq!(credential, Credential::ApiKey("k".to_string()));
    }

    #[test]
    fn test_missing_credential() {
        let err = extract_credential(&HeaderMap::new(), CERT_HEADER).unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));
    }

    #[test]
    fn test_unsupported_scheme() {
        let err = extract_credential(&headers(&[("authorization", "Digest abc")]), CERT_HEADER)
            .unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));
    }

    #[test]
    fn test_empty_basic_key() {
        let encoded = STANDARD.encode(":password");
        let err = extract_credential(
            &headers(&[("authorization", &format!("Basic {}", encoded))]),
            CERT_HEADER,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));
    }

    #[test]
    fn test_invalid_base64() {
        let err = extract_credential(&headers(&[("authorization", "Basic !!!")]), CERT_HEADER)
            .unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));
    }
}
