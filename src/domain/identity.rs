//! Caller identity and capability models

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;

/// Credential presented by a caller
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum Credential {
    /// API key from the Authorization header
    ApiKey(String),
    /// Distinguished name of a client certificate, as forwarded by the TLS terminator
    Certificate(String),
}

impl Credential {
    /// Log-safe identifier. API keys are never written out; the first
    /// 8 hex chars of their SHA-256 stand in.
    pub fn fingerprint(&self) -> String {
        match self {
            Credential::ApiKey(key) => {
                let digest = Sha256::digest(key.as_bytes());
                format!("apikey:{}", &hex::encode(digest)[..8])
            }
            Credential::Certificate(dn) => format!("cert:{}", dn),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&self.fingerprint()).finish()
    }
}

/// Authenticated caller, built once per request by the identity resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    distinguished_name: String,
    capabilities: HashSet<String>,
}

impl Identity {
    pub fn new<I, S>(distinguished_name: impl Into<String>, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            distinguished_name: distinguished_name.into(),
            capabilities: capabilities.into_iter().map(Into::into).collect(),
        }
    }

    pub fn distinguished_name(&self) -> &str {
        &self.distinguished_name
    }

    pub fn capabilities(&self) -> &HashSet<String> {
        &self.capabilities
    }

    /// Exact, case-sensitive membership
    pub fn has_capability(&self, capability: &Capability) -> bool {
        self.capabilities.contains(capability.as_str())
    }
}

/// Capability a request requires
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Capability(String);

impl Capability {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
