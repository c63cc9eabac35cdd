//! Session gate for the front-end page.
//!
//! Sign-in itself happens upstream; the service only asks whether the
//! request carries an authenticated session.

use anyhow::Context;
use axum::http::{HeaderMap, HeaderName};

/// Decides whether a request belongs to a signed-in user
pub trait SessionGate: Send + Sync {
    fn is_authenticated(&self, headers: &HeaderMap) -> bool;
}

/// Trusts a header set by an authenticating reverse proxy
#[derive(Debug, Clone)]
pub struct TrustedHeaderGate {
    header: HeaderName,
}

impl TrustedHeaderGate {
    pub fn new(header: &str) -> anyhow::Result<Self> {
        let header = HeaderName::from_bytes(header.as_bytes())
            .with_context(|| format!("Invalid auth header name: {:?}", header))?;
        Ok(Self { header })
    }
}

impl SessionGate for TrustedHeaderGate {
    fn is_authenticated(&self, headers: &HeaderMap) -> bool {
        headers
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false)
    }
}
