//! HTTP authentication helpers for wiring gateway credentials into the
//! underlying `jsonrpsee` client builder.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use jsonrpsee::http_client::{HeaderMap, HeaderValue};

/// Builds the Basic `Authorization` header. Empty credentials produce no header
/// so gateways behind a private network can run without auth.
pub(crate) fn build_auth_headers(user: &str, password: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    if user.is_empty() && password.is_empty() {
        return Ok(headers);
    }

    let credentials = format!("{user}:{password}");
    let encoded = BASE64_STANDARD.encode(credentials);
    let value = HeaderValue::from_str(&format!("Basic {encoded}"))
        .context("failed to build Authorization header")?;
    headers.insert("Authorization", value);
    Ok(headers)
}
