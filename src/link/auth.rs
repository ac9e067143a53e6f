//! Access-token exchange. Every connection attempt mints a fresh token from
//! the auth endpoint; tokens are never cached across attempts.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::Credentials;

/// Reasons a token exchange can fail. All of them are recoverable; the
/// supervisor logs and schedules a retry.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Request failed at the HTTP layer: network error, timeout, error
    /// status, or an undecodable body
    #[error("Token request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The endpoint answered with success but an empty token field
    #[error("Token endpoint returned an empty token")]
    EmptyToken,
}

/// Opaque short-lived credential for a single connection attempt
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AccessToken(String);

impl AccessToken {
    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    key: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    response: String,
}

/// Exchanges the device credentials for a fresh access token.
///
/// Sends exactly one request; retry timing is the supervisor's concern, never
/// this function's.
pub(crate) async fn fetch_token(
    client: &Client,
    credentials: &Credentials,
    timeout: Duration,
) -> Result<AccessToken, AuthError> {
    let body = TokenRequest {
        key: &credentials.api_key,
        password: &credentials.password,
    };

    let response: TokenResponse = client
        .post(&credentials.auth_endpoint)
        .timeout(timeout)
        .json(&body)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    if response.response.is_empty() {
        return Err(AuthError::EmptyToken);
    }

    Ok(AccessToken(response.response))
}
