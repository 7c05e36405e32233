//! OAuth password and refresh grants against the gallery's token endpoint.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, trace, warn};

use super::ApiError;
use crate::auth::{ExchangeError, Token, TokenExchange};
use crate::config::OAuthClientConfig;
use crate::secrets::StoredCredential;

/// HTTP request timeout in seconds
pub(crate) const REQUEST_TIMEOUT_SECS: u64 = 30;

/// User agent the gallery's mobile API expects
pub(crate) const USER_AGENT: &str = "PixivIOSApp/5.8.7";

/// Referer the gallery's mobile API expects
pub(crate) const REFERER: &str = "http://spapi.pixiv.net/";

#[derive(Debug, Deserialize)]
struct AuthEnvelope {
    response: AuthResponse,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: AuthUser,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: serde_json::Value,
}

impl AuthUser {
    fn subject_id(&self) -> Option<String> {
        match self.id {
            serde_json::Value::String(ref s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(ref n) => Some(n.to_string()),
            _ => None,
        }
    }
}

enum Grant<'a> {
    Refresh(&'a str),
    Password(&'a StoredCredential),
}

/// Token exchange over HTTP.
/// Clone is cheap - the blocking client shares its connection pool.
#[derive(Clone)]
pub struct OAuthExchange {
    client: Client,
    config: OAuthClientConfig,
}

impl OAuthExchange {
    pub fn new(config: OAuthClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self::with_client(client, config))
    }

    /// Share an existing client (and its connection pool)
    pub fn with_client(client: Client, config: OAuthClientConfig) -> Self {
        if !config.custom_client_secret && config.client_secret.is_some() {
            warn!("token endpoint does not accept a custom client_secret; it will not be sent");
        }
        Self { client, config }
    }

    fn form_fields<'a>(&'a self, grant: &Grant<'a>) -> Vec<(&'static str, &'a str)> {
        let mut form = vec![
            ("client_id", self.config.client_id.as_str()),
            ("get_secure_url", "1"),
        ];
        if self.config.custom_client_secret {
            if let Some(ref secret) = self.config.client_secret {
                form.push(("client_secret", secret.as_str()));
            }
        }
        match *grant {
            Grant::Refresh(refresh_token) => {
                form.push(("grant_type", "refresh_token"));
                form.push(("refresh_token", refresh_token));
            }
            Grant::Password(credential) => {
                form.push(("grant_type", "password"));
                form.push(("username", credential.login.as_str()));
                form.push(("password", credential.secret.as_str()));
            }
        }
        form
    }

    fn exchange(&self, grant: Grant<'_>) -> Result<Token, ExchangeError> {
        let form = self.form_fields(&grant);

        debug!(url = %self.config.auth_url, "sending token request");
        let response = self
            .client
            .post(&self.config.auth_url)
            .header(reqwest::header::REFERER, REFERER)
            .form(&form)
            .send()
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(ExchangeError::Rejected(format!(
                "{}: {}",
                status,
                ApiError::truncate_body(&body)
            )));
        }

        trace!(bytes = body.len(), "token response received");
        parse_token_response(&body)
    }
}

fn parse_token_response(body: &str) -> Result<Token, ExchangeError> {
    let envelope: AuthEnvelope =
        serde_json::from_str(body).map_err(|e| ExchangeError::Malformed(e.to_string()))?;
    let auth = envelope.response;

    if auth.access_token.is_empty() {
        return Err(ExchangeError::Malformed(
            "response does not contain access_token".to_string(),
        ));
    }
    if auth.expires_in <= 0 {
        return Err(ExchangeError::Malformed(format!(
            "non-positive expires_in: {}",
            auth.expires_in
        )));
    }
    let subject_id = auth
        .user
        .subject_id()
        .ok_or_else(|| ExchangeError::Malformed("response does not contain user id".to_string()))?;

    Ok(Token::expiring_in(
        auth.access_token,
        auth.refresh_token,
        chrono::Duration::seconds(auth.expires_in),
        subject_id,
    ))
}

impl TokenExchange for OAuthExchange {
    fn refresh(&self, refresh_token: &str) -> Result<Token, ExchangeError> {
        self.exchange(Grant::Refresh(refresh_token))
    }

    fn login(&self, credential: &StoredCredential) -> Result<Token, ExchangeError> {
        self.exchange(Grant::Password(credential))
    }
}
