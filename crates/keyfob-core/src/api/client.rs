//! API client for the gallery's public JSON API.
//!
//! `GalleryClient` owns the `AuthSession` for the service and authenticates
//! lazily on the first call that needs a token. Single-entity lookups go
//! through an `ApiCallCache`; paginated listings never do.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde_json::Value;
use tracing::{debug, trace, warn};

use super::oauth::{OAuthExchange, REFERER, REQUEST_TIMEOUT_SECS, USER_AGENT};
use super::ApiError;
use crate::auth::{AuthError, AuthSession, CredentialResolver, Token, TokenCache, TokenExchange};
use crate::cache::ApiCallCache;
use crate::config::Config;

/// Memoization endpoint names
const WORKS_ENDPOINT: &str = "works";
const USERS_ENDPOINT: &str = "users";

/// Image sizes requested with work details
const IMAGE_SIZES: &str = "px_128x128,small,medium,large,px_480mw";

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

pub struct GalleryClient<E: TokenExchange = OAuthExchange> {
    http: Client,
    api_url: String,
    session: AuthSession<E>,
    memo: ApiCallCache<Value>,
}

impl GalleryClient<OAuthExchange> {
    /// Wire up backends, token exchange and session from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let client_config = config.require_client()?.clone();
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        let tokens = TokenCache::new(
            config.open_backend(config.token_backend)?,
            &config.token_domain,
        );
        let credentials = CredentialResolver::new(
            config.open_backend(config.credential_backend)?,
            config.credential_namespace.as_str(),
        );
        let exchange = OAuthExchange::with_client(http.clone(), client_config.clone());
        let session = AuthSession::new(
            config.display_name.as_str(),
            config.credential_host.as_str(),
            tokens,
            credentials,
            exchange,
        )
        .with_force_refresh_var(config.force_refresh_var.as_str());

        Ok(Self::new(http, client_config.api_url, session, config.memo_capacity))
    }
}

impl<E: TokenExchange> GalleryClient<E> {
    pub fn new(
        http: Client,
        api_url: impl Into<String>,
        session: AuthSession<E>,
        memo_capacity: usize,
    ) -> Self {
        Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            session,
            memo: ApiCallCache::new(memo_capacity),
        }
    }

    /// Run the login ladder now instead of on the first API call
    pub fn authenticate(&mut self) -> Result<&Token, AuthError> {
        self.session.ensure_authenticated()
    }

    /// Fetch details of one work (memoized)
    pub fn illust_info(&mut self, illust_id: u64) -> Result<Value> {
        let Self {
            http,
            api_url,
            session,
            memo,
        } = self;
        memo.call(WORKS_ENDPOINT, vec![illust_id.to_string()], || {
            trace!(illust_id, "calling works");
            let token = Self::bearer(session)?;
            let url = format!("{}/v1/works/{}.json", api_url, illust_id);
            let body = get_json(
                http,
                &url,
                &token,
                &[("image_sizes", IMAGE_SIZES), ("include_stats", "true")],
            )?;
            first_entity(body)
        })
    }

    /// Fetch a member's profile (memoized)
    pub fn member_info(&mut self, member_id: u64) -> Result<Value> {
        let Self {
            http,
            api_url,
            session,
            memo,
        } = self;
        memo.call(USERS_ENDPOINT, vec![member_id.to_string()], || {
            trace!(member_id, "calling users");
            let token = Self::bearer(session)?;
            let url = format!("{}/v1/users/{}.json", api_url, member_id);
            let body = get_json(
                http,
                &url,
                &token,
                &[
                    ("profile_image_sizes", "px_170x170,px_50x50"),
                    ("include_stats", "true"),
                    ("include_profile", "true"),
                ],
            )?;
            first_entity(body)
        })
    }

    /// Fetch one page of a member's works.
    ///
    /// Returns the whole response, including `pagination` and `count`; never
    /// memoized since the result depends on the page requested.
    pub fn member_works(&mut self, member_id: u64, page: u32, per_page: u32) -> Result<Value> {
        trace!(member_id, page, per_page, "calling users_works");
        let token = Self::bearer(&mut self.session)?;
        let url = format!("{}/v1/users/{}/works.json", self.api_url, member_id);
        let page = page.to_string();
        let per_page = per_page.to_string();
        let body = get_json(
            &self.http,
            &url,
            &token,
            &[
                ("page", page.as_str()),
                ("per_page", per_page.as_str()),
                ("image_sizes", IMAGE_SIZES),
                ("include_stats", "true"),
            ],
        )?;
        check_success(body)
    }

    /// Hit and miss counts of the lookup memo
    pub fn memo_stats(&self) -> (u64, u64) {
        self.memo.stats()
    }

    /// Access token for a request, authenticating first if needed
    fn bearer(session: &mut AuthSession<E>) -> Result<String, AuthError> {
        if let Some(token) = session.token() {
            return Ok(token.access_token.clone());
        }
        session
            .ensure_authenticated()
            .map(|token| token.access_token.clone())
    }
}

fn get_json(http: &Client, url: &str, token: &str, query: &[(&str, &str)]) -> Result<Value> {
    let mut retries = 0;
    let mut backoff_ms = INITIAL_BACKOFF_MS;

    loop {
        let response = http
            .get(url)
            .bearer_auth(token)
            .header(reqwest::header::REFERER, REFERER)
            .query(query)
            .send()
            .map_err(ApiError::NetworkError)?;

        let status = response.status();
        if status.is_success() {
            let text = response
                .text()
                .with_context(|| format!("Failed to read response body from {}", url))?;
            debug!(url, bytes = text.len(), "response received");
            return serde_json::from_str(&text)
                .map_err(|e| ApiError::InvalidResponse(e.to_string()).into());
        }

        if status.as_u16() == 429 {
            retries += 1;
            if retries > MAX_RATE_LIMIT_RETRIES {
                return Err(ApiError::RateLimited.into());
            }
            warn!(url, retry = retries, backoff_ms, "Rate limited, backing off");
            std::thread::sleep(Duration::from_millis(backoff_ms));
            backoff_ms *= 2; // Exponential backoff
            continue;
        }

        let body = response.text().unwrap_or_default();
        return Err(ApiError::from_status(status, &body).into());
    }
}

/// The public API wraps every payload in `{"status": "success", ...}`
fn check_success(body: Value) -> Result<Value> {
    if body.get("status").and_then(Value::as_str) == Some("success") {
        Ok(body)
    } else {
        Err(ApiError::CallFailed(ApiError::truncate_body(&body.to_string())).into())
    }
}

fn first_entity(body: Value) -> Result<Value> {
    let mut body = check_success(body)?;
    match body.get_mut("response").and_then(Value::as_array_mut) {
        Some(items) if !items.is_empty() => Ok(items.swap_remove(0)),
        _ => Err(ApiError::InvalidResponse("empty response list".to_string()).into()),
    }
}
