//! GitHub fetch collaborator.
//!
//! Owns all request construction and response parsing for the GraphQL
//! API, and maps failures onto the three-way taxonomy the poller
//! branches on (client / server / rate-limited).

mod graphql;
pub mod triage;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error, warn};

use crate::error::FetchError;
use crate::types::FetchedPr;

const GITHUB_GRAPHQL_URL: &str = "https://api.github.com/graphql";

/// Format of the `Github-Authentication-Token-Expiration` header.
const TOKEN_EXPIRATION_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Remote source of pull requests involving a user.
#[async_trait]
pub trait PrSource: Send + Sync {
    /// Fetch all open PRs involving `username`, with their review
    /// threads still attached for classification.
    async fn fetch_prs(
        &self,
        token: &SecretString,
        username: &str,
    ) -> Result<Vec<FetchedPr>, FetchError>;

    /// Resolve the login belonging to a token.
    async fn viewer_login(&self, token: &SecretString) -> Result<String, FetchError>;
}

/// `PrSource` backed by the GitHub GraphQL API.
pub struct GithubClient {
    http: reqwest::Client,
    endpoint: String,
}

impl GithubClient {
    pub fn new() -> Self {
        Self::with_endpoint(GITHUB_GRAPHQL_URL)
    }

    /// Point the client at a different GraphQL endpoint (GitHub
    /// Enterprise, or a local stub in tests).
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .user_agent(concat!("prowl/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("reqwest client configuration is static");
        Self { http, endpoint: endpoint.into() }
    }

    async fn graphql_request(
        &self,
        query: &str,
        token: &SecretString,
    ) -> Result<String, FetchError> {
        let payload = serde_json::json!({ "query": query });

        debug!("querying github api");
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(token.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| FetchError::Server(format!("could not request github: {e}")))?;

        let status = response.status();
        let headers = response.headers().clone();

        if let Some(expiration) = headers
            .get("github-authentication-token-expiration")
            .and_then(|v| v.to_str().ok())
        {
            check_token_expiration(expiration);
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Server(format!("could not read github response: {e}")))?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited { until: unblock_time(&headers, Utc::now()) });
        }
        if status.is_server_error() {
            warn!(status = status.as_u16(), body = %body, "github server error");
            return Err(FetchError::Server(format!("github response code {status}")));
        }
        if status.is_client_error() {
            warn!(status = status.as_u16(), body = %body, "github client error");
            return Err(FetchError::Client(format!("github response code {status}")));
        }

        // GraphQL reports errors with HTTP 200; rate limits in
        // particular only show up in the body:
        // {"errors":[{"type":"RATE_LIMITED","message":"API rate limit exceeded for user ID ..."}]}
        let error_body: graphql::GraphQlErrors = serde_json::from_str(&body)
            .map_err(|e| FetchError::Client(format!("github response is not json: {e}")))?;
        for e in &error_body.errors {
            if e.kind == "RATE_LIMITED" {
                error!(message = %e.message, "github rate limited");
                return Err(FetchError::RateLimited { until: unblock_time(&headers, Utc::now()) });
            }
        }

        Ok(body)
    }
}

impl Default for GithubClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PrSource for GithubClient {
    async fn fetch_prs(
        &self,
        token: &SecretString,
        username: &str,
    ) -> Result<Vec<FetchedPr>, FetchError> {
        let body = self
            .graphql_request(&graphql::search_prs_query(username), token)
            .await?;
        let fetched = graphql::parse_search_response(&body)?;
        debug!(prs = fetched.len(), "fetched prs");
        Ok(fetched)
    }

    async fn viewer_login(&self, token: &SecretString) -> Result<String, FetchError> {
        let body = self.graphql_request(graphql::viewer_query(), token).await?;
        graphql::parse_viewer_response(&body)
    }
}

/// When requests may resume: `x-ratelimit-reset` (epoch seconds), then
/// `retry-after` (delta seconds), else one minute from now.
fn unblock_time(headers: &HeaderMap, now: DateTime<Utc>) -> DateTime<Utc> {
    if let Some(reset) = headers
        .get("x-ratelimit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
    {
        if reset > now {
            return reset;
        }
    }

    if let Some(secs) = headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
    {
        return now + Duration::seconds(secs);
    }

    now + Duration::seconds(60)
}

fn check_token_expiration(expiration: &str) {
    match DateTime::parse_from_str(expiration, TOKEN_EXPIRATION_FORMAT) {
        Ok(expires) => {
            let expires = expires.to_utc();
            if expires < Utc::now() + Duration::days(10) {
                let days_left = (expires - Utc::now()).num_days();
                warn!(expires = %expires, days_left, "github token expires soon");
            }
        }
        Err(err) => {
            error!(%err, expiration, "could not parse github token expiration");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(
                reqwest::header::HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        map
    }

    #[test]
    fn unblock_time_prefers_the_reset_header() {
        let now = Utc::now();
        let reset = now + Duration::seconds(900);
        let h = headers(&[
            ("x-ratelimit-reset", &reset.timestamp().to_string()),
            ("retry-after", "30"),
        ]);
        assert_eq!(unblock_time(&h, now).timestamp(), reset.timestamp());
    }

    #[test]
    fn unblock_time_falls_back_to_retry_after() {
        let now = Utc::now();
        let h = headers(&[("retry-after", "120")]);
        assert_eq!(unblock_time(&h, now), now + Duration::seconds(120));
    }

    #[test]
    fn unblock_time_defaults_to_a_minute() {
        let now = Utc::now();
        assert_eq!(unblock_time(&HeaderMap::new(), now), now + Duration::seconds(60));
    }

    #[test]
    fn stale_reset_header_is_ignored() {
        let now = Utc::now();
        let h = headers(&[("x-ratelimit-reset", "1")]);
        assert_eq!(unblock_time(&h, now), now + Duration::seconds(60));
    }
}
