//! GitHub client: the single point of entry for every REST call the
//! collector makes.
//!
//! Calls never retry. Failures are logged here and surface to callers as a
//! sentinel (`None` / `Page::Failed`), so one unreachable endpoint only
//! costs the data behind it.

use std::time::Duration;

use reqwest::{header, Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};

pub mod types;

use types::Topics;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const PER_PAGE: u32 = 100;
const API_VERSION: &str = "2022-11-28";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("Failed to build HTTP client: {0}")]
    Build(reqwest::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate limit exhausted (resets at {reset})")]
    RateLimited { reset: String },

    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("No content")]
    NoContent,
}

/// Accept header sent with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Json,
    /// Stargazer listing with `starred_at` on every item.
    StarTimestamps,
}

impl MediaType {
    fn accept(self) -> &'static str {
        match self {
            MediaType::Json => "application/vnd.github+json",
            MediaType::StarTimestamps => "application/vnd.github.star+json",
        }
    }
}

/// One step of a paginated fetch.
#[derive(Debug)]
pub enum Page {
    Items {
        items: Vec<Value>,
        next: Option<String>,
    },
    /// Empty or non-list page: nothing more to read.
    Done,
    Failed,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    api_url: String,
    token: String,
}

impl GitHubClient {
    pub fn new(token: impl Into<String>, api_url: impl Into<String>) -> Result<Self, GitHubError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(GitHubError::Build)?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// Absolute URL for an API path such as `/orgs/acme/repos`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    /// Absolute URL below `/repos/{owner}/{name}`.
    pub fn repo_url(&self, owner: &str, name: &str, tail: &str) -> String {
        format!("{}/repos/{}/{}{}", self.api_url, owner, name, tail)
    }

    /// Single GET. Returns the parsed body on 200, `None` on anything else.
    pub async fn fetch_one(&self, url: &str) -> Option<Value> {
        match self.get_json(url, MediaType::Json).await {
            Ok((body, _)) => Some(body),
            Err(e) => {
                report(url, &e);
                None
            }
        }
    }

    /// Fetches one page of a list endpoint.
    pub async fn fetch_page(&self, url: &str, media: MediaType) -> Page {
        match self.get_json(url, media).await {
            Ok((Value::Array(items), next)) if !items.is_empty() => Page::Items { items, next },
            Ok((Value::Array(_), _)) => Page::Done,
            Ok((other, _)) => {
                warn!("Expected a list from {url}, got {}", json_kind(&other));
                Page::Done
            }
            Err(GitHubError::NoContent) => Page::Done,
            Err(e) => {
                report(url, &e);
                Page::Failed
            }
        }
    }

    pub async fn fetch_all_pages(&self, url: &str) -> Vec<Value> {
        self.fetch_all_pages_as(url, MediaType::Json).await
    }

    /// Follows `rel="next"` links until they run out, repeat the current
    /// page, a page is empty, or a request fails. Items keep API order; on failure the items gathered so
    /// far are returned.
    pub async fn fetch_all_pages_as(&self, url: &str, media: MediaType) -> Vec<Value> {
        let mut items = Vec::new();
        let mut next = Some(url.to_string());
        let mut pages = 0usize;

        while let Some(page_url) = next.take() {
            match self.fetch_page(&page_url, media).await {
                Page::Items {
                    items: page_items,
                    next: following,
                } => {
                    pages += 1;
                    items.extend(page_items);
                    next = following.filter(|link| {
                        let moves_on = *link != page_url;
                        if !moves_on {
                            warn!("Next link of {page_url} points back at itself; stopping");
                        }
                        moves_on
                    });
                }
                Page::Done => break,
                Page::Failed => {
                    if pages > 0 {
                        warn!(
                            "Pagination of {url} stopped after {pages} page(s); keeping {} item(s)",
                            items.len()
                        );
                    }
                    break;
                }
            }
        }

        debug!("Fetched {} item(s) from {url} in {pages} page(s)", items.len());
        items
    }

    /// True iff the repository's topic list contains `topic` exactly.
    pub async fn has_required_topic(&self, owner: &str, repo: &str, topic: &str) -> bool {
        let url = self.repo_url(owner, repo, "/topics");
        let Some(body) = self.fetch_one(&url).await else {
            warn!("Failed to fetch topics for '{owner}/{repo}'");
            return false;
        };

        match serde_json::from_value::<Topics>(body) {
            Ok(Topics { names: Some(names) }) => {
                debug!("Repository '{owner}/{repo}' topics: {names:?}");
                names.iter().any(|name| name == topic)
            }
            Ok(Topics { names: None }) => {
                warn!("Topics response for '{owner}/{repo}' has no 'names' field");
                false
            }
            Err(e) => {
                warn!("Unreadable topics response for '{owner}/{repo}': {e}");
                false
            }
        }
    }

    /// `GET /user`: succeeds only if the token is accepted.
    pub async fn authenticated_user(&self) -> Option<Value> {
        self.fetch_one(&self.url("/user")).await
    }

    async fn get_json(
        &self,
        url: &str,
        media: MediaType,
    ) -> Result<(Value, Option<String>), GitHubError> {
        let response = self.send(url, media).await?;
        let next = response
            .headers()
            .get(header::LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(next_link);
        let body = response.json::<Value>().await?;
        Ok((body, next))
    }

    async fn send(&self, url: &str, media: MediaType) -> Result<Response, GitHubError> {
        debug!("Fetching data from: {url}");

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .header(header::ACCEPT, media.accept())
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .await?;

        let status = response.status();
        debug!("Response status for {url}: {status}");

        match status {
            StatusCode::OK => Ok(response),
            StatusCode::NO_CONTENT => Err(GitHubError::NoContent),
            StatusCode::FORBIDDEN => {
                if header_value(&response, "x-ratelimit-remaining").as_deref() == Some("0") {
                    let reset = header_value(&response, "x-ratelimit-reset")
                        .unwrap_or_else(|| "unknown".to_string());
                    return Err(GitHubError::RateLimited { reset });
                }
                let body = response.text().await.unwrap_or_default();
                Err(GitHubError::Forbidden {
                    message: api_message(body),
                })
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(GitHubError::Api {
                    status: status.as_u16(),
                    message: api_message(body),
                })
            }
        }
    }
}

/// Extracts the `rel="next"` target from a `Link` header.
pub fn next_link(link: &str) -> Option<String> {
    // Format: <url>; rel="next", <url>; rel="last"
    link.split(',').find_map(|part| {
        let mut segments = part.split(';');
        let target = segments.next()?.trim();
        let is_next = segments.any(|param| {
            param
                .trim()
                .strip_prefix("rel=")
                .map(|rel| rel.trim_matches('"').split_whitespace().any(|r| r == "next"))
                .unwrap_or(false)
        });
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}

fn report(url: &str, err: &GitHubError) {
    match err {
        GitHubError::RateLimited { .. } => {
            warn!("Rate limit hit while fetching {url}: {err}")
        }
        GitHubError::Forbidden { .. } => {
            warn!("Access denied for {url} (rate limit or missing token scope): {err}")
        }
        GitHubError::NoContent => debug!("No content at {url}"),
        _ => error!("Error fetching data from {url}: {err}"),
    }
}

fn header_value(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// GitHub error bodies are `{"message": ...}`; fall back to the raw text.
fn api_message(body: String) -> String {
    serde_json::from_str::<ApiErrorBody>(&body)
        .map(|e| e.message)
        .unwrap_or(body)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
