//! Remote page source
//!
//! [`PageSource`] is the seam between the engine and the network. The
//! production implementation, [`ScorecardClient`], talks to the College
//! Scorecard `schools` endpoint.

use crate::retry::FetchError;
use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

// ============================================================================
// API Client Constants
// ============================================================================

/// Default College Scorecard schools endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.data.gov/ed/collegescorecard/v1/schools";

/// Default per-request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default query parameter used for the optional filter
pub const DEFAULT_FILTER_FIELD: &str = "school.name";

/// Longest error body excerpt kept in a [`FetchError::Status`]
const MAX_ERROR_BODY_CHARS: usize = 200;

/// One page of raw records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageResult {
    pub records: Vec<Value>,
    /// `metadata.total` when the response carries it
    pub total: Option<u64>,
}

/// A paginated, read-only remote collection
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch logical page `page` (1-based) holding up to `page_size` records
    async fn fetch_page(&self, page: u32, page_size: u32) -> Result<PageResult, FetchError>;
}

#[derive(Debug, Deserialize)]
struct SchoolsResponse {
    #[serde(default)]
    metadata: Option<Metadata>,
    results: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    #[serde(default)]
    total: Option<u64>,
}

/// Fixed query applied to every page request
#[derive(Clone, Default)]
pub struct SchoolQuery {
    pub api_key: String,
    /// Comma-separated remote field paths
    pub fields: String,
    /// `(parameter, value)` narrowing the result set
    pub filter: Option<(String, String)>,
}

impl std::fmt::Debug for SchoolQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchoolQuery")
            .field("api_key", &"<redacted>")
            .field("fields", &self.fields)
            .field("filter", &self.filter)
            .finish()
    }
}

/// HTTP client for the College Scorecard API
#[derive(Debug)]
pub struct ScorecardClient {
    client: Client,
    endpoint: String,
    query: SchoolQuery,
    zero_based_pages: bool,
}

impl ScorecardClient {
    /// Create a new client for `endpoint`
    pub fn new(
        endpoint: impl Into<String>,
        query: SchoolQuery,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("scorecard-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            query,
            zero_based_pages: true,
        })
    }

    /// The Scorecard API numbers pages from zero; other deployments may not
    pub fn zero_based_pages(mut self, zero_based: bool) -> Self {
        self.zero_based_pages = zero_based;
        self
    }

    fn wire_page(&self, page: u32) -> u32 {
        if self.zero_based_pages {
            page.saturating_sub(1)
        } else {
            page
        }
    }

    fn query_params(&self, page: u32, page_size: u32) -> Vec<(String, String)> {
        let mut params = vec![
            ("api_key".to_string(), self.query.api_key.clone()),
            ("fields".to_string(), self.query.fields.clone()),
            ("page".to_string(), self.wire_page(page).to_string()),
            ("per_page".to_string(), page_size.to_string()),
        ];
        if let Some((field, value)) = &self.query.filter {
            params.push((field.clone(), value.clone()));
        }
        params
    }
}

#[async_trait]
impl PageSource for ScorecardClient {
    async fn fetch_page(&self, page: u32, page_size: u32) -> Result<PageResult, FetchError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&self.query_params(page, page_size))
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.without_url().to_string()))?;

        let response = check_status(response).await?;

        let body: SchoolsResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.without_url().to_string()))?;

        Ok(PageResult {
            records: body.results,
            total: body.metadata.and_then(|m| m.total),
        })
    }
}

async fn check_status(response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(FetchError::RateLimited {
            status: status.as_u16(),
            retry_after,
        });
    }

    let body = response.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("unknown status").to_string()
    } else {
        body.chars().take(MAX_ERROR_BODY_CHARS).collect()
    };

    Err(FetchError::Status {
        status: status.as_u16(),
        message,
    })
}
