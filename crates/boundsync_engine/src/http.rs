//! HTTP response interpretation.
//!
//! This module turns raw HTTP responses into typed payloads or
//! [`SyncError`]s. The actual HTTP client is abstracted via a trait to allow
//! different implementations (reqwest, hyper, a scripted client in tests).

use crate::error::{SyncError, SyncResult, GENERIC_NETWORK_ERROR};
use async_trait::async_trait;
use boundsync_store::Cursor;
use parking_lot::RwLock;
use regex::Regex;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::LazyLock;
use tracing::debug;

/// Status codes considered successful.
pub const SUCCESS_RANGE: Range<u16> = 200..300;

static LINK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<([^>]*)>\s*;\s*rel="([a-zA-Z0-9]+)""#).unwrap());

static PAGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bpage=(\d+)").unwrap());

/// A response as received from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// Status code.
    pub status: u16,
    /// Response headers, in arrival order.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: String,
}

impl RawResponse {
    /// Creates a response without headers.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns the first header named `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns true if the status is inside [`SUCCESS_RANGE`].
    pub fn is_successful(&self) -> bool {
        SUCCESS_RANGE.contains(&self.status)
    }
}

/// Relations parsed from a `Link` header (`<url>; rel="next"`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Links(HashMap<String, String>);

impl Links {
    /// Parses a `Link` header value.
    pub fn parse(header: &str) -> Self {
        Self(
            LINK_PATTERN
                .captures_iter(header)
                .map(|caps| (caps[2].to_string(), caps[1].to_string()))
                .collect(),
        )
    }

    /// Returns the URL of relation `rel`.
    pub fn get(&self, rel: &str) -> Option<&str> {
        self.0.get(rel).map(String::as_str)
    }

    /// Returns the page number of the `next` relation as a cursor.
    pub fn next_page(&self) -> Option<Cursor> {
        let next = self.get("next")?;
        let caps = PAGE_PATTERN.captures(next)?;
        caps[1].parse::<u32>().ok().map(Cursor::page)
    }

    /// Returns true if no relation was parsed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A typed view of a [`RawResponse`].
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse<T> {
    /// Successful response with a body.
    Success {
        /// Decoded body.
        body: T,
        /// Relations from the `Link` header.
        links: Links,
    },
    /// Successful response without a body (e.g. 204).
    Empty,
    /// Response outside [`SUCCESS_RANGE`].
    Error {
        /// Status code.
        status: u16,
        /// Human-readable message.
        message: String,
    },
}

impl<T: DeserializeOwned> ApiResponse<T> {
    /// Interprets a raw response.
    ///
    /// For failures the message is the `"message"` field of a JSON body, else
    /// the body text, else a generic network-error message.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Decode`] if a successful body is not valid JSON
    /// for `T`.
    pub fn parse(raw: RawResponse) -> SyncResult<Self> {
        if !raw.is_successful() {
            return Ok(ApiResponse::Error {
                status: raw.status,
                message: error_message(&raw.body),
            });
        }

        if raw.status == 204 || raw.body.trim().is_empty() {
            return Ok(ApiResponse::Empty);
        }

        let links = raw.header("link").map(Links::parse).unwrap_or_default();
        let body = serde_json::from_str(&raw.body)
            .map_err(|e| SyncError::Decode(format!("failed to decode response: {}", e)))?;
        Ok(ApiResponse::Success { body, links })
    }
}

impl<T> ApiResponse<T> {
    /// Returns the cursor of the next page, if the response links one.
    pub fn next_page(&self) -> Option<Cursor> {
        match self {
            ApiResponse::Success { links, .. } => links.next_page(),
            _ => None,
        }
    }

    /// Converts into the body, mapping failures to [`SyncError::Application`].
    pub fn into_body(self) -> SyncResult<Option<T>> {
        match self {
            ApiResponse::Success { body, .. } => Ok(Some(body)),
            ApiResponse::Empty => Ok(None),
            ApiResponse::Error { status, message } => Err(SyncError::application(status, message)),
        }
    }
}

fn error_message(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return GENERIC_NETWORK_ERROR.to_string();
    }

    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(value) => match value.get("message").and_then(|m| m.as_str()) {
            Some(message) if !message.trim().is_empty() => message.to_string(),
            _ => trimmed.to_string(),
        },
        Err(_) => trimmed.to_string(),
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport. Connection
/// failures should be reported as [`SyncError::Transient`] or
/// [`SyncError::Timeout`] so that they are retried.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a GET request and returns the raw response.
    async fn get(&self, url: &str) -> SyncResult<RawResponse>;
}

/// A JSON API reached through an [`HttpClient`].
pub struct ApiClient<C: HttpClient> {
    /// Base URL of the API (e.g., "https://api.github.com").
    base_url: String,
    /// HTTP client implementation.
    client: C,
    /// Last error message.
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> ApiClient<C> {
    /// Creates a new API client.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the HTTP client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Fetches `path` and decodes the JSON body.
    ///
    /// # Errors
    ///
    /// Transport failures are passed through, non-success statuses become
    /// [`SyncError::Application`], and an empty body is a
    /// [`SyncError::Decode`].
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> SyncResult<T> {
        let (body, _) = self.get_with_links(path).await?;
        Ok(body)
    }

    /// Fetches one page of `path` and returns the body and the next cursor.
    ///
    /// `cursor` is appended as the `page` query parameter.
    pub async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        cursor: Option<&Cursor>,
    ) -> SyncResult<(T, Option<Cursor>)> {
        let path = match cursor {
            Some(cursor) => {
                let separator = if path.contains('?') { '&' } else { '?' };
                format!("{}{}page={}", path, separator, cursor)
            }
            None => path.to_string(),
        };
        let (body, links) = self.get_with_links(&path).await?;
        Ok((body, links.next_page()))
    }

    async fn get_with_links<T: DeserializeOwned>(&self, path: &str) -> SyncResult<(T, Links)> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        debug!(%url, "GET");

        let result = match self.client.get(&url).await {
            Ok(raw) => ApiResponse::parse(raw),
            Err(e) => Err(e),
        };

        let outcome = result.and_then(|response| match response {
            ApiResponse::Success { body, links } => Ok((body, links)),
            ApiResponse::Empty => Err(SyncError::Decode("empty response body".into())),
            ApiResponse::Error { status, message } => Err(SyncError::application(status, message)),
        });

        match &outcome {
            Ok(_) => *self.last_error.write() = None,
            Err(e) => *self.last_error.write() = Some(e.to_string()),
        }
        outcome
    }
}
