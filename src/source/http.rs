// src/source/http.rs

//! JSON feed adapter over HTTP.
//!
//! Expects each page as `{"items": [...], "next": "<url>" | null}` where each
//! item carries an `id` and usually a `timestamp` (RFC 3339 string or unix
//! seconds). Items without an id are dropped; a missing or unreadable
//! timestamp is left empty. The whole item object is kept as the payload.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Item, SourceConfig};
use crate::source::{ContentSource, FetchOutcome, Page};

#[derive(Debug, Deserialize)]
struct FeedPage {
    #[serde(default)]
    items: Vec<serde_json::Value>,
    #[serde(default)]
    next: Option<String>,
}

pub struct HttpFeedSource {
    client: Client,
    base_url: Url,
}

impl HttpFeedSource {
    /// Build a client with the configured user agent, timeout and session cookie.
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = &config.session_cookie {
            let value = HeaderValue::from_str(cookie)
                .map_err(|e| AppError::config(format!("invalid session cookie: {e}")))?;
            headers.insert(COOKIE, value);
        }

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: Url::parse(&config.base_url)?,
        })
    }

    /// URL of the first page for a query.
    fn first_page_url(&self, query: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::config(format!("base url {} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .push(query);
        Ok(url)
    }
}

#[async_trait]
impl ContentSource for HttpFeedSource {
    async fn fetch_page(&self, query: &str, cursor: Option<&str>) -> Result<FetchOutcome> {
        let url = match cursor {
            Some(cursor) => Url::parse(cursor)?,
            None => self.first_page_url(query)?,
        };

        let response = self.client.get(url.clone()).send().await?;
        if let Some(signal) = classify_status(response.status(), &url) {
            return Ok(signal);
        }

        let body = response.bytes().await?;
        Ok(parse_page(&body))
    }
}

/// Map a non-success status onto a fetch signal; `None` means read the body.
fn classify_status(status: StatusCode, url: &Url) -> Option<FetchOutcome> {
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => {
            Some(FetchOutcome::NotFound(format!("{status} for {url}")))
        }
        StatusCode::TOO_MANY_REQUESTS | StatusCode::FORBIDDEN => {
            Some(FetchOutcome::TemporarilyBlocked(format!("{status} for {url}")))
        }
        s if s.is_success() => None,
        s => Some(FetchOutcome::UnexpectedResponse(format!("{s} for {url}"))),
    }
}

fn parse_page(body: &[u8]) -> FetchOutcome {
    let feed: FeedPage = match serde_json::from_slice(body) {
        Ok(feed) => feed,
        Err(e) => return FetchOutcome::UnexpectedResponse(format!("undecodable page: {e}")),
    };

    let mut items = Vec::with_capacity(feed.items.len());
    for raw in feed.items {
        match parse_item(raw) {
            Some(item) => items.push(item),
            None => log::warn!("Skipping feed item without a usable id"),
        }
    }

    FetchOutcome::Page(Page {
        items,
        next_cursor: feed.next.filter(|n| !n.trim().is_empty()),
    })
}

fn parse_item(raw: serde_json::Value) -> Option<Item> {
    let id = match raw.get("id")? {
        serde_json::Value::String(s) if !s.is_empty() => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let timestamp = raw.get("timestamp").and_then(parse_timestamp);
    if timestamp.is_none() {
        log::debug!("Feed item {} has no usable timestamp", id);
    }

    Some(Item {
        id,
        timestamp,
        payload: raw,
    })
}

fn parse_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|ts| ts.with_timezone(&Utc)),
        serde_json::Value::Number(n) => DateTime::<Utc>::from_timestamp(n.as_i64()?, 0),
        _ => None,
    }
}
