// src/source/mod.rs

//! Content source abstraction.
//!
//! A source is walked one page at a time. Every fetch resolves to a
//! [`FetchOutcome`]; an `Err` from [`ContentSource::fetch_page`] is an
//! unclassified failure.

pub mod http;
#[cfg(test)]
pub(crate) mod scripted;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Item;

pub use http::HttpFeedSource;

/// One page of the item stream.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page {
    pub items: Vec<Item>,

    /// Cursor of the following page; `None` at the end of the stream
    pub next_cursor: Option<String>,
}

/// Result of a single fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Page(Page),
    /// The target no longer exists.
    NotFound(String),
    /// The source refuses service for now; retry later at the same cursor.
    TemporarilyBlocked(String),
    /// Malformed or partial response; retry.
    UnexpectedResponse(String),
}

#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch the page at `cursor`, or the first page of `query` when `cursor` is `None`.
    async fn fetch_page(&self, query: &str, cursor: Option<&str>) -> Result<FetchOutcome>;
}
