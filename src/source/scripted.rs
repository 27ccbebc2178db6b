//! Deterministic source for exercising sessions in tests.
//!
//! Pages are addressed by cursors `page-0`, `page-1`, ...; the first page has
//! no cursor. Interruptions are keyed by the 1-based fetch number.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::error::{AppError, Result};
use crate::models::Item;
use crate::source::{ContentSource, FetchOutcome, Page};

#[derive(Debug, Clone, Copy)]
pub(crate) enum Interruption {
    Blocked,
    Unexpected,
    NotFound,
    Fail,
}

#[derive(Default)]
pub(crate) struct ScriptedSource {
    pages: Vec<Vec<Item>>,
    interruptions: Mutex<HashMap<usize, Interruption>>,
    requested: Mutex<Vec<Option<String>>>,
}

impl ScriptedSource {
    pub(crate) fn new(pages: Vec<Vec<Item>>) -> Self {
        Self {
            pages,
            ..Self::default()
        }
    }

    /// Interrupt the given fetch (1-based) instead of serving it.
    pub(crate) fn interrupt(self, fetch_number: usize, interruption: Interruption) -> Self {
        self.interruptions
            .lock()
            .unwrap()
            .insert(fetch_number, interruption);
        self
    }

    /// Cursors requested so far, in order.
    pub(crate) fn requested(&self) -> Vec<Option<String>> {
        self.requested.lock().unwrap().clone()
    }

    pub(crate) fn cursor(index: usize) -> String {
        format!("page-{index}")
    }
}

#[async_trait]
impl ContentSource for ScriptedSource {
    async fn fetch_page(&self, _query: &str, cursor: Option<&str>) -> Result<FetchOutcome> {
        let fetch_number = {
            let mut requested = self.requested.lock().unwrap();
            requested.push(cursor.map(str::to_string));
            requested.len()
        };

        if let Some(interruption) = self.interruptions.lock().unwrap().remove(&fetch_number) {
            return match interruption {
                Interruption::Blocked => Ok(FetchOutcome::TemporarilyBlocked("banned".into())),
                Interruption::Unexpected => Ok(FetchOutcome::UnexpectedResponse("junk".into())),
                Interruption::NotFound => Ok(FetchOutcome::NotFound("gone".into())),
                Interruption::Fail => Err(AppError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset",
                ))),
            };
        }

        let index = match cursor {
            None => 0,
            Some(c) => c
                .strip_prefix("page-")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| AppError::unexpected(format!("bad cursor {c}")))?,
        };

        let items = self.pages.get(index).cloned().unwrap_or_default();
        let next_cursor = (index + 1 < self.pages.len()).then(|| Self::cursor(index + 1));
        Ok(FetchOutcome::Page(Page { items, next_cursor }))
    }
}

/// Noon on the given day of March 2024.
pub(crate) fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, d, 12, 0, 0).unwrap()
}

/// An item the source delivered without a publication time.
pub(crate) fn undated(id: &str) -> Item {
    Item {
        id: id.to_string(),
        timestamp: None,
        payload: serde_json::Value::Null,
    }
}

/// Items `{prefix}-0..n` all stamped with `timestamp`.
pub(crate) fn items(prefix: &str, n: usize, timestamp: DateTime<Utc>) -> Vec<Item> {
    (0..n)
        .map(|i| Item {
            id: format!("{prefix}-{i}"),
            timestamp: Some(timestamp),
            payload: serde_json::json!({ "n": i }),
        })
        .collect()
}
