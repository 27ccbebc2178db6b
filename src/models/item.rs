//! Harvested items, resume checkpoints and time windows.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A record emitted by the content source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Source-assigned identifier, unique within a job
    pub id: String,

    /// Publication time; some records carry none
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,

    /// Raw record as delivered by the source
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Durable pagination position for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub job_key: String,

    /// Opaque pagination token
    pub cursor: String,

    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(job_key: impl Into<String>, cursor: impl Into<String>) -> Self {
        Self {
            job_key: job_key.into(),
            cursor: cursor.into(),
            updated_at: Utc::now(),
        }
    }
}

/// Where an item falls relative to the harvest window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Newer than `end`
    TooNew,
    /// Inside `(start, end]`
    Inside,
    /// At or before `start`
    Stale,
}

/// The `(start, end]` time range of interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Build a window from optional calendar dates; open ends are unbounded.
    pub fn from_dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        let start = start
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let end = end
            .and_then(|d| d.and_hms_nano_opt(23, 59, 59, 999_999_999))
            .map(|dt| dt.and_utc())
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self { start, end }
    }

    pub fn place(&self, timestamp: DateTime<Utc>) -> Placement {
        if timestamp > self.end {
            Placement::TooNew
        } else if timestamp <= self.start {
            Placement::Stale
        } else {
            Placement::Inside
        }
    }
}

impl Window {
    /// Place an item; one without a timestamp is kept as inside the window.
    pub fn place_item(&self, item: &Item) -> Placement {
        item.timestamp
            .map_or(Placement::Inside, |timestamp| self.place(timestamp))
    }
}

impl Default for Window {
    fn default() -> Self {
        Self::from_dates(None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_window_boundaries() {
        let window = Window::new(at(10), at(20));
        assert_eq!(window.place(at(21)), Placement::TooNew);
        assert_eq!(window.place(at(20)), Placement::Inside);
        assert_eq!(window.place(at(15)), Placement::Inside);
        assert_eq!(window.place(at(10)), Placement::Stale);
        assert_eq!(window.place(at(1)), Placement::Stale);
    }

    #[test]
    fn test_window_from_dates_covers_whole_end_day() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 10);
        let end = NaiveDate::from_ymd_opt(2024, 3, 20);
        let window = Window::from_dates(start, end);
        assert_eq!(window.place(at(20)), Placement::Inside);
        assert_eq!(window.place(at(10)), Placement::Inside);
        assert_eq!(window.place(at(21)), Placement::TooNew);
    }

    #[test]
    fn test_open_window_accepts_everything() {
        let window = Window::default();
        assert_eq!(window.place(at(1)), Placement::Inside);
    }

    #[test]
    fn test_item_payload_defaults_to_null() {
        let item: Item =
            serde_json::from_str(r#"{"id":"p1","timestamp":"2024-03-15T12:00:00Z"}"#).unwrap();
        assert_eq!(item.id, "p1");
        assert_eq!(item.timestamp, Some(at(15)));
        assert!(item.payload.is_null());
    }

    #[test]
    fn test_item_without_timestamp_is_inside() {
        let item: Item = serde_json::from_str(r#"{"id":"p2","timestamp":null}"#).unwrap();
        assert!(item.timestamp.is_none());
        let window = Window::new(at(10), at(20));
        assert_eq!(window.place_item(&item), Placement::Inside);
    }
}
