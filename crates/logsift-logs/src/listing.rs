//! Date-hour windowed container listings.
//!
//! Log objects are named under `YYYY/MM/DD/HH/` prefixes, so a time window
//! maps directly onto a pair of listing markers.

use std::collections::HashSet;
use std::fmt;

use chrono::{Datelike, NaiveDateTime, Timelike};
use tracing::debug;

use logsift_store::ObjectStore;
use logsift_types::StoreError;

/// One hour of one day, as used in object name prefixes
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateHour {
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
}

impl DateHour {
    /// Parse the compact `YYYYMMDDHH` form
    ///
    /// Returns `None` for anything that is not ten digits naming a real
    /// calendar hour.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.len() != 10 || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let parsed = NaiveDateTime::parse_from_str(&format!("{raw}00"), "%Y%m%d%H%M").ok()?;
        Some(Self {
            year: parsed.year(),
            month: parsed.month(),
            day: parsed.day(),
            hour: parsed.hour(),
        })
    }

    /// Listing key for the start of this hour: `YYYY/MM/DD/HH`
    pub fn marker(&self) -> String {
        self.key(self.hour)
    }

    /// Listing key just past this hour
    ///
    /// Only the hour number is bumped, so hour 23 becomes `24`. That still
    /// sorts after every name of the day and before the next day.
    pub fn end_marker(&self) -> String {
        self.key(self.hour + 1)
    }

    fn key(&self, hour: u32) -> String {
        format!("{:04}/{:02}/{:02}/{:02}", self.year, self.month, self.day, hour)
    }
}

impl fmt::Display for DateHour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}{:02}{:02}{:02}",
            self.year, self.month, self.day, self.hour
        )
    }
}

/// Half-open `[start, end)` window over date-hour prefixed names
///
/// The end bound is the hour *after* the supplied end, so the last hour is
/// included. Either side may be open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ListingWindow {
    start: Option<DateHour>,
    end: Option<DateHour>,
}

impl ListingWindow {
    pub fn new(start: Option<DateHour>, end: Option<DateHour>) -> Self {
        Self { start, end }
    }

    /// Build a window from raw `YYYYMMDDHH` strings
    ///
    /// A bound that does not parse is left open instead of failing.
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Self {
        Self::new(
            start.and_then(|raw| parse_bound("start", raw)),
            end.and_then(|raw| parse_bound("end", raw)),
        )
    }

    /// Inclusive listing marker
    pub fn start_marker(&self) -> Option<String> {
        self.start.map(|s| s.marker())
    }

    /// Exclusive listing end marker
    pub fn end_marker(&self) -> Option<String> {
        self.end.map(|e| e.end_marker())
    }
}

fn parse_bound(which: &str, raw: &str) -> Option<DateHour> {
    let parsed = DateHour::parse(raw);
    if parsed.is_none() {
        debug!(bound = which, value = raw, "ignoring malformed date, window left open");
    }
    parsed
}

/// List a container, keeping names inside the date window and outside `exclusions`
///
/// Listing order is preserved. Malformed dates only widen the window; store
/// failures are returned unchanged.
pub async fn container_listing<S: ObjectStore + ?Sized>(
    store: &S,
    account: &str,
    container: &str,
    start: Option<&str>,
    end: Option<&str>,
    exclusions: &HashSet<String>,
) -> Result<Vec<String>, StoreError> {
    let window = ListingWindow::parse(start, end);
    let marker = window.start_marker();
    let end_marker = window.end_marker();

    debug!(
        account,
        container,
        marker = marker.as_deref().unwrap_or(""),
        end_marker = end_marker.as_deref().unwrap_or(""),
        "listing container"
    );

    let listing = store
        .list(account, container, marker.as_deref(), end_marker.as_deref())
        .await?;

    let total = listing.len();
    let names: Vec<String> = listing
        .into_iter()
        .map(|entry| entry.name)
        .filter(|name| !exclusions.contains(name))
        .collect();

    debug!(
        account,
        container,
        listed = total,
        excluded = total - names.len(),
        "container listing filtered"
    );

    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use logsift_store::MemoryStore;

    fn store_with(names: &[&str]) -> MemoryStore {
        let store = MemoryStore::new();
        store.create_container("acct", "logs");
        for name in names {
            store.put("acct", "logs", name, "x\n");
        }
        store
    }

    #[test]
    fn test_parse_date_hour() {
        let parsed = DateHour::parse("2020010105").unwrap();
        assert_eq!(parsed.marker(), "2020/01/01/05");
        assert_eq!(parsed.end_marker(), "2020/01/01/06");
        assert_eq!(parsed.to_string(), "2020010105");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for raw in ["", "2020", "20200101", "202001010", "20200101000", "2020013100x"] {
            assert!(DateHour::parse(raw).is_none(), "{raw}");
        }
        // Not real calendar hours
        assert!(DateHour::parse("2020023100").is_none());
        assert!(DateHour::parse("2020010124").is_none());
        assert!(DateHour::parse("2020130100").is_none());
    }

    #[test]
    fn test_last_hour_end_marker_stays_within_day() {
        let parsed = DateHour::parse("2020010123").unwrap();
        assert_eq!(parsed.end_marker(), "2020/01/01/24");

        let end = ListingWindow::new(None, Some(parsed)).end_marker().unwrap();
        assert!("2020/01/01/23/late.gz" < end.as_str());
        assert!("2020/01/02/00/early.gz" > end.as_str());
    }

    #[test]
    fn test_malformed_bounds_leave_window_open() {
        let window = ListingWindow::parse(Some("garbage"), Some("2020010105"));
        assert_eq!(window.start_marker(), None);
        assert_eq!(window.end_marker().as_deref(), Some("2020/01/01/06"));

        let window = ListingWindow::parse(Some("bad"), Some("worse"));
        assert_eq!(window, ListingWindow::default());
    }

    #[tokio::test]
    async fn test_window_includes_last_hour() {
        let store = store_with(&[
            "2020/01/01/00/a.gz",
            "2020/01/01/04/a.gz",
            "2020/01/01/06/a.gz",
            "2020/01/01/12/a.gz",
        ]);

        let names = container_listing(
            &store,
            "acct",
            "logs",
            Some("2020010100"),
            Some("2020010105"),
            &HashSet::new(),
        )
        .await
        .unwrap();
        assert_eq!(names, vec!["2020/01/01/00/a.gz", "2020/01/01/04/a.gz"]);
    }

    #[tokio::test]
    async fn test_exclusions_preserve_order() {
        let store = store_with(&["X", "Y", "Z"]);
        let exclusions: HashSet<String> = ["X".to_string()].into_iter().collect();

        let names = container_listing(&store, "acct", "logs", None, None, &exclusions)
            .await
            .unwrap();
        assert_eq!(names, vec!["Y", "Z"]);
    }

    #[tokio::test]
    async fn test_malformed_start_lists_from_beginning() {
        let store = store_with(&["2019/12/31/23/a.gz", "2020/01/01/00/a.gz"]);

        let names = container_listing(
            &store,
            "acct",
            "logs",
            Some("not-a-date"),
            Some("2020010100"),
            &HashSet::new(),
        )
        .await
        .unwrap();
        assert_eq!(names, vec!["2019/12/31/23/a.gz", "2020/01/01/00/a.gz"]);
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let store = MemoryStore::new();
        let err = container_listing(&store, "acct", "missing", None, None, &HashSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ContainerNotFound { .. }));
    }
}
