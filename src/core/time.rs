//! Shared date/timestamp helpers.
//!
//! Documents carry calendar dates (`YYYY-MM-DD`, UTC); audit events carry
//! epoch-second timestamps and ULID event ids.

use chrono::{NaiveDate, Utc};
use ulid::Ulid;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Today's date in UTC as `YYYY-MM-DD`.
pub fn today() -> String {
    Utc::now().date_naive().format(DATE_FORMAT).to_string()
}

/// Returns unix-epoch seconds with `Z` suffix (e.g. `1771220592Z`).
pub fn now_epoch_z() -> String {
    format!("{}Z", Utc::now().timestamp())
}

pub fn new_event_id() -> String {
    Ulid::new().to_string()
}

/// Parse a leading `YYYY-MM-DD` date, ignoring any time suffix.
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    let trimmed = input.trim();
    let head = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(head, DATE_FORMAT).ok()
}

/// Whole days elapsed from `from` until today (negative for future dates).
pub fn days_since(from: NaiveDate) -> i64 {
    (Utc::now().date_naive() - from).num_days()
}
