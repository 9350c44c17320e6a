//! Durable event record types for the mention harness.
//!
//! `Event` is the shape persisted in the `active` table; `HistoryEvent` is
//! the same shape archived into `history` once a row leaves circulation.
//! This crate also owns the one pair of pure conversions between the
//! platform's decimal-seconds timestamps and `chrono::DateTime<Utc>` — every
//! other crate in the workspace treats `occurred_at` as an opaque
//! `DateTime<Utc>` and never touches epoch arithmetic directly.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque identifier for a durable event row. Wrapping the surrogate key
/// keeps it from being accidentally interchanged with `attempts` or any
/// other bare integer at a call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub i64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single durable work item, as it lives in `active` (or immediately
/// after being claimed/completed).
///
/// See spec invariants I1–I6: at most one worker holds a claim at a time,
/// `attempts` only increases, a row lives in exactly one table, and
/// `claimed_at.len() == attempts` outside of a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub occurred_at: DateTime<Utc>,
    pub attempts: i32,
    pub visible_at: DateTime<Utc>,
    pub claimed_at: Vec<DateTime<Utc>>,
    pub kind: String,
    pub payload: Value,
}

impl Event {
    /// True once `attempts` has reached `max_attempts`; the processor may
    /// use this to choose a "giving up" message (spec.md §4.3.1 / §7).
    pub fn is_exhausted(&self, max_attempts: i32) -> bool {
        self.attempts >= max_attempts
    }
}

/// Archived copy of an `Event`, with the terminal disposition recorded.
///
/// `processed = true` means the event was completed by a processor;
/// `processed = false` means it was archived by `sweep` (exhaustion or
/// expiry, spec.md §7 kinds 3/4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub id: EventId,
    pub occurred_at: DateTime<Utc>,
    pub attempts: i32,
    pub visible_at: DateTime<Utc>,
    pub claimed_at: Vec<DateTime<Utc>>,
    pub kind: String,
    pub payload: Value,
    pub processed: bool,
}

/// Error returned by the timestamp bridge when the platform's epoch-seconds
/// representation can't be parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampError(pub String);

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid platform timestamp: {}", self.0)
    }
}

impl std::error::Error for TimestampError {}

/// Convert a platform timestamp — decimal seconds-since-epoch, as a string
/// (e.g. `"1700000000.123456"`) — into the database's absolute-time type.
///
/// This is one of the two places in the entire workspace that parses a raw
/// epoch value; everywhere else an `Event.occurred_at` is already a
/// `DateTime<Utc>`.
pub fn to_absolute_time(raw: &str) -> Result<DateTime<Utc>, TimestampError> {
    let seconds: f64 = raw
        .trim()
        .parse()
        .map_err(|_| TimestampError(raw.to_string()))?;
    from_epoch_seconds(seconds)
}

/// Same conversion, from an already-parsed numeric epoch-seconds value
/// (the platform may deliver either a JSON number or a JSON string).
pub fn from_epoch_seconds(seconds: f64) -> Result<DateTime<Utc>, TimestampError> {
    if !seconds.is_finite() {
        return Err(TimestampError(seconds.to_string()));
    }
    let whole_secs = seconds.trunc() as i64;
    let nanos = ((seconds.fract()) * 1_000_000_000f64).round() as u32;
    Utc.timestamp_opt(whole_secs, nanos)
        .single()
        .ok_or_else(|| TimestampError(seconds.to_string()))
}

/// Convert the database's absolute-time type back into the platform's
/// decimal-seconds representation, keeping microsecond precision. This is
/// applied only at history export (spec.md §9).
pub fn from_absolute_time(ts: DateTime<Utc>) -> String {
    let micros = ts.timestamp_subsec_micros();
    format!("{}.{:06}", ts.timestamp(), micros)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_fractional_seconds() {
        let raw = "1700000000.500000";
        let ts = to_absolute_time(raw).unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
        assert_eq!(ts.timestamp_subsec_micros(), 500_000);
        assert_eq!(from_absolute_time(ts), raw);
    }

    #[test]
    fn parses_integer_seconds() {
        let ts = to_absolute_time("1700000000").unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
        assert_eq!(ts.timestamp_subsec_micros(), 0);
    }

    #[test]
    fn rejects_garbage() {
        assert!(to_absolute_time("not-a-number").is_err());
    }

    #[test]
    fn rejects_non_finite_numeric_seconds() {
        assert!(from_epoch_seconds(f64::NAN).is_err());
        assert!(from_epoch_seconds(f64::INFINITY).is_err());
    }

    #[test]
    fn is_exhausted_reflects_max_attempts() {
        let event = Event {
            id: EventId(1),
            occurred_at: Utc::now(),
            attempts: 3,
            visible_at: Utc::now(),
            claimed_at: vec![],
            kind: "mention".to_string(),
            payload: serde_json::json!({}),
        };
        assert!(event.is_exhausted(3));
        assert!(!event.is_exhausted(4));
    }
}
