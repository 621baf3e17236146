//! Timestamp normalization.
//!
//! Converts the two timestamp dialects the pipeline sees into UTC instants:
//!
//! - Feed values: `YYYYMMDD` or `YYYYMMDDTHHMMSS[Z]`, optionally with a TZID.
//! - Store values: ISO-ish text (`2025-03-10 14:00:00`, `...Z`, `...-07:00`).
//!
//! Unknown timezones never fail a conversion; they resolve to UTC.

use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use thiserror::Error;

/// Why a feed timestamp could not be read. Callers treat the field as absent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    #[error("'{0}' is neither YYYYMMDD nor YYYYMMDDTHHMMSS[Z]")]
    UnrecognizedShape(String),

    #[error("'{0}' is not a valid calendar date or time")]
    OutOfRange(String),
}

/// Parse a compact feed timestamp.
///
/// - `YYYYMMDD` is midnight UTC of that date.
/// - `YYYYMMDDTHHMMSSZ` (or any 16-character form) is UTC; `tzid` is ignored.
/// - `YYYYMMDDTHHMMSS` is wall-clock time in `tzid` when given, UTC otherwise.
pub fn parse_feed_timestamp(
    text: &str,
    tzid: Option<&str>,
) -> Result<DateTime<Utc>, TimestampError> {
    let text = text.trim();
    if !text.is_ascii() {
        return Err(TimestampError::UnrecognizedShape(text.to_string()));
    }

    if text.len() == 8 {
        return parse_compact_date(text).map(midnight_utc);
    }

    if !(text.len() == 15 || text.len() == 16) || text.as_bytes()[8] != b'T' {
        return Err(TimestampError::UnrecognizedShape(text.to_string()));
    }

    let date = parse_compact_date(&text[..8])?;
    let time_digits = &text[9..15];
    if !time_digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TimestampError::UnrecognizedShape(text.to_string()));
    }
    let time = NaiveTime::parse_from_str(time_digits, "%H%M%S")
        .map_err(|_| TimestampError::OutOfRange(text.to_string()))?;
    let wall_clock = NaiveDateTime::new(date, time);

    if text.len() == 16 {
        return Ok(wall_clock.and_utc());
    }

    match tzid {
        Some(tzid) => Ok(wall_clock_to_utc(wall_clock, tzid)),
        None => Ok(wall_clock.and_utc()),
    }
}

/// Parse an 8-digit `YYYYMMDD` date.
pub fn parse_compact_date(text: &str) -> Result<NaiveDate, TimestampError> {
    let text = text.trim();
    if text.len() != 8 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TimestampError::UnrecognizedShape(text.to_string()));
    }
    NaiveDate::parse_from_str(text, "%Y%m%d")
        .map_err(|_| TimestampError::OutOfRange(text.to_string()))
}

/// True for a bare `YYYYMMDD` value.
pub fn is_compact_date(text: &str) -> bool {
    let text = text.trim();
    text.len() == 8 && text.bytes().all(|b| b.is_ascii_digit())
}

/// UTC offset of `tzid` at `at`, in minutes (negative west of Greenwich).
///
/// Computed as the difference between the civil clock reading in the zone and
/// the UTC clock reading of the same instant. Unresolvable zones yield 0.
pub fn timezone_offset_minutes(tzid: &str, at: DateTime<Utc>) -> i64 {
    match resolve_timezone(tzid) {
        Some(tz) => offset_minutes(tz, at),
        None => {
            tracing::debug!(tzid, "Unresolved timezone, using UTC offset");
            0
        }
    }
}

fn offset_minutes(tz: Tz, at: DateTime<Utc>) -> i64 {
    let civil = at.with_timezone(&tz).naive_local();
    (civil - at.naive_utc()).num_minutes()
}

/// Resolve a TZID as found in the wild to an IANA zone.
pub fn resolve_timezone(tzid: &str) -> Option<Tz> {
    let normalized = normalize_tzid(tzid);
    Tz::from_str(normalized).ok().or_else(|| {
        windows_zone_name(normalized).and_then(|iana| Tz::from_str(iana).ok())
    })
}

fn normalize_tzid(tzid: &str) -> &str {
    let unquoted = tzid.trim().trim_matches('"');
    unquoted
        .strip_prefix("/mozilla.org/20050126_1/")
        .or_else(|| unquoted.strip_prefix("/mozilla.org/"))
        .or_else(|| unquoted.strip_prefix("/softwarestudio.org/Olson_20011030_5/"))
        .or_else(|| unquoted.strip_prefix("/softwarestudio.org/"))
        .unwrap_or(unquoted)
}

/// The Windows names Outlook-generated feeds commonly put in TZID.
fn windows_zone_name(name: &str) -> Option<&'static str> {
    match name {
        "Pacific Standard Time" => Some("America/Los_Angeles"),
        "Mountain Standard Time" => Some("America/Denver"),
        "US Mountain Standard Time" => Some("America/Phoenix"),
        "Central Standard Time" => Some("America/Chicago"),
        "Eastern Standard Time" => Some("America/New_York"),
        "Alaskan Standard Time" => Some("America/Anchorage"),
        "Hawaiian Standard Time" => Some("Pacific/Honolulu"),
        "GMT Standard Time" => Some("Europe/London"),
        "UTC" | "Coordinated Universal Time" => Some("UTC"),
        _ => None,
    }
}

/// Interpret a wall-clock reading as civil time in `tzid`.
///
/// The offset is looked up once, at the instant the wall-clock digits would
/// denote in UTC. Readings within a few hours of a DST switch may land an hour
/// off; published campus feeds do not schedule events there.
fn wall_clock_to_utc(wall_clock: NaiveDateTime, tzid: &str) -> DateTime<Utc> {
    let guess = wall_clock.and_utc();
    guess - Duration::minutes(timezone_offset_minutes(tzid, guess))
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Parse a timestamp as stored by the event store.
///
/// Values with a `Z` suffix or a numeric offset are taken as written. Values
/// without either are passed to [`assume_store_timezone`]. Returns `None` for
/// blank or unreadable text.
pub fn parse_store_timestamp(text: &str, store_tz: Tz) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    // Accept both "2025-03-10 14:00:00" and "2025-03-10T14:00:00"
    let normalized = match text.as_bytes().get(10) {
        Some(b' ') => format!("{}T{}", &text[..10], &text[11..]),
        _ => text.to_string(),
    };

    if let Some(instant) = parse_with_offset(&normalized) {
        return Some(instant);
    }

    parse_naive(&normalized).map(|naive| assume_store_timezone(naive, store_tz))
}

fn parse_with_offset(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    // Postgres-style short offsets ("+00", "-0700") and missing seconds
    ["%Y-%m-%dT%H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M%#z"]
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(text, fmt).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            let naive = text.strip_suffix('Z').or_else(|| text.strip_suffix('z'))?;
            parse_naive(naive).map(|n| n.and_utc())
        })
}

fn parse_naive(text: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}

/// Treat a timezone-naive store timestamp as civil time in `store_tz`.
///
/// The backing store persists naive local timestamps written by a single
/// campus deployment. This assumption is specific to that store and does not
/// apply to feed data.
pub fn assume_store_timezone(naive: NaiveDateTime, store_tz: Tz) -> DateTime<Utc> {
    let guess = naive.and_utc();
    guess - Duration::minutes(offset_minutes(store_tz, guess))
}
