//! Shared defaults.

use chrono::Months;

/// Civil timezone assumed for store timestamps that carry no offset.
pub const DEFAULT_STORE_TIMEZONE: &str = "America/Los_Angeles";

/// How far ahead an RRULE with neither UNTIL nor COUNT is assumed to run.
pub const DEFAULT_RECURRENCE_SPAN_MONTHS: u32 = 12;
pub const DEFAULT_RECURRENCE_SPAN: Months = Months::new(DEFAULT_RECURRENCE_SPAN_MONTHS);

/// Length given to timed events that have no usable end.
pub const DEFAULT_EVENT_DURATION_MINUTES: i64 = 60;

/// Per-source fetch deadline.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_PRODUCT_ID: &str = "-//calfeed//Calendar Feed//EN";
pub const DEFAULT_PRODUCT_DOMAIN: &str = "calfeed.local";
pub const DEFAULT_FILENAME: &str = "calendar.ics";

pub const USER_AGENT: &str = concat!(
    "calfeed/",
    env!("CARGO_PKG_VERSION"),
    " (+calendar feed aggregator)"
);

/// Preference entries with this prefix name an external source rather than a
/// store topic.
pub const EXTERNAL_SOURCE_PREFIX: &str = "major:";

pub const TIME_TBD_MARKER: &str = "[Time TBD]";

pub const CALENDAR_CONTENT_TYPE: &str = "text/calendar; charset=utf-8";
