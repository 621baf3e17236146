//! RRULE interpretation.
//!
//! Only the practical subset is understood: FREQ plus an end given either as
//! UNTIL or as COUNT. COUNT is turned into an end instant by stepping from the
//! interpretation time, so downstream code only ever sees `{frequency, until}`.
//! Other parts (BYDAY, INTERVAL, ...) are ignored.

use chrono::{DateTime, Months, Utc};

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::event::{Frequency, Recurrence};
use crate::time::parse_feed_timestamp;

/// Interpret an RRULE value such as `FREQ=WEEKLY;COUNT=4`.
///
/// `now` is the reference instant for COUNT and for the open-ended default,
/// which runs `default_span` past `now`. Returns `None` when FREQ is missing or
/// unsupported.
pub fn parse_recurrence(
    rule: &str,
    now: DateTime<Utc>,
    default_span: Months,
    sink: &dyn DiagnosticSink,
) -> Option<Recurrence> {
    let rule = rule.trim();
    let body = rule
        .strip_prefix("RRULE:")
        .or_else(|| rule.strip_prefix("rrule:"))
        .unwrap_or(rule);

    let mut freq = None;
    let mut until = None;
    let mut count = None;

    for part in body.split(';') {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_uppercase().as_str() {
            "FREQ" => freq = Some(value.trim()),
            "UNTIL" => until = Some(value.trim()),
            "COUNT" => count = Some(value.trim()),
            _ => {}
        }
    }

    let Some(frequency) = freq.and_then(|f| f.parse::<Frequency>().ok()) else {
        sink.report(Diagnostic::UnsupportedFrequency {
            rule: rule.to_string(),
        });
        return None;
    };

    let until = until
        .and_then(|value| until_instant(value, sink))
        .or_else(|| count.and_then(|value| count_instant(frequency, value, now, sink)))
        .unwrap_or_else(|| default_until(now, default_span));

    Some(Recurrence { frequency, until })
}

fn until_instant(value: &str, sink: &dyn DiagnosticSink) -> Option<DateTime<Utc>> {
    match parse_feed_timestamp(value, None) {
        Ok(instant) => Some(instant),
        Err(_) => {
            sink.report(Diagnostic::InvalidRecurrencePart {
                part: "UNTIL".to_string(),
                value: value.to_string(),
            });
            None
        }
    }
}

fn count_instant(
    frequency: Frequency,
    value: &str,
    now: DateTime<Utc>,
    sink: &dyn DiagnosticSink,
) -> Option<DateTime<Utc>> {
    let stepped = value
        .parse::<u32>()
        .ok()
        .and_then(|count| frequency.advance(now, count));
    if stepped.is_none() {
        sink.report(Diagnostic::InvalidRecurrencePart {
            part: "COUNT".to_string(),
            value: value.to_string(),
        });
    }
    stepped
}

/// End used for rules with neither UNTIL nor COUNT.
pub fn default_until(now: DateTime<Utc>, span: Months) -> DateTime<Utc> {
    now.checked_add_months(span).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
