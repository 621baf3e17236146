//! Calendar document generation.

use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, Utc, Weekday};

use crate::constants::{
    DEFAULT_EVENT_DURATION_MINUTES, DEFAULT_PRODUCT_DOMAIN, DEFAULT_PRODUCT_ID, TIME_TBD_MARKER,
};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::event::{Event, Frequency, Recurrence};
use crate::ics::text::escape_text;

/// Octet limit for a physical line before it is folded.
const FOLD_LIMIT: usize = 75;

/// Calendar-level settings for the generated document.
#[derive(Debug, Clone)]
pub struct CalendarMetadata {
    pub product_id: String,
    /// Appended to every event id to form the UID.
    pub domain: String,
    /// Emitted as X-WR-CALNAME when set.
    pub name: Option<String>,
    /// Length of timed events without a usable end.
    pub default_duration: Duration,
}

impl Default for CalendarMetadata {
    fn default() -> Self {
        CalendarMetadata {
            product_id: DEFAULT_PRODUCT_ID.to_string(),
            domain: DEFAULT_PRODUCT_DOMAIN.to_string(),
            name: None,
            default_duration: Duration::minutes(DEFAULT_EVENT_DURATION_MINUTES),
        }
    }
}

/// A generated document and the number of VEVENTs written into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCalendar {
    pub body: String,
    pub event_count: usize,
}

/// Render events, in the order given, as one VCALENDAR document.
///
/// Events with neither a start instant nor an all-day date are left out and
/// reported. Lines are CRLF-terminated and folded at 75 octets.
pub fn generate_feed(
    events: &[Event],
    generated_at: DateTime<Utc>,
    metadata: &CalendarMetadata,
    sink: &dyn DiagnosticSink,
) -> String {
    render_calendar(events, generated_at, metadata, sink).body
}

/// [`generate_feed`], also counting the events that made it into the body.
pub fn render_calendar(
    events: &[Event],
    generated_at: DateTime<Utc>,
    metadata: &CalendarMetadata,
    sink: &dyn DiagnosticSink,
) -> RenderedCalendar {
    let mut lines = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        format!("PRODID:{}", metadata.product_id),
        "CALSCALE:GREGORIAN".to_string(),
        "METHOD:PUBLISH".to_string(),
    ];

    if let Some(ref name) = metadata.name {
        lines.push(format!("X-WR-CALNAME:{}", escape_text(name)));
    }

    let mut event_count = 0;
    for event in events {
        match event_lines(event, generated_at, metadata) {
            Some(event_lines) => {
                lines.extend(event_lines);
                event_count += 1;
            }
            None => sink.report(Diagnostic::EventDropped {
                id: event.id.clone(),
            }),
        }
    }

    lines.push("END:VCALENDAR".to_string());

    let mut output = String::with_capacity(lines.iter().map(|l| l.len() + 2).sum());
    for line in &lines {
        push_folded(&mut output, line);
    }
    RenderedCalendar {
        body: output,
        event_count,
    }
}

fn event_lines(
    event: &Event,
    generated_at: DateTime<Utc>,
    metadata: &CalendarMetadata,
) -> Option<Vec<String>> {
    if !event.has_start() {
        return None;
    }

    let mut lines = vec![
        "BEGIN:VEVENT".to_string(),
        format!("UID:{}@{}", event.id, metadata.domain),
        format!("DTSTAMP:{}", format_utc(generated_at)),
    ];

    // An all-day date wins when there is no start or the time is still TBD
    let all_day_date = event
        .event_date
        .filter(|_| event.start.is_none() || event.time_tbd);

    let first_day = match (all_day_date, event.start) {
        (Some(date), _) => {
            let end = date.checked_add_days(Days::new(1))?;
            lines.push(format!("DTSTART;VALUE=DATE:{}", format_date(date)));
            lines.push(format!("DTEND;VALUE=DATE:{}", format_date(end)));
            date
        }
        (None, Some(start)) => {
            let end = event
                .end
                .filter(|end| *end > start)
                .unwrap_or(start + metadata.default_duration);
            lines.push(format!("DTSTART:{}", format_utc(start)));
            lines.push(format!("DTEND:{}", format_utc(end)));
            start.date_naive()
        }
        (None, None) => return None,
    };

    lines.push(format!("SUMMARY:{}", escape_text(&event.title)));

    if let Some(description) = description_with_marker(event) {
        lines.push(format!("DESCRIPTION:{}", escape_text(&description)));
    }

    if let Some(ref location) = event.location {
        lines.push(format!("LOCATION:{}", escape_text(location)));
    }

    if let Some(ref recurrence) = event.recurrence {
        lines.push(rrule_line(recurrence, first_day, all_day_date.is_some()));
    }

    lines.push("END:VEVENT".to_string());
    Some(lines)
}

/// The event description, with `[Time TBD]` appended to TBD events that do
/// not already say so.
fn description_with_marker(event: &Event) -> Option<String> {
    if !event.time_tbd {
        return event.description.clone();
    }
    match event.description {
        Some(ref description) if mentions_tbd(description) => Some(description.clone()),
        Some(ref description) => Some(format!("{description}\n\n{TIME_TBD_MARKER}")),
        None => Some(TIME_TBD_MARKER.to_string()),
    }
}

fn mentions_tbd(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("tbd") || lower.contains("to be determined")
}

/// `RRULE:FREQ=...;UNTIL=...[;BYDAY=..]`, with UNTIL pushed to the end of its
/// day so a date-only boundary still includes that day's occurrence.
fn rrule_line(recurrence: &Recurrence, first_day: NaiveDate, all_day: bool) -> String {
    let until_day = recurrence.until.date_naive();
    let until = if all_day {
        // Value type must match a DATE-valued DTSTART
        format_date(until_day)
    } else {
        let end_of_day = until_day
            .and_hms_milli_opt(23, 59, 59, 999)
            .map(|naive| naive.and_utc())
            .unwrap_or(recurrence.until);
        format_utc(end_of_day)
    };

    let mut rule = format!(
        "RRULE:FREQ={};UNTIL={until}",
        recurrence.frequency.as_ics_str()
    );
    if recurrence.frequency == Frequency::Weekly {
        rule.push_str(";BYDAY=");
        rule.push_str(weekday_code(first_day.weekday()));
    }
    rule
}

fn weekday_code(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

fn format_utc(instant: DateTime<Utc>) -> String {
    instant.format("%Y%m%dT%H%M%SZ").to_string()
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Append `line` with CRLF, folding so no physical line exceeds 75 octets.
/// Folds only fall on character boundaries.
fn push_folded(output: &mut String, line: &str) {
    let mut width = 0;
    for c in line.chars() {
        let len = c.len_utf8();
        if width + len > FOLD_LIMIT {
            output.push_str("\r\n ");
            width = 1;
        }
        output.push(c);
        width += len;
    }
    output.push_str("\r\n");
}
