//! Permissive parsing of published calendar feeds.
//!
//! Third-party feeds are only loosely RFC 5545 shaped, so instead of handing
//! the whole document to a strict grammar we cut it into VEVENT blocks and
//! pull each property out independently. A bad property becomes an absent
//! field, a block without a usable start is skipped, and neither stops the
//! rest of the feed from being read.

use chrono::{DateTime, Months, NaiveDate, Utc};
use icalendar::parser::unfold;

use crate::constants::{DEFAULT_RECURRENCE_SPAN, EXTERNAL_SOURCE_PREFIX};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::event::Event;
use crate::ics::text::unescape_text;
use crate::recurrence::parse_recurrence;
use crate::time::{is_compact_date, parse_compact_date, parse_feed_timestamp, resolve_timezone};

/// Settings shared by everything that turns raw data into [`Event`]s.
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// Reference instant for COUNT-based and open-ended recurrence.
    pub now: DateTime<Utc>,
    /// How long an RRULE with no end is assumed to run.
    pub recurrence_span: Months,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            now: Utc::now(),
            recurrence_span: DEFAULT_RECURRENCE_SPAN,
        }
    }
}

/// Parse a published calendar document into events attributed to `source`.
///
/// Zero VEVENT blocks is not an error; the result is simply empty.
#[tracing::instrument(skip(raw, options, sink), fields(raw_len = raw.len()))]
pub fn parse_feed(
    raw: &str,
    source: &str,
    options: &ParseOptions,
    sink: &dyn DiagnosticSink,
) -> Vec<Event> {
    // One line-ending convention, then RFC 5545 unfolding
    let normalized = raw
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\n', "\r\n");
    let unfolded = unfold(&normalized);

    let blocks = extract_blocks(&unfolded, source, sink);
    tracing::debug!(blocks = blocks.len(), "Extracted VEVENT blocks");

    let events: Vec<Event> = blocks
        .iter()
        .filter_map(|block| match parse_block(block, source, options, sink) {
            Ok(event) => Some(event),
            Err(BlockError::MissingStart) => {
                sink.report(Diagnostic::MissingStart {
                    source: source.to_string(),
                    index: block.index,
                });
                None
            }
        })
        .collect();

    tracing::debug!(events = events.len(), "Parsed feed");
    events
}

/// A single `NAME;PARAM=VALUE:value` line.
#[derive(Debug)]
struct ContentLine<'a> {
    name: String,
    params: Vec<(String, String)>,
    value: &'a str,
}

impl ContentLine<'_> {
    fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Split a content line at the first colon outside double quotes.
fn parse_content_line(line: &str) -> Option<ContentLine<'_>> {
    let mut in_quotes = false;
    let colon = line.char_indices().find_map(|(i, c)| match c {
        '"' => {
            in_quotes = !in_quotes;
            None
        }
        ':' if !in_quotes => Some(i),
        _ => None,
    })?;

    let (head, value) = (&line[..colon], &line[colon + 1..]);
    let mut segments = split_unquoted(head, ';').into_iter();

    let name = segments.next()?.trim().to_ascii_uppercase();
    if name.is_empty() {
        return None;
    }

    let params = segments
        .filter_map(|segment| {
            let (key, val) = segment.split_once('=')?;
            Some((
                key.trim().to_ascii_uppercase(),
                val.trim().trim_matches('"').to_string(),
            ))
        })
        .collect();

    Some(ContentLine {
        name,
        params,
        value,
    })
}

fn split_unquoted(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == separator && !in_quotes {
            parts.push(&text[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&text[start..]);
    parts
}

/// The top-level properties of one VEVENT.
#[derive(Debug)]
struct Block<'a> {
    /// Position among all `BEGIN:VEVENT` markers in the feed.
    index: usize,
    lines: Vec<ContentLine<'a>>,
}

impl Block<'_> {
    fn find(&self, name: &str) -> Option<&ContentLine<'_>> {
        self.lines.iter().find(|line| line.name == name)
    }

    /// Unescaped text of a property, `None` when absent or blank.
    fn text(&self, name: &str) -> Option<String> {
        self.find(name)
            .map(|line| unescape_text(line.value))
            .filter(|text| !text.trim().is_empty())
    }
}

/// Returns the component name if `line` is `BEGIN:<name>` / `END:<name>`.
fn component_marker(line: &str, keyword: &str) -> Option<String> {
    let (key, component) = line.split_once(':')?;
    key.trim()
        .eq_ignore_ascii_case(keyword)
        .then(|| component.trim().to_ascii_uppercase())
}

fn extract_blocks<'a>(text: &'a str, source: &str, sink: &dyn DiagnosticSink) -> Vec<Block<'a>> {
    let mut blocks = Vec::new();
    let mut current: Option<Block<'a>> = None;
    // Nesting depth of sub-components (VALARM etc.) inside the open VEVENT
    let mut depth = 0usize;
    let mut next_index = 0usize;

    let report_unterminated = |index: usize| {
        sink.report(Diagnostic::UnterminatedBlock {
            source: source.to_string(),
            index,
        });
    };

    // Only leading whitespace goes; trailing blanks can belong to a TEXT value
    for line in text.split("\r\n").map(str::trim_start) {
        if let Some(component) = component_marker(line, "BEGIN") {
            if component == "VEVENT" {
                if let Some(open) = current.take() {
                    report_unterminated(open.index);
                }
                current = Some(Block {
                    index: next_index,
                    lines: Vec::new(),
                });
                next_index += 1;
                depth = 0;
            } else if current.is_some() {
                depth += 1;
            }
            continue;
        }

        if let Some(component) = component_marker(line, "END") {
            if component == "VEVENT" {
                if let Some(block) = current.take() {
                    blocks.push(block);
                }
                depth = 0;
            } else if current.is_some() {
                depth = depth.saturating_sub(1);
            }
            continue;
        }

        if depth == 0
            && let Some(block) = current.as_mut()
            && let Some(content_line) = parse_content_line(line)
        {
            block.lines.push(content_line);
        }
    }

    if let Some(open) = current {
        report_unterminated(open.index);
    }

    blocks
}

/// Reasons a block is dropped entirely.
#[derive(Debug)]
enum BlockError {
    MissingStart,
}

/// A DTSTART/DTEND value after parsing.
enum FeedTime {
    Date(NaiveDate),
    Instant(DateTime<Utc>),
}

fn parse_block(
    block: &Block<'_>,
    source: &str,
    options: &ParseOptions,
    sink: &dyn DiagnosticSink,
) -> Result<Event, BlockError> {
    let start = block
        .find("DTSTART")
        .and_then(|line| parse_feed_time(line, sink))
        .ok_or(BlockError::MissingStart)?;

    let (start, event_date, is_all_day) = match start {
        FeedTime::Date(date) => (None, Some(date), true),
        FeedTime::Instant(instant) => (Some(instant), None, false),
    };

    // All-day ends are computed at serialization, not carried over
    let end = if is_all_day {
        None
    } else {
        block
            .find("DTEND")
            .and_then(|line| parse_feed_time(line, sink))
            .and_then(|end| match end {
                FeedTime::Instant(instant) => Some(instant),
                FeedTime::Date(date) => date.and_hms_opt(0, 0, 0).map(|n| n.and_utc()),
            })
    };

    let id = block
        .find("UID")
        .map(|line| line.value.trim().to_string())
        .filter(|uid| !uid.is_empty())
        .unwrap_or_else(|| fallback_uid(source, block.index, options.now));

    let title = block
        .text("SUMMARY")
        .unwrap_or_else(|| format!("Event from {source}"));

    let recurrence = block.find("RRULE").and_then(|line| {
        parse_recurrence(line.value, options.now, options.recurrence_span, sink)
    });

    Ok(Event {
        id,
        title,
        description: block.text("DESCRIPTION"),
        location: block.text("LOCATION"),
        start,
        end,
        is_all_day,
        event_date,
        time_tbd: false,
        recurrence,
        source_topic: format!("{EXTERNAL_SOURCE_PREFIX}{source}"),
    })
}

fn parse_feed_time(line: &ContentLine<'_>, sink: &dyn DiagnosticSink) -> Option<FeedTime> {
    let is_date = line
        .param("VALUE")
        .is_some_and(|v| v.eq_ignore_ascii_case("DATE"))
        || is_compact_date(line.value);

    let parsed = if is_date {
        parse_compact_date(line.value).map(FeedTime::Date)
    } else {
        let tzid = line.param("TZID");
        // Only a 15-character wall-clock value is read in its TZID
        if let Some(tzid) = tzid
            && line.value.trim().len() == 15
            && resolve_timezone(tzid).is_none()
        {
            sink.report(Diagnostic::UnknownTimezone {
                tzid: tzid.to_string(),
            });
        }
        parse_feed_timestamp(line.value, tzid).map(FeedTime::Instant)
    };

    match parsed {
        Ok(time) => Some(time),
        Err(e) => {
            tracing::debug!(property = %line.name, error = %e, "Unreadable timestamp");
            sink.report(Diagnostic::MalformedTimestamp {
                property: line.name.clone(),
                value: line.value.to_string(),
            });
            None
        }
    }
}

/// `source-index-timestamp-random`, for blocks without a UID.
fn fallback_uid(source: &str, index: usize, now: DateTime<Utc>) -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{source}-{index}-{}-{}", now.timestamp_millis(), &random[..8])
}
