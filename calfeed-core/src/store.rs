//! Event store and preference store seams.
//!
//! The relational store that backs a deployment is an external collaborator;
//! this module defines what crosses that boundary (rows and preference values)
//! and how rows become [`Event`]s. The in-memory implementations load JSON
//! fixtures and back the CLI and tests.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::{CalFeedError, CalFeedResult};
use crate::event::Event;
use crate::ics::ParseOptions;
use crate::recurrence::parse_recurrence;
use crate::time::parse_store_timestamp;

/// An event row as the store returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreEventRow {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub topic: String,
    /// Timestamp text; may lack a timezone marker.
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    /// Date of an all-day or time-TBD event.
    #[serde(default)]
    pub event_date: Option<NaiveDate>,
    #[serde(default)]
    pub time_tbd: bool,
    /// RRULE text, e.g. `FREQ=WEEKLY;COUNT=10`.
    #[serde(default)]
    pub recurrence: Option<String>,
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RowId {
        Text(String),
        Number(i64),
    }

    Ok(match RowId::deserialize(deserializer)? {
        RowId::Text(text) => text,
        RowId::Number(number) => number.to_string(),
    })
}

impl StoreEventRow {
    /// Normalize a row into an [`Event`].
    ///
    /// Naive timestamps are read in `store_tz`. A TBD row without a date takes
    /// the civil date of its start in `store_tz`. All-day and TBD rows drop
    /// their start/end instants so the date is the only time information.
    pub fn into_event(
        self,
        store_tz: Tz,
        options: &ParseOptions,
        sink: &dyn DiagnosticSink,
    ) -> Event {
        let start = store_time(self.start_time.as_deref(), "start_time", store_tz, sink);
        let end = store_time(self.end_time.as_deref(), "end_time", store_tz, sink);

        let event_date = self.event_date.or_else(|| {
            start
                .filter(|_| self.time_tbd)
                .map(|s| s.with_timezone(&store_tz).date_naive())
        });
        let is_all_day = event_date.is_some() && (start.is_none() || self.time_tbd);

        let (start, end, event_date) = if is_all_day {
            (None, None, event_date)
        } else {
            (start, end, None)
        };

        let recurrence = self
            .recurrence
            .as_deref()
            .filter(|rule| !rule.trim().is_empty())
            .and_then(|rule| parse_recurrence(rule, options.now, options.recurrence_span, sink));

        let title = self
            .title
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| format!("Event from {}", self.topic));

        Event {
            id: self.id,
            title,
            description: self.description.filter(|d| !d.trim().is_empty()),
            location: self.location.filter(|l| !l.trim().is_empty()),
            start,
            end,
            is_all_day,
            event_date,
            time_tbd: self.time_tbd,
            recurrence,
            source_topic: self.topic,
        }
    }
}

fn store_time(
    text: Option<&str>,
    column: &str,
    store_tz: Tz,
    sink: &dyn DiagnosticSink,
) -> Option<DateTime<Utc>> {
    let text = text?.trim();
    if text.is_empty() {
        return None;
    }
    let parsed = parse_store_timestamp(text, store_tz);
    if parsed.is_none() {
        sink.report(Diagnostic::MalformedTimestamp {
            property: column.to_string(),
            value: text.to_string(),
        });
    }
    parsed
}

/// Query side of the event store.
pub trait EventStore: Sync {
    /// Rows for each topic, in topic order. A topic listed twice yields its
    /// rows twice.
    fn events_for_topics(
        &self,
        topics: &[String],
    ) -> impl Future<Output = CalFeedResult<Vec<StoreEventRow>>> + Send;
}

/// Token to stored preference lookup.
pub trait PreferenceStore: Sync {
    /// The raw stored preference value, or `None` for an unknown token.
    fn preferences_for(
        &self,
        token: &str,
    ) -> impl Future<Output = CalFeedResult<Option<Value>>> + Send;
}

/// An [`EventStore`] over rows held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventStore {
    rows: Vec<StoreEventRow>,
}

impl MemoryEventStore {
    pub fn new(rows: Vec<StoreEventRow>) -> Self {
        MemoryEventStore { rows }
    }

    /// Load rows from a JSON array file.
    pub fn from_json_file(path: &Path) -> CalFeedResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let rows = serde_json::from_str(&content).map_err(|e| {
            CalFeedError::Serialization(format!("Could not read events from {}: {e}", path.display()))
        })?;
        Ok(Self::new(rows))
    }
}

impl EventStore for MemoryEventStore {
    async fn events_for_topics(&self, topics: &[String]) -> CalFeedResult<Vec<StoreEventRow>> {
        Ok(topics
            .iter()
            .flat_map(|topic| self.rows.iter().filter(move |row| row.topic == *topic))
            .cloned()
            .collect())
    }
}

/// A [`PreferenceStore`] over a token map held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryPreferenceStore {
    by_token: HashMap<String, Value>,
}

impl MemoryPreferenceStore {
    pub fn new(by_token: HashMap<String, Value>) -> Self {
        MemoryPreferenceStore { by_token }
    }

    /// Load a `{ "token": <preferences> }` JSON object file.
    pub fn from_json_file(path: &Path) -> CalFeedResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let by_token = serde_json::from_str(&content).map_err(|e| {
            CalFeedError::Serialization(format!(
                "Could not read preferences from {}: {e}",
                path.display()
            ))
        })?;
        Ok(Self::new(by_token))
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    async fn preferences_for(&self, token: &str) -> CalFeedResult<Option<Value>> {
        Ok(self.by_token.get(token).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;
    use crate::event::Frequency;
    use chrono::TimeZone;
    use serde_json::json;

    fn row(value: Value) -> StoreEventRow {
        serde_json::from_value(value).expect("valid row")
    }

    fn options() -> ParseOptions {
        ParseOptions {
            now: Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap(),
            ..ParseOptions::default()
        }
    }

    #[test]
    fn test_naive_row_times_use_store_timezone() {
        let sink = CollectingSink::new();
        let event = row(json!({
            "id": 7,
            "title": "Chess club",
            "topic": "chess",
            "start_time": "2025-03-10 14:00:00",
            "end_time": "2025-03-10 16:00:00",
            "recurrence": "FREQ=WEEKLY;COUNT=4"
        }))
        .into_event(chrono_tz::America::Los_Angeles, &options(), &sink);

        assert_eq!(event.id, "7");
        assert_eq!(event.source_topic, "chess");
        assert_eq!(
            event.start,
            Some(Utc.with_ymd_and_hms(2025, 3, 10, 21, 0, 0).unwrap())
        );
        assert_eq!(
            event.end,
            Some(Utc.with_ymd_and_hms(2025, 3, 10, 23, 0, 0).unwrap())
        );
        assert!(!event.is_all_day);
        assert_eq!(event.recurrence.map(|r| r.frequency), Some(Frequency::Weekly));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_tbd_row_becomes_all_day_on_local_date() {
        let sink = CollectingSink::new();
        // 05:00 UTC on the 11th is still the 10th in Pacific time
        let event = row(json!({
            "id": "tbd-1",
            "topic": "robotics",
            "start_time": "2025-03-11T05:00:00Z",
            "time_tbd": true
        }))
        .into_event(chrono_tz::America::Los_Angeles, &options(), &sink);

        assert!(event.is_all_day);
        assert!(event.time_tbd);
        assert_eq!(event.event_date, NaiveDate::from_ymd_opt(2025, 3, 10));
        assert!(event.start.is_none());
        assert_eq!(event.title, "Event from robotics");
    }

    #[test]
    fn test_unreadable_row_time_is_reported() {
        let sink = CollectingSink::new();
        let event = row(json!({
            "id": "x",
            "topic": "chess",
            "start_time": "whenever",
            "event_date": "2025-04-01"
        }))
        .into_event(chrono_tz::America::Los_Angeles, &options(), &sink);

        assert!(event.is_all_day);
        assert_eq!(event.event_date, NaiveDate::from_ymd_opt(2025, 4, 1));
        assert_eq!(sink.count_kind("malformed_timestamp"), 1);
    }

    #[tokio::test]
    async fn test_memory_store_returns_rows_per_topic_in_order() {
        let store = MemoryEventStore::new(vec![
            row(json!({"id": 1, "topic": "chess"})),
            row(json!({"id": 2, "topic": "robotics"})),
            row(json!({"id": 3, "topic": "chess"})),
        ]);

        let rows = store
            .events_for_topics(&["robotics".to_string(), "chess".to_string(), "robotics".to_string()])
            .await
            .unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();

        assert_eq!(ids, vec!["2", "1", "3", "2"]);
    }

    #[test]
    fn test_memory_store_loads_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut file,
            br#"[{"id": 1, "topic": "chess", "start_time": "2025-03-10 14:00:00"}]"#,
        )
        .unwrap();

        let store = MemoryEventStore::from_json_file(file.path()).unwrap();
        assert_eq!(store.rows.len(), 1);

        let bad = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            MemoryEventStore::from_json_file(bad.path()),
            Err(CalFeedError::Serialization(_))
        ));
    }
}
