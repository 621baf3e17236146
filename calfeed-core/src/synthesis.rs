//! Calendar synthesis: preferences in, one calendar document out.
//!
//! Direct topics are read from the event store while every selected external
//! source is fetched concurrently. Each source runs under its own deadline so
//! a slow or failing source only loses its own events.

use std::time::Duration;

use chrono::{DateTime, Months, Utc};
use chrono_tz::Tz;
use futures::future::join_all;

use crate::config::FeedConfig;
use crate::constants::{
    CALENDAR_CONTENT_TYPE, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_FILENAME, DEFAULT_RECURRENCE_SPAN,
};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::{CalFeedError, CalFeedResult};
use crate::event::Event;
use crate::fetch::FeedFetcher;
use crate::ics::{CalendarMetadata, ParseOptions, parse_feed, render_calendar};
use crate::merge::merge_events;
use crate::preferences::{preference_list_from_value, resolve};
use crate::source::{ExternalSource, SourceRegistry};
use crate::store::{EventStore, PreferenceStore};
use crate::time::resolve_timezone;

#[derive(Debug, Clone)]
pub struct SynthesisSettings {
    pub store_timezone: Tz,
    pub fetch_timeout: Duration,
    pub recurrence_span: Months,
    pub metadata: CalendarMetadata,
    pub filename: String,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        SynthesisSettings {
            store_timezone: chrono_tz::America::Los_Angeles,
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            recurrence_span: DEFAULT_RECURRENCE_SPAN,
            metadata: CalendarMetadata::default(),
            filename: DEFAULT_FILENAME.to_string(),
        }
    }
}

impl SynthesisSettings {
    pub fn from_config(config: &FeedConfig) -> CalFeedResult<Self> {
        Ok(SynthesisSettings {
            store_timezone: resolve_timezone(&config.store_timezone).ok_or_else(|| {
                CalFeedError::Config(format!("Unknown store_timezone '{}'", config.store_timezone))
            })?,
            fetch_timeout: config.fetch_timeout(),
            recurrence_span: config.recurrence_span(),
            metadata: config.metadata(),
            filename: config.calendar.filename.clone(),
        })
    }
}

/// A rendered calendar ready to be served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarDocument {
    pub body: String,
    pub content_type: &'static str,
    pub filename: String,
    pub event_count: usize,
}

impl CalendarDocument {
    /// Value for a `Content-Disposition` header.
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.filename.replace('"', ""))
    }
}

pub struct Synthesizer<S, R, F> {
    store: S,
    registry: R,
    fetcher: F,
    settings: SynthesisSettings,
}

impl<S, R, F> Synthesizer<S, R, F>
where
    S: EventStore,
    R: SourceRegistry,
    F: FeedFetcher,
{
    pub fn new(store: S, registry: R, fetcher: F, settings: SynthesisSettings) -> Self {
        Synthesizer {
            store,
            registry,
            fetcher,
            settings,
        }
    }

    pub fn settings(&self) -> &SynthesisSettings {
        &self.settings
    }

    /// Gather and order the events for a preference set.
    #[tracing::instrument(skip_all, fields(preferences = preferences.len()))]
    pub async fn collect_events<P: AsRef<str>>(
        &self,
        preferences: &[P],
        now: DateTime<Utc>,
        sink: &dyn DiagnosticSink,
    ) -> Vec<Event> {
        let resolved = resolve(preferences);
        if resolved.is_empty() {
            return Vec::new();
        }

        let options = ParseOptions {
            now,
            recurrence_span: self.settings.recurrence_span,
        };

        let (direct, per_source) = tokio::join!(
            self.direct_events(&resolved.direct_topics, &options, sink),
            self.feed_events(&resolved.external_sources, &options, sink),
        );

        tracing::debug!(
            direct = direct.len(),
            sources = per_source.len(),
            "Collected events"
        );

        merge_events(direct, per_source)
    }

    /// Synthesize the calendar for a preference set.
    pub async fn synthesize<P: AsRef<str>>(
        &self,
        preferences: &[P],
        sink: &dyn DiagnosticSink,
    ) -> CalendarDocument {
        self.synthesize_at(preferences, Utc::now(), sink).await
    }

    /// [`Synthesizer::synthesize`] with an explicit reference instant.
    pub async fn synthesize_at<P: AsRef<str>>(
        &self,
        preferences: &[P],
        now: DateTime<Utc>,
        sink: &dyn DiagnosticSink,
    ) -> CalendarDocument {
        let events = self.collect_events(preferences, now, sink).await;
        let rendered = render_calendar(&events, now, &self.settings.metadata, sink);

        tracing::info!(
            events = rendered.event_count,
            bytes = rendered.body.len(),
            "Synthesized calendar"
        );

        CalendarDocument {
            body: rendered.body,
            content_type: CALENDAR_CONTENT_TYPE,
            filename: self.settings.filename.clone(),
            event_count: rendered.event_count,
        }
    }

    /// Resolve a user token through `preferences` and synthesize its calendar.
    ///
    /// A blank token or a token without stored preferences is an error rather
    /// than an empty calendar.
    pub async fn synthesize_for_token<P: PreferenceStore>(
        &self,
        preferences: &P,
        token: &str,
        sink: &dyn DiagnosticSink,
    ) -> CalFeedResult<CalendarDocument> {
        let token = token.trim();
        if token.is_empty() {
            return Err(CalFeedError::InvalidToken);
        }

        let stored = preferences
            .preferences_for(token)
            .await?
            .ok_or_else(|| CalFeedError::PreferencesNotFound(token.to_string()))?;
        let list = preference_list_from_value(&stored);

        Ok(self.synthesize(&list, sink).await)
    }

    async fn direct_events(
        &self,
        topics: &[String],
        options: &ParseOptions,
        sink: &dyn DiagnosticSink,
    ) -> Vec<Event> {
        if topics.is_empty() {
            return Vec::new();
        }

        match self.store.events_for_topics(topics).await {
            Ok(rows) => rows
                .into_iter()
                .map(|row| row.into_event(self.settings.store_timezone, options, sink))
                .collect(),
            Err(e) => {
                sink.report(Diagnostic::StoreUnavailable {
                    reason: e.to_string(),
                });
                Vec::new()
            }
        }
    }

    async fn feed_events(
        &self,
        names: &[String],
        options: &ParseOptions,
        sink: &dyn DiagnosticSink,
    ) -> Vec<Vec<Event>> {
        if names.is_empty() {
            return Vec::new();
        }

        let known = match self.registry.lookup(names).await {
            Ok(known) => known,
            Err(e) => {
                sink.report(Diagnostic::StoreUnavailable {
                    reason: format!("source registry: {e}"),
                });
                return Vec::new();
            }
        };

        let selected: Vec<&ExternalSource> = names
            .iter()
            .filter_map(|name| {
                let found = known.iter().find(|source| source.name == *name);
                if found.is_none() {
                    sink.report(Diagnostic::UnknownSource { name: name.clone() });
                }
                found
            })
            .collect();

        join_all(
            selected
                .into_iter()
                .map(|source| self.source_events(source, options, sink)),
        )
        .await
    }

    #[tracing::instrument(skip_all, fields(source = %source.name))]
    async fn source_events(
        &self,
        source: &ExternalSource,
        options: &ParseOptions,
        sink: &dyn DiagnosticSink,
    ) -> Vec<Event> {
        let fetched = tokio::time::timeout(self.settings.fetch_timeout, self.fetcher.fetch(source))
            .await
            .unwrap_or_else(|_| {
                Err(CalFeedError::FetchTimeout {
                    source_name: source.name.clone(),
                    secs: self.settings.fetch_timeout.as_secs(),
                })
            });

        let raw = match fetched {
            Ok(raw) => raw,
            Err(CalFeedError::EmptyFeed(_)) => {
                sink.report(Diagnostic::EmptyFeed {
                    source: source.name.clone(),
                });
                return Vec::new();
            }
            Err(e) => {
                sink.report(Diagnostic::SourceUnavailable {
                    source: source.name.clone(),
                    reason: e.to_string(),
                });
                return Vec::new();
            }
        };

        let events = parse_feed(&raw, &source.name, options, sink);
        if events.is_empty() {
            sink.report(Diagnostic::EmptyFeed {
                source: source.name.clone(),
            });
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;
    use crate::source::StaticSourceRegistry;
    use crate::store::{MemoryEventStore, MemoryPreferenceStore, StoreEventRow};
    use chrono::TimeZone;
    use serde_json::json;
    use std::collections::HashMap;

    enum Canned {
        Body(&'static str),
        Status(u16),
        Hang,
    }

    struct CannedFetcher(HashMap<&'static str, Canned>);

    impl FeedFetcher for CannedFetcher {
        async fn fetch(&self, source: &ExternalSource) -> CalFeedResult<String> {
            match self.0.get(source.name.as_str()) {
                Some(Canned::Body(body)) => Ok(body.to_string()),
                Some(Canned::Status(status)) => Err(CalFeedError::HttpStatus {
                    source_name: source.name.clone(),
                    status: *status,
                }),
                Some(Canned::Hang) => std::future::pending().await,
                None => Err(CalFeedError::Fetch {
                    source_name: source.name.clone(),
                    message: "connection refused".into(),
                }),
            }
        }
    }

    struct FailingStore;

    impl EventStore for FailingStore {
        async fn events_for_topics(&self, _topics: &[String]) -> CalFeedResult<Vec<StoreEventRow>> {
            Err(CalFeedError::Store("connection reset".into()))
        }
    }

    const MUSIC_FEED: &str = "BEGIN:VCALENDAR\r\n\
BEGIN:VEVENT\r\n\
UID:recital-1\r\n\
SUMMARY:Spring Recital\r\n\
DTSTART:20250312T020000Z\r\n\
DTEND:20250312T040000Z\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    const EMPTY_FEED: &str = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nEND:VCALENDAR\r\n";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn store() -> MemoryEventStore {
        let rows = json!([
            {
                "id": 11,
                "title": "Chess club",
                "topic": "chess",
                "start_time": "2025-03-10 14:00:00",
                "end_time": "2025-03-10 16:00:00"
            },
            {
                "id": 12,
                "title": "Robotics build night",
                "topic": "robotics",
                "event_date": "2025-03-15",
                "time_tbd": true
            }
        ]);
        MemoryEventStore::new(serde_json::from_value(rows).unwrap())
    }

    fn registry() -> StaticSourceRegistry {
        StaticSourceRegistry::new(vec![
            ExternalSource::new("Music", "http://example.edu/music.ics"),
            ExternalSource::new("Broken", "http://example.edu/broken.ics"),
            ExternalSource::new("Slow", "http://example.edu/slow.ics"),
            ExternalSource::new("Quiet", "http://example.edu/quiet.ics"),
        ])
    }

    fn fetcher() -> CannedFetcher {
        CannedFetcher(HashMap::from([
            ("Music", Canned::Body(MUSIC_FEED)),
            ("Broken", Canned::Status(500)),
            ("Slow", Canned::Hang),
            ("Quiet", Canned::Body(EMPTY_FEED)),
        ]))
    }

    fn settings() -> SynthesisSettings {
        SynthesisSettings {
            fetch_timeout: Duration::from_millis(100),
            ..SynthesisSettings::default()
        }
    }

    fn synthesizer() -> Synthesizer<MemoryEventStore, StaticSourceRegistry, CannedFetcher> {
        Synthesizer::new(store(), registry(), fetcher(), settings())
    }

    fn ids(events: &[Event]) -> Vec<&str> {
        events.iter().map(|e| e.id.as_str()).collect()
    }

    #[test_log::test(tokio::test)]
    async fn test_failing_source_does_not_block_others() {
        let sink = CollectingSink::new();
        let events = synthesizer()
            .collect_events(&["chess", "major:Broken", "major:Music"], now(), &sink)
            .await;

        assert_eq!(ids(&events), vec!["11", "recital-1"]);
        assert_eq!(events[1].source_topic, "major:Music");
        assert_eq!(sink.count_kind("source_unavailable"), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_slow_source_times_out() {
        let sink = CollectingSink::new();
        let events = synthesizer()
            .collect_events(&["major:Slow", "major:Music"], now(), &sink)
            .await;

        assert_eq!(ids(&events), vec!["recital-1"]);
        assert!(sink.diagnostics().iter().any(|d| matches!(
            d,
            Diagnostic::SourceUnavailable { source, reason }
                if source == "Slow" && reason.contains("timed out")
        )));
    }

    #[test_log::test(tokio::test)]
    async fn test_unknown_and_empty_sources_are_reported() {
        let sink = CollectingSink::new();
        let events = synthesizer()
            .collect_events(&["major:Quiet", "major:Physics"], now(), &sink)
            .await;

        assert!(events.is_empty());
        assert_eq!(sink.count_kind("empty_feed"), 1);
        assert_eq!(sink.count_kind("unknown_source"), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_store_and_feed_events_are_merged_chronologically() {
        let sink = CollectingSink::new();
        let events = synthesizer()
            .collect_events(&["robotics", "major:Music", "chess"], now(), &sink)
            .await;

        // Chess is 21:00Z on the 10th, the recital 02:00Z on the 12th,
        // and the TBD build night sorts at midnight on the 15th
        assert_eq!(ids(&events), vec!["11", "recital-1", "12"]);
        assert!(sink.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_store_failure_keeps_feed_events() {
        let sink = CollectingSink::new();
        let synthesizer = Synthesizer::new(FailingStore, registry(), fetcher(), settings());

        let events = synthesizer
            .collect_events(&["chess", "major:Music"], now(), &sink)
            .await;

        assert_eq!(ids(&events), vec!["recital-1"]);
        assert_eq!(sink.count_kind("store_unavailable"), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_empty_preferences_yield_minimal_document() {
        let sink = CollectingSink::new();
        let document = synthesizer()
            .synthesize_at::<&str>(&[], now(), &sink)
            .await;

        assert_eq!(
            document.body,
            "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:-//calfeed//Calendar Feed//EN\r\n\
CALSCALE:GREGORIAN\r\n\
METHOD:PUBLISH\r\n\
END:VCALENDAR\r\n"
        );
        assert_eq!(document.event_count, 0);
        assert_eq!(document.content_type, "text/calendar; charset=utf-8");
        assert_eq!(
            document.content_disposition(),
            "attachment; filename=\"calendar.ics\""
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_document_contains_every_source() {
        let sink = CollectingSink::new();
        let document = synthesizer()
            .synthesize_at(&["chess", "major:Broken", "major:Music"], now(), &sink)
            .await;

        assert_eq!(document.event_count, 2);
        assert_eq!(document.body.matches("BEGIN:VEVENT").count(), 2);
        assert!(document.body.contains("SUMMARY:Chess club\r\n"));
        assert!(document.body.contains("SUMMARY:Spring Recital\r\n"));
        assert!(document.body.contains("DTSTART:20250310T210000Z\r\n"));
    }

    #[test_log::test(tokio::test)]
    async fn test_event_count_skips_rows_without_start() {
        let rows = json!([
            { "id": 1, "title": "Open mic", "topic": "t", "start_time": "2025-03-10 14:00:00" },
            { "id": 2, "title": "Lost row", "topic": "t", "start_time": "garbage" }
        ]);
        let store = MemoryEventStore::new(serde_json::from_value(rows).unwrap());
        let synthesizer = Synthesizer::new(store, registry(), fetcher(), settings());

        let sink = CollectingSink::new();
        let document = synthesizer.synthesize_at(&["t"], now(), &sink).await;

        assert_eq!(document.body.matches("BEGIN:VEVENT").count(), 1);
        assert_eq!(document.event_count, 1);
        assert_eq!(sink.count_kind("event_dropped"), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_token_resolution() {
        let sink = CollectingSink::new();
        let preferences = MemoryPreferenceStore::new(HashMap::from([
            ("abc123".to_string(), json!("[\"chess\",\"major:Music\"]")),
            ("empty".to_string(), json!([])),
        ]));
        let synthesizer = synthesizer();

        let document = synthesizer
            .synthesize_for_token(&preferences, " abc123 ", &sink)
            .await
            .unwrap();
        assert_eq!(document.event_count, 2);

        let document = synthesizer
            .synthesize_for_token(&preferences, "empty", &sink)
            .await
            .unwrap();
        assert_eq!(document.event_count, 0);

        let err = synthesizer
            .synthesize_for_token(&preferences, "nobody", &sink)
            .await
            .unwrap_err();
        assert!(matches!(err, CalFeedError::PreferencesNotFound(ref t) if t == "nobody"));
        assert!(err.is_not_found());

        let err = synthesizer
            .synthesize_for_token(&preferences, "   ", &sink)
            .await
            .unwrap_err();
        assert!(matches!(err, CalFeedError::InvalidToken));
    }

    #[test]
    fn test_settings_from_config() {
        let config = FeedConfig {
            store_timezone: "Europe/Berlin".into(),
            ..FeedConfig::default()
        };
        let settings = SynthesisSettings::from_config(&config).unwrap();
        assert_eq!(settings.store_timezone, chrono_tz::Europe::Berlin);
        assert_eq!(settings.filename, "calendar.ics");

        let config = FeedConfig {
            store_timezone: "Nowhere/Special".into(),
            ..FeedConfig::default()
        };
        assert!(SynthesisSettings::from_config(&config).is_err());
    }
}
