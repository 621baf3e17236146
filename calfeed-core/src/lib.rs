//! Core of the calfeed calendar feed synthesizer.
//!
//! This crate turns a user's topic preferences into one calendar document:
//! - `ics` parses published feeds and serializes the merged result
//! - `store` and `source` define the event store and source registry seams
//! - `synthesis` fetches, parses, merges and renders in one request

pub mod config;
pub mod constants;
pub mod diagnostics;
pub mod error;
pub mod event;
pub mod fetch;
pub mod ics;
pub mod merge;
pub mod preferences;
pub mod recurrence;
pub mod source;
pub mod store;
pub mod synthesis;
pub mod time;

// Re-export the common types at crate root for convenience
pub use config::FeedConfig;
pub use diagnostics::{CollectingSink, Diagnostic, DiagnosticSink, TracingSink};
pub use error::{CalFeedError, CalFeedResult};
pub use event::*;
pub use fetch::{FeedFetcher, HttpFetcher};
pub use preferences::ResolvedPreferences;
pub use source::{ExternalSource, SourceRegistry, StaticSourceRegistry};
pub use store::{
    EventStore, MemoryEventStore, MemoryPreferenceStore, PreferenceStore, StoreEventRow,
};
pub use synthesis::{CalendarDocument, SynthesisSettings, Synthesizer};
