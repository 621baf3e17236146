//! Structured reporting for recoverable failures.
//!
//! Every stage of the pipeline degrades instead of failing: a bad property
//! becomes an absent field, a bad block is skipped, a dead source contributes
//! nothing. Each of those decisions is reported as a [`Diagnostic`] through a
//! [`DiagnosticSink`] handed to the stage, so callers can log them, count them
//! or show them to an operator.

use std::fmt;
use std::sync::Mutex;

/// A single recoverable problem encountered during synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A date or date-time value did not match any accepted shape.
    MalformedTimestamp { property: String, value: String },
    /// A TZID could not be resolved; the value was read as UTC.
    UnknownTimezone { tzid: String },
    /// An RRULE had no FREQ, or one outside DAILY/WEEKLY/MONTHLY/YEARLY.
    UnsupportedFrequency { rule: String },
    /// An RRULE part (UNTIL, COUNT) was present but unusable.
    InvalidRecurrencePart { part: String, value: String },
    /// A VEVENT block had no usable DTSTART and was dropped.
    MissingStart { source: String, index: usize },
    /// A VEVENT block was never closed and was dropped.
    UnterminatedBlock { source: String, index: usize },
    /// A feed parsed cleanly but contained no usable events.
    EmptyFeed { source: String },
    /// A source could not be fetched; it contributes zero events.
    SourceUnavailable { source: String, reason: String },
    /// A preference referenced a source the registry does not know.
    UnknownSource { name: String },
    /// The event store query failed; direct topics contribute zero events.
    StoreUnavailable { reason: String },
    /// An event reached the serializer with no start and was left out.
    EventDropped { id: String },
}

impl Diagnostic {
    /// Short stable name for the diagnostic kind, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Diagnostic::MalformedTimestamp { .. } => "malformed_timestamp",
            Diagnostic::UnknownTimezone { .. } => "unknown_timezone",
            Diagnostic::UnsupportedFrequency { .. } => "unsupported_frequency",
            Diagnostic::InvalidRecurrencePart { .. } => "invalid_recurrence_part",
            Diagnostic::MissingStart { .. } => "missing_start",
            Diagnostic::UnterminatedBlock { .. } => "unterminated_block",
            Diagnostic::EmptyFeed { .. } => "empty_feed",
            Diagnostic::SourceUnavailable { .. } => "source_unavailable",
            Diagnostic::UnknownSource { .. } => "unknown_source",
            Diagnostic::StoreUnavailable { .. } => "store_unavailable",
            Diagnostic::EventDropped { .. } => "event_dropped",
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::MalformedTimestamp { property, value } => {
                write!(f, "{property}: unrecognized timestamp '{value}'")
            }
            Diagnostic::UnknownTimezone { tzid } => {
                write!(f, "unknown timezone '{tzid}', treating as UTC")
            }
            Diagnostic::UnsupportedFrequency { rule } => {
                write!(f, "unsupported recurrence rule '{rule}'")
            }
            Diagnostic::InvalidRecurrencePart { part, value } => {
                write!(f, "ignoring {part}={value} in recurrence rule")
            }
            Diagnostic::MissingStart { source, index } => {
                write!(f, "{source}: event #{index} has no usable DTSTART, skipped")
            }
            Diagnostic::UnterminatedBlock { source, index } => {
                write!(f, "{source}: event #{index} is missing END:VEVENT, skipped")
            }
            Diagnostic::EmptyFeed { source } => write!(f, "{source}: no events found"),
            Diagnostic::SourceUnavailable { source, reason } => {
                write!(f, "{source}: {reason}")
            }
            Diagnostic::UnknownSource { name } => write!(f, "unknown source '{name}'"),
            Diagnostic::StoreUnavailable { reason } => {
                write!(f, "event store unavailable: {reason}")
            }
            Diagnostic::EventDropped { id } => {
                write!(f, "event '{id}' has no start, left out of the calendar")
            }
        }
    }
}

/// Receiver for diagnostics. Shared across concurrent source fetches, hence
/// `Send + Sync`.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Forwards every diagnostic to `tracing` at WARN level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: Diagnostic) {
        tracing::warn!(kind = diagnostic.kind(), "{diagnostic}");
    }
}

/// Buffers diagnostics in memory, also emitting them at DEBUG level.
#[derive(Debug, Default)]
pub struct CollectingSink {
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything reported so far.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of diagnostics of the given kind (see [`Diagnostic::kind`]).
    pub fn count_kind(&self, kind: &str) -> usize {
        self.lock().iter().filter(|d| d.kind() == kind).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Diagnostic>> {
        // A poisoned buffer still holds valid diagnostics
        self.diagnostics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DiagnosticSink for CollectingSink {
    fn report(&self, diagnostic: Diagnostic) {
        tracing::debug!(kind = diagnostic.kind(), "{diagnostic}");
        self.lock().push(diagnostic);
    }
}
