//! Normalized event types.
//!
//! Both store rows and parsed feed blocks are converted into [`Event`] before
//! merging, so the sorter and serializer only ever deal with one shape.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Days, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A calendar event, from either the event store or an external feed.
///
/// A retained event has either `start` set, or `is_all_day` with `event_date`
/// set. Events with neither are dropped before serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Store primary key, feed UID, or a synthesized fallback.
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: Option<DateTime<Utc>>,
    /// May be missing or earlier than `start`; the serializer substitutes a
    /// default duration in that case.
    pub end: Option<DateTime<Utc>>,
    pub is_all_day: bool,
    /// Only populated for all-day events. Rendered instead of `start` when
    /// the time is TBD.
    pub event_date: Option<NaiveDate>,
    /// The time of day is not known yet; rendered as all-day with a marker.
    #[serde(default)]
    pub time_tbd: bool,
    pub recurrence: Option<Recurrence>,
    /// Topic key this event was resolved under (`major:{source}` for feeds).
    pub source_topic: String,
}

impl Event {
    /// The instant used to order events: `start`, else midnight UTC of
    /// `event_date`, else nothing.
    pub fn effective_instant(&self) -> Option<DateTime<Utc>> {
        self.start.or_else(|| {
            self.event_date
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
    }

    /// True when the event can be placed on a calendar at all.
    pub fn has_start(&self) -> bool {
        self.start.is_some() || self.event_date.is_some()
    }
}

/// A simplified recurrence: a frequency and an inclusive end instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    pub frequency: Frequency,
    pub until: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn as_ics_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Yearly => "YEARLY",
        }
    }

    /// Step `from` forward by `count` units of this frequency.
    ///
    /// Months and years use calendar arithmetic (Jan 31 + 1 month = Feb 28/29),
    /// days and weeks add whole calendar days. Returns `None` on overflow.
    pub fn advance(&self, from: DateTime<Utc>, count: u32) -> Option<DateTime<Utc>> {
        match self {
            Frequency::Daily => from.checked_add_days(Days::new(u64::from(count))),
            Frequency::Weekly => from.checked_add_days(Days::new(u64::from(count) * 7)),
            Frequency::Monthly => from.checked_add_months(Months::new(count)),
            Frequency::Yearly => from.checked_add_months(Months::new(count.checked_mul(12)?)),
        }
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DAILY" => Ok(Frequency::Daily),
            "WEEKLY" => Ok(Frequency::Weekly),
            "MONTHLY" => Ok(Frequency::Monthly),
            "YEARLY" => Ok(Frequency::Yearly),
            other => Err(format!("unsupported frequency '{other}'")),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ics_str())
    }
}
