//! Merging and ordering of events from all sources.

use std::cmp::Ordering;

use crate::event::Event;

/// Concatenate store events with every source's events and sort the result.
pub fn merge_events(direct: Vec<Event>, per_source: Vec<Vec<Event>>) -> Vec<Event> {
    let mut merged = direct;
    merged.extend(per_source.into_iter().flatten());
    sort_events(&mut merged);
    merged
}

/// Stable chronological sort by effective instant; events without one go last
/// in their original relative order.
pub fn sort_events(events: &mut [Event]) {
    events.sort_by(compare_effective_instant);
}

fn compare_effective_instant(a: &Event, b: &Event) -> Ordering {
    match (a.effective_instant(), b.effective_instant()) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
