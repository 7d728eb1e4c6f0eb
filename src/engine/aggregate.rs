use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};

use crate::model::*;
use crate::tasks::Task;

use super::slots::SlotCalendar;

// ── Calendar Aggregator ───────────────────────────────────────────

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// Merge bookings, holidays and tasks for `[from, until)` into one feed.
///
/// `bookings` only needs to be pre-narrowed to the date range; status,
/// resource and kind filters are applied here before anything is mapped.
/// Holidays and tasks that straddle the range are clipped to it, so every
/// entry starts and ends inside `[from 00:00, until 00:00]`.
///
/// Output is ordered by start, then Holiday < Booking < Task, then id.
pub fn aggregate<'a>(
    calendar: &SlotCalendar,
    bookings: impl IntoIterator<Item = &'a Booking>,
    tasks: &[Task],
    from: NaiveDate,
    until: NaiveDate,
    filter: &CalendarFilter,
) -> Vec<CalendarEntry> {
    let range_start = midnight(from);
    let range_end = midnight(until);
    let mut entries = Vec::new();

    if filter.kinds.admits(EntryKind::Holiday) {
        for h in calendar.holidays_between(from, until) {
            let first = h.start.max(from);
            let last_exclusive = (h.end + Days::new(1)).min(until);
            entries.push(CalendarEntry {
                id: h.id,
                kind: EntryKind::Holiday,
                start: midnight(first),
                end: midnight(last_exclusive),
                title: h.label.clone(),
                resource_id: None,
                status: None,
            });
        }
    }

    if filter.kinds.admits(EntryKind::Booking) {
        for b in bookings {
            if b.date < from || b.date >= until || !filter.admits_booking(b) {
                continue;
            }
            let Some(window) = calendar.window(b.window_id) else {
                tracing::debug!("booking {} references unknown window {}", b.id, b.window_id);
                continue;
            };
            let (start, end) = window.span_on(b.date);
            entries.push(CalendarEntry {
                id: b.id,
                kind: EntryKind::Booking,
                start,
                end,
                title: b.note.clone(),
                resource_id: Some(b.resource_id),
                status: Some(b.status),
            });
        }
    }

    if filter.kinds.admits(EntryKind::Task) {
        for t in tasks {
            if t.start >= range_end || t.end <= range_start {
                continue;
            }
            entries.push(CalendarEntry {
                id: t.id,
                kind: EntryKind::Task,
                start: t.start.max(range_start),
                end: t.end.min(range_end),
                title: Some(t.title.clone()),
                resource_id: t.resource_id,
                status: None,
            });
        }
    }

    entries.sort_by_key(|e| (e.start, e.kind, e.id));
    entries
}
