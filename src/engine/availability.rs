use chrono::{Datelike, NaiveDate};

use crate::model::*;

use super::conflict::check_availability;
use super::slots::SlotCalendar;

// ── Availability Planner ──────────────────────────────────────────

/// Every offered window on `date` with its remaining capacity for `resource`.
///
/// Full windows are yielded with `remaining == 0` rather than skipped. A
/// holiday yields nothing. The iterator borrows the snapshot it was built
/// from; call again for fresh numbers.
pub fn plan_day<'a>(
    calendar: &'a SlotCalendar,
    resource: &'a ResourceState,
    date: NaiveDate,
) -> impl Iterator<Item = SlotAvailability> + 'a {
    let blacked_out = calendar.is_holiday(date);
    calendar
        .windows_for(date.weekday())
        .take_while(move |_| !blacked_out)
        .filter_map(move |w| check_availability(calendar, resource, date, w.id, None).ok())
        .map(|admission| SlotAvailability {
            window: admission.window,
            remaining: admission.remaining,
        })
}
