use chrono::{Datelike, NaiveDate};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::slots::SlotCalendar;
use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

pub(crate) fn validate_date(date: NaiveDate) -> Result<(), EngineError> {
    if !(MIN_BOOKABLE_YEAR..=MAX_BOOKABLE_YEAR).contains(&date.year()) {
        return Err(EngineError::Validation(format!("date {date} out of range")));
    }
    Ok(())
}

/// Why a syntactically valid slot cannot be taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Holiday,
    SlotFull,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::Holiday => "holiday",
            Rejection::SlotFull => "slot full",
        }
    }
}

/// Verdict for one `(resource, date, window)` slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub admissible: bool,
    pub reason: Option<Rejection>,
    pub remaining: u32,
    pub window: TimeWindow,
}

impl Admission {
    /// Turn a rejection into the matching error kind.
    pub fn into_result(self, date: NaiveDate) -> Result<Admission, EngineError> {
        match self.reason {
            None => Ok(self),
            Some(Rejection::Holiday) => Err(EngineError::Holiday(date)),
            Some(Rejection::SlotFull) => Err(EngineError::SlotFull {
                window_id: self.window.id,
                capacity: self.window.capacity,
            }),
        }
    }
}

/// Decide whether `resource` can take one more booking in `window_id` on `date`.
///
/// Reads the *current* window definition from `calendar`, so capacity edits
/// apply immediately. `exclude` skips a booking being rescheduled so it does
/// not count against itself. Only malformed input is an `Err`; a holiday or
/// a full slot is a non-admissible `Ok`.
///
/// Callers that go on to insert must hold the resource's write lock across
/// this check and the insert.
pub fn check_availability(
    calendar: &SlotCalendar,
    resource: &ResourceState,
    date: NaiveDate,
    window_id: Ulid,
    exclude: Option<Ulid>,
) -> Result<Admission, EngineError> {
    validate_date(date)?;
    let window = calendar
        .window(window_id)
        .ok_or_else(|| EngineError::Validation(format!("unknown window: {window_id}")))?;

    if calendar.is_holiday(date) {
        return Ok(Admission {
            admissible: false,
            reason: Some(Rejection::Holiday),
            remaining: 0,
            window: window.clone(),
        });
    }

    if window.retired {
        return Err(EngineError::Validation(format!("window {window_id} is retired")));
    }
    if !window.applies_to(date) {
        return Err(EngineError::Validation(format!(
            "window {window_id} is a {} window but {date} is a {}",
            window.weekday,
            date.weekday()
        )));
    }

    let taken = resource.active_count(date, window_id, exclude);
    if taken >= window.capacity {
        return Ok(Admission {
            admissible: false,
            reason: Some(Rejection::SlotFull),
            remaining: 0,
            window: window.clone(),
        });
    }

    Ok(Admission {
        admissible: true,
        reason: None,
        remaining: window.capacity - taken,
        window: window.clone(),
    })
}
