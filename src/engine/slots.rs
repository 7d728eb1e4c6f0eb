use chrono::{NaiveDate, NaiveTime, Weekday};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Recurring weekly windows plus holiday blackouts.
///
/// Windows are kept sorted by `(weekday, start)`; holidays by `start`.
#[derive(Debug, Clone, Default)]
pub struct SlotCalendar {
    windows: Vec<TimeWindow>,
    holidays: Vec<Holiday>,
}

fn window_key(w: &TimeWindow) -> (u32, NaiveTime) {
    (w.weekday.num_days_from_monday(), w.start)
}

impl SlotCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offered windows on `weekday`, ascending by start. Empty if none are configured.
    pub fn windows_for(&self, weekday: Weekday) -> impl Iterator<Item = &TimeWindow> {
        self.windows
            .iter()
            .filter(move |w| w.weekday == weekday && !w.retired)
    }

    /// Any window by id, retired ones included.
    pub fn window(&self, id: Ulid) -> Option<&TimeWindow> {
        self.windows.iter().find(|w| w.id == id)
    }

    pub fn windows(&self) -> &[TimeWindow] {
        &self.windows
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.iter().any(|h| h.contains(date))
    }

    pub fn holiday(&self, id: Ulid) -> Option<&Holiday> {
        self.holidays.iter().find(|h| h.id == id)
    }

    pub fn holidays(&self) -> &[Holiday] {
        &self.holidays
    }

    /// Holidays with at least one day in `[from, until)`.
    pub fn holidays_between(&self, from: NaiveDate, until: NaiveDate) -> impl Iterator<Item = &Holiday> {
        let right = self.holidays.partition_point(|h| h.start < until);
        self.holidays[..right].iter().filter(move |h| h.end >= from)
    }

    /// Check a new or edited window against the rest of its weekday.
    /// `replacing` is the id being edited, which must not collide with itself.
    pub fn validate_window(&self, candidate: &TimeWindow, replacing: Option<Ulid>) -> Result<(), EngineError> {
        if candidate.start >= candidate.end {
            return Err(EngineError::Validation(format!(
                "window start {} must be before end {}",
                candidate.start, candidate.end
            )));
        }
        if candidate.capacity == 0 {
            return Err(EngineError::Validation("window capacity must be at least 1".into()));
        }
        if candidate.capacity > MAX_WINDOW_CAPACITY {
            return Err(EngineError::LimitExceeded("window capacity too large"));
        }
        let mut same_day = 0usize;
        for other in self.windows_for(candidate.weekday) {
            if Some(other.id) == replacing {
                continue;
            }
            same_day += 1;
            if other.overlaps(candidate) {
                return Err(EngineError::Validation(format!(
                    "window {}-{} overlaps window {} ({}-{}) on {}",
                    candidate.start, candidate.end, other.id, other.start, other.end, candidate.weekday
                )));
            }
        }
        if same_day >= MAX_WINDOWS_PER_WEEKDAY {
            return Err(EngineError::LimitExceeded("too many windows on weekday"));
        }
        Ok(())
    }

    pub fn validate_holiday(&self, holiday: &Holiday) -> Result<(), EngineError> {
        if holiday.start > holiday.end {
            return Err(EngineError::Validation(format!(
                "holiday start {} is after end {}",
                holiday.start, holiday.end
            )));
        }
        if (holiday.end - holiday.start).num_days() >= MAX_HOLIDAY_SPAN_DAYS {
            return Err(EngineError::LimitExceeded("holiday range too long"));
        }
        if let Some(ref l) = holiday.label
            && l.len() > MAX_LABEL_LEN {
                return Err(EngineError::LimitExceeded("holiday label too long"));
            }
        if self.holidays.len() >= MAX_HOLIDAYS {
            return Err(EngineError::LimitExceeded("too many holidays"));
        }
        Ok(())
    }

    /// Apply a configuration event. Ledger events are ignored.
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::WindowAdded { window } => {
                let pos = self
                    .windows
                    .partition_point(|w| window_key(w) <= window_key(window));
                self.windows.insert(pos, window.clone());
            }
            Event::WindowUpdated { id, start, end, capacity } => {
                if let Some(pos) = self.windows.iter().position(|w| w.id == *id) {
                    let mut w = self.windows.remove(pos);
                    w.start = *start;
                    w.end = *end;
                    w.capacity = *capacity;
                    self.apply(&Event::WindowAdded { window: w });
                }
            }
            Event::WindowRetired { id } => {
                if let Some(w) = self.windows.iter_mut().find(|w| w.id == *id) {
                    w.retired = true;
                }
            }
            Event::HolidayAdded { holiday } => {
                let pos = self.holidays.partition_point(|h| h.start <= holiday.start);
                self.holidays.insert(pos, holiday.clone());
            }
            Event::HolidayRemoved { id } => {
                self.holidays.retain(|h| h.id != *id);
            }
            Event::ResourceRegistered { .. }
            | Event::BookingCreated { .. }
            | Event::BookingStatusChanged { .. }
            | Event::BookingRescheduled { .. } => {}
        }
    }
}
