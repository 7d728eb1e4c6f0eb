use chrono::{NaiveDate, NaiveTime, Weekday};
use ulid::Ulid;

use crate::model::*;

use super::aggregate::aggregate;
use super::availability::plan_day;
use super::conflict::validate_date;
use super::{Engine, EngineError};

impl Engine {
    /// Windows offered for `resource_id` on `date` with remaining capacity.
    /// Full windows are included with `remaining == 0`; a holiday yields nothing.
    pub async fn get_availability(
        &self,
        resource_id: Ulid,
        date: NaiveDate,
    ) -> Result<Vec<SlotAvailability>, EngineError> {
        validate_date(date)?;
        let rs = self
            .store
            .get_resource(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;
        let guard = rs.read().await;
        let calendar = self.store.calendar().read().await;
        Ok(plan_day(&calendar, &guard, date).collect())
    }

    /// Merged bookings, holidays and tasks for the view around `anchor`.
    pub async fn get_calendar(
        &self,
        view: CalendarView,
        anchor: NaiveDate,
        filter: &CalendarFilter,
    ) -> Result<Vec<CalendarEntry>, EngineError> {
        validate_date(anchor)?;
        let (from, until) = view.range(anchor);

        let resource_ids = match filter.resource_id {
            Some(rid) if !self.store.contains_resource(&rid) => return Err(EngineError::NotFound(rid)),
            Some(rid) => vec![rid],
            None => self.store.resource_ids(),
        };

        // One resource at a time, released before the calendar is read.
        let mut bookings = Vec::new();
        if filter.kinds.admits(EntryKind::Booking) {
            for rid in resource_ids {
                let Some(rs) = self.store.get_resource(&rid) else { continue };
                let guard = rs.read().await;
                bookings.extend(guard.between(from, until).filter(|b| filter.admits_booking(b)).cloned());
            }
        }

        let tasks = if filter.kinds.admits(EntryKind::Task) {
            self.tasks
                .tasks_between(from.and_time(NaiveTime::MIN), until.and_time(NaiveTime::MIN))
                .await
                .map_err(|e| EngineError::TaskFeed(e.to_string()))?
        } else {
            Vec::new()
        };

        let calendar = self.store.calendar().read().await;
        Ok(aggregate(&calendar, &bookings, &tasks, from, until, filter))
    }

    pub async fn get_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        let resource_id = self.store.resource_for_booking(&id).ok_or(EngineError::NotFound(id))?;
        let rs = self
            .store
            .get_resource(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;
        let guard = rs.read().await;
        guard.booking(id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Bookings on a resource, optionally narrowed to one date and a set of states.
    pub async fn list_bookings(
        &self,
        resource_id: Ulid,
        date: Option<NaiveDate>,
        statuses: Option<&[BookingStatus]>,
    ) -> Result<Vec<Booking>, EngineError> {
        let rs = self
            .store
            .get_resource(&resource_id)
            .ok_or(EngineError::NotFound(resource_id))?;
        let guard = rs.read().await;
        let status_ok = |b: &Booking| statuses.is_none_or(|s| s.contains(&b.status));
        let out = match date {
            Some(d) => {
                let next = d.succ_opt().unwrap_or(NaiveDate::MAX);
                guard.between(d, next).filter(|b| status_ok(b)).cloned().collect()
            }
            None => guard.bookings.iter().filter(|b| status_ok(b)).cloned().collect(),
        };
        Ok(out)
    }

    pub async fn list_resources(&self) -> Vec<ResourceInfo> {
        let mut out = Vec::new();
        for id in self.store.resource_ids() {
            if let Some(rs) = self.store.get_resource(&id) {
                let guard = rs.read().await;
                out.push(ResourceInfo {
                    id: guard.id,
                    kind: guard.kind,
                    name: guard.name.clone(),
                });
            }
        }
        out
    }

    /// Offered windows on `weekday`, or every window (retired included) when `None`.
    pub async fn list_windows(&self, weekday: Option<Weekday>) -> Vec<TimeWindow> {
        let calendar = self.store.calendar().read().await;
        match weekday {
            Some(day) => calendar.windows_for(day).cloned().collect(),
            None => calendar.windows().to_vec(),
        }
    }

    pub async fn list_holidays(&self) -> Vec<Holiday> {
        self.store.calendar().read().await.holidays().to_vec()
    }
}
