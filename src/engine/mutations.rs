use chrono::{NaiveDate, NaiveTime};
use tracing::info;
use ulid::Ulid;

use crate::access::Actor;
use crate::limits::*;
use crate::model::*;
use crate::notify;

use super::conflict::{check_availability, now_ms, validate_date};
use super::{Engine, EngineError, Store};

/// A customer's request for one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    /// Client-chosen id, so a retried request can be recognised.
    pub id: Ulid,
    pub resource_id: Ulid,
    pub date: NaiveDate,
    pub window_id: Ulid,
    pub note: Option<String>,
}

/// A claimed booking id, released on drop unless the booking was stored.
/// Dropping also covers a create whose future is cancelled mid-flight.
struct IdClaim<'a> {
    store: &'a Store,
    id: Ulid,
    resource_id: Ulid,
    kept: bool,
}

impl<'a> IdClaim<'a> {
    fn take(store: &'a Store, id: Ulid, resource_id: Ulid) -> Result<Self, EngineError> {
        if !store.reserve_booking_id(id, resource_id) {
            return Err(EngineError::AlreadyExists(id));
        }
        Ok(Self {
            store,
            id,
            resource_id,
            kept: false,
        })
    }

    fn keep(mut self) {
        self.kept = true;
    }
}

impl Drop for IdClaim<'_> {
    fn drop(&mut self) {
        if !self.kept {
            self.store.release_booking_id(&self.id, self.resource_id);
        }
    }
}

fn check_actor(actor: &Actor) -> Result<(), EngineError> {
    if actor.id.is_empty() {
        return Err(EngineError::Validation("actor id is required".into()));
    }
    if actor.id.len() > MAX_ACTOR_LEN {
        return Err(EngineError::LimitExceeded("actor id too long"));
    }
    Ok(())
}

impl Engine {
    fn require_configure(&self, actor: &Actor) -> Result<(), EngineError> {
        if !self.policy.may_configure(actor) {
            return Err(EngineError::PermissionDenied(format!(
                "{} may not change scheduling configuration",
                actor.id
            )));
        }
        Ok(())
    }

    fn require_manage(&self, actor: &Actor, kind: ResourceKind) -> Result<(), EngineError> {
        if !self.policy.may_manage(actor, kind) {
            return Err(EngineError::PermissionDenied(format!(
                "{} may not manage {} bookings",
                actor.id,
                kind.as_str()
            )));
        }
        Ok(())
    }

    // ── Resources ────────────────────────────────────────────

    pub async fn register_resource(
        &self,
        id: Ulid,
        kind: ResourceKind,
        name: Option<String>,
        actor: &Actor,
    ) -> Result<ResourceInfo, EngineError> {
        self.require_configure(actor)?;
        if let Some(ref n) = name
            && n.len() > MAX_NAME_LEN {
                return Err(EngineError::LimitExceeded("resource name too long"));
            }

        let _registry = self.store.registry().lock().await;
        if self.store.resource_count() >= MAX_RESOURCES_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many resources"));
        }
        if self.store.contains_resource(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::ResourceRegistered {
            id,
            kind,
            name: name.clone(),
        };
        self.wal_append(&event).await?;
        self.store.insert_resource(ResourceState::new(id, kind, name.clone()));
        self.notify.send(id, &event);
        info!("registered {} resource {id}", kind.as_str());
        Ok(ResourceInfo { id, kind, name })
    }

    // ── Slot configuration ───────────────────────────────────

    pub async fn add_window(&self, window: TimeWindow, actor: &Actor) -> Result<TimeWindow, EngineError> {
        self.require_configure(actor)?;
        let window = TimeWindow { retired: false, ..window };

        let mut calendar = self.store.calendar().write().await;
        if calendar.window(window.id).is_some() {
            return Err(EngineError::AlreadyExists(window.id));
        }
        calendar.validate_window(&window, None)?;

        let event = Event::WindowAdded { window: window.clone() };
        self.persist_config(&mut calendar, &event).await?;
        Ok(window)
    }

    /// Change a window's times or capacity. Existing bookings are kept even
    /// if the new capacity is below what is already booked.
    pub async fn update_window(
        &self,
        id: Ulid,
        start: Option<NaiveTime>,
        end: Option<NaiveTime>,
        capacity: Option<u32>,
        actor: &Actor,
    ) -> Result<TimeWindow, EngineError> {
        self.require_configure(actor)?;
        let mut calendar = self.store.calendar().write().await;
        let current = calendar.window(id).ok_or(EngineError::NotFound(id))?;
        if current.retired {
            return Err(EngineError::Validation(format!("window {id} is retired")));
        }
        let edited = TimeWindow {
            start: start.unwrap_or(current.start),
            end: end.unwrap_or(current.end),
            capacity: capacity.unwrap_or(current.capacity),
            ..current.clone()
        };
        calendar.validate_window(&edited, Some(id))?;

        let event = Event::WindowUpdated {
            id,
            start: edited.start,
            end: edited.end,
            capacity: edited.capacity,
        };
        self.persist_config(&mut calendar, &event).await?;
        Ok(edited)
    }

    /// Stop offering a window. Bookings already made in it still resolve.
    pub async fn retire_window(&self, id: Ulid, actor: &Actor) -> Result<(), EngineError> {
        self.require_configure(actor)?;
        let mut calendar = self.store.calendar().write().await;
        let window = calendar.window(id).ok_or(EngineError::NotFound(id))?;
        if window.retired {
            return Ok(());
        }
        self.persist_config(&mut calendar, &Event::WindowRetired { id }).await
    }

    /// Save a holiday. It blocks new bookings from the moment this returns;
    /// bookings already on those dates are left alone.
    pub async fn add_holiday(&self, holiday: Holiday, actor: &Actor) -> Result<Holiday, EngineError> {
        self.require_configure(actor)?;
        validate_date(holiday.start)?;
        validate_date(holiday.end)?;

        let mut calendar = self.store.calendar().write().await;
        if calendar.holiday(holiday.id).is_some() {
            return Err(EngineError::AlreadyExists(holiday.id));
        }
        calendar.validate_holiday(&holiday)?;

        let event = Event::HolidayAdded { holiday: holiday.clone() };
        self.persist_config(&mut calendar, &event).await?;
        info!("holiday {} saved: {} to {}", holiday.id, holiday.start, holiday.end);
        Ok(holiday)
    }

    pub async fn remove_holiday(&self, id: Ulid, actor: &Actor) -> Result<(), EngineError> {
        self.require_configure(actor)?;
        let mut calendar = self.store.calendar().write().await;
        if calendar.holiday(id).is_none() {
            return Err(EngineError::NotFound(id));
        }
        self.persist_config(&mut calendar, &Event::HolidayRemoved { id }).await
    }

    // ── Booking ledger ───────────────────────────────────────

    /// Check and insert as one step: the resource stays write-locked from
    /// the capacity check until the booking is journaled and applied.
    pub async fn create_booking(&self, req: NewBooking, actor: &Actor) -> Result<Booking, EngineError> {
        check_actor(actor)?;
        if let Some(ref n) = req.note
            && n.len() > MAX_NOTE_LEN {
                return Err(EngineError::LimitExceeded("booking note too long"));
            }
        let rs = self
            .store
            .get_resource(&req.resource_id)
            .ok_or(EngineError::NotFound(req.resource_id))?;

        let mut guard = rs.write().await;
        // Claimed across all resources, not just this one.
        let claim = IdClaim::take(&self.store, req.id, req.resource_id)?;
        let booking = self.admit_reserved(req, actor, &mut guard).await?;
        claim.keep();
        drop(guard);

        metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(1);
        notify::dispatch(self.notifier.clone(), booking.clone());
        Ok(booking)
    }

    /// The rest of `create_booking` once the id is claimed. An error here
    /// means nothing was journaled.
    async fn admit_reserved(
        &self,
        req: NewBooking,
        actor: &Actor,
        rs: &mut ResourceState,
    ) -> Result<Booking, EngineError> {
        if rs.bookings.len() >= MAX_BOOKINGS_PER_RESOURCE {
            return Err(EngineError::LimitExceeded("too many bookings on resource"));
        }

        // Held until the booking is applied, so a holiday saved meanwhile
        // cannot slip between the check and the insert.
        let calendar = self.store.calendar().read().await;
        let verdict = check_availability(&calendar, rs, req.date, req.window_id, None)?;
        if let Some(reason) = verdict.reason {
            metrics::counter!(crate::observability::BOOKING_REJECTIONS_TOTAL, "reason" => reason.as_str())
                .increment(1);
        }
        verdict.into_result(req.date)?;

        let now = now_ms();
        let booking = Booking {
            id: req.id,
            resource_id: req.resource_id,
            date: req.date,
            window_id: req.window_id,
            status: BookingStatus::Pending,
            note: req.note,
            created_by: actor.id.clone(),
            created_at: now,
            updated_at: now,
        };
        let event = Event::BookingCreated { booking: booking.clone() };
        self.persist_and_apply(req.resource_id, rs, &event).await?;
        drop(calendar);
        Ok(booking)
    }

    /// Move a booking along its lifecycle. Confirmations and cancellations
    /// trigger a notification; delivery failures never undo the change.
    pub async fn update_booking_status(
        &self,
        id: Ulid,
        status: BookingStatus,
        actor: &Actor,
    ) -> Result<Booking, EngineError> {
        check_actor(actor)?;
        let (resource_id, mut guard) = self.resolve_booking_write(&id).await?;
        self.require_manage(actor, guard.kind)?;

        let current = guard.booking(id).ok_or(EngineError::NotFound(id))?.status;
        if !current.can_transition_to(status) {
            return Err(EngineError::InvalidTransition { from: current, to: status });
        }

        let event = Event::BookingStatusChanged {
            id,
            resource_id,
            status,
            at: now_ms(),
        };
        self.persist_and_apply(resource_id, &mut guard, &event).await?;
        let booking = guard.booking(id).cloned().ok_or(EngineError::NotFound(id))?;
        drop(guard);

        info!("booking {id} on {resource_id}: {current} -> {status} by {}", actor.id);
        if matches!(status, BookingStatus::Confirmed | BookingStatus::Cancelled) {
            notify::dispatch(self.notifier.clone(), booking.clone());
        }
        Ok(booking)
    }

    pub async fn cancel_booking(&self, id: Ulid, actor: &Actor) -> Result<Booking, EngineError> {
        self.update_booking_status(id, BookingStatus::Cancelled, actor).await
    }

    /// Move an active booking to another slot on the same resource. The
    /// target goes through the same check as a new booking, minus the
    /// booking itself. The status is kept. A missing `date` or `window_id`
    /// keeps the booking's current one, read under the same lock.
    pub async fn reschedule_booking(
        &self,
        id: Ulid,
        date: Option<NaiveDate>,
        window_id: Option<Ulid>,
        actor: &Actor,
    ) -> Result<Booking, EngineError> {
        check_actor(actor)?;
        let (resource_id, mut guard) = self.resolve_booking_write(&id).await?;
        self.require_manage(actor, guard.kind)?;

        let current = guard.booking(id).ok_or(EngineError::NotFound(id))?;
        if current.status.is_terminal() {
            return Err(EngineError::InvalidTransition {
                from: current.status,
                to: current.status,
            });
        }
        let date = date.unwrap_or(current.date);
        let window_id = window_id.unwrap_or(current.window_id);
        if current.date == date && current.window_id == window_id {
            return Ok(current.clone());
        }

        let calendar = self.store.calendar().read().await;
        let verdict = check_availability(&calendar, &guard, date, window_id, Some(id))?;
        if let Some(reason) = verdict.reason {
            metrics::counter!(crate::observability::BOOKING_REJECTIONS_TOTAL, "reason" => reason.as_str())
                .increment(1);
        }
        verdict.into_result(date)?;

        let event = Event::BookingRescheduled {
            id,
            resource_id,
            date,
            window_id,
            at: now_ms(),
        };
        self.persist_and_apply(resource_id, &mut guard, &event).await?;
        drop(calendar);
        let booking = guard.booking(id).cloned().ok_or(EngineError::NotFound(id))?;
        drop(guard);

        notify::dispatch(self.notifier.clone(), booking.clone());
        Ok(booking)
    }
}
