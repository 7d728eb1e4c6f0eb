use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{Mutex, RwLock};
use tracing::warn;
use ulid::Ulid;

use crate::model::*;

use super::slots::SlotCalendar;

pub type SharedResourceState = Arc<RwLock<ResourceState>>;

/// In-memory record store: one lock per resource for the ledger, one lock
/// for slot configuration.
///
/// Lock order: a resource lock (lowest id first when taking several) before
/// the calendar lock. Never wait on a resource lock while holding the
/// calendar lock.
pub struct Store {
    resources: DashMap<Ulid, SharedResourceState>,
    booking_to_resource: DashMap<Ulid, Ulid>,
    calendar: RwLock<SlotCalendar>,
    /// Serializes resource registration against compaction snapshots.
    registry: Mutex<()>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            resources: DashMap::new(),
            booking_to_resource: DashMap::new(),
            calendar: RwLock::new(SlotCalendar::new()),
            registry: Mutex::new(()),
        }
    }

    // ── Resources ────────────────────────────────────────────

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn contains_resource(&self, id: &Ulid) -> bool {
        self.resources.contains_key(id)
    }

    pub fn get_resource(&self, id: &Ulid) -> Option<SharedResourceState> {
        self.resources.get(id).map(|e| e.value().clone())
    }

    pub fn insert_resource(&self, state: ResourceState) {
        self.resources.insert(state.id, Arc::new(RwLock::new(state)));
    }

    /// Sorted, so callers locking several resources agree on the order.
    pub fn resource_ids(&self) -> Vec<Ulid> {
        let mut ids: Vec<Ulid> = self.resources.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    pub fn registry(&self) -> &Mutex<()> {
        &self.registry
    }

    // ── Booking index ────────────────────────────────────────

    pub fn resource_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_resource.get(booking_id).map(|e| *e.value())
    }

    /// Claim a booking id for `resource_id`. False if any resource already
    /// holds it. Ids are unique per dealership, not per resource, so the
    /// claim cannot rely on the resource lock alone.
    pub fn reserve_booking_id(&self, booking_id: Ulid, resource_id: Ulid) -> bool {
        match self.booking_to_resource.entry(booking_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(resource_id);
                true
            }
        }
    }

    /// Undo a claim whose booking never made it into the journal.
    pub fn release_booking_id(&self, booking_id: &Ulid, resource_id: Ulid) {
        self.booking_to_resource.remove_if(booking_id, |_, owner| *owner == resource_id);
    }

    // ── Slot configuration ───────────────────────────────────

    pub fn calendar(&self) -> &RwLock<SlotCalendar> {
        &self.calendar
    }

    // ── Event application ────────────────────────────────────

    /// Apply a ledger event to a resource the caller has write-locked.
    pub fn apply_event(&self, rs: &mut ResourceState, event: &Event) {
        match event {
            Event::BookingCreated { booking } => {
                let owner = *self
                    .booking_to_resource
                    .entry(booking.id)
                    .or_insert(booking.resource_id);
                if owner != booking.resource_id {
                    warn!(
                        "booking {} already belongs to resource {owner}, copy on {} ignored",
                        booking.id, booking.resource_id
                    );
                    return;
                }
                rs.insert_booking(booking.clone());
            }
            Event::BookingStatusChanged { id, status, at, .. } => {
                if let Some(b) = rs.booking_mut(*id) {
                    b.status = *status;
                    b.updated_at = *at;
                }
            }
            Event::BookingRescheduled {
                id,
                date,
                window_id,
                at,
                ..
            } => {
                if let Some(mut b) = rs.take_booking(*id) {
                    b.date = *date;
                    b.window_id = *window_id;
                    b.updated_at = *at;
                    rs.insert_booking(b);
                }
            }
            Event::ResourceRegistered { .. }
            | Event::WindowAdded { .. }
            | Event::WindowUpdated { .. }
            | Event::WindowRetired { .. }
            | Event::HolidayAdded { .. }
            | Event::HolidayRemoved { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn booking(resource_id: Ulid, d: u32) -> Booking {
        Booking {
            id: Ulid::new(),
            resource_id,
            date: NaiveDate::from_ymd_opt(2024, 3, d).unwrap(),
            window_id: Ulid::new(),
            status: BookingStatus::Pending,
            note: None,
            created_by: "erin".into(),
            created_at: 1,
            updated_at: 1,
        }
    }

    #[tokio::test]
    async fn apply_create_indexes_booking() {
        let store = Store::new();
        let rid = Ulid::new();
        store.insert_resource(ResourceState::new(rid, ResourceKind::Vehicle, None));
        let b = booking(rid, 2);
        let bid = b.id;

        let rs = store.get_resource(&rid).unwrap();
        let mut guard = rs.write().await;
        store.apply_event(&mut guard, &Event::BookingCreated { booking: b });

        assert_eq!(store.resource_for_booking(&bid), Some(rid));
        assert_eq!(guard.bookings.len(), 1);
    }

    #[test]
    fn booking_id_claimed_once() {
        let store = Store::new();
        let (r1, r2) = (Ulid::new(), Ulid::new());
        let bid = Ulid::new();

        assert!(store.reserve_booking_id(bid, r1));
        assert!(!store.reserve_booking_id(bid, r2));
        assert!(!store.reserve_booking_id(bid, r1));
        assert_eq!(store.resource_for_booking(&bid), Some(r1));

        // only the owner can release
        store.release_booking_id(&bid, r2);
        assert_eq!(store.resource_for_booking(&bid), Some(r1));
        store.release_booking_id(&bid, r1);
        assert_eq!(store.resource_for_booking(&bid), None);
        assert!(store.reserve_booking_id(bid, r2));
    }

    #[test]
    fn duplicate_create_on_other_resource_ignored() {
        let store = Store::new();
        let (r1, r2) = (Ulid::new(), Ulid::new());
        let mut first = ResourceState::new(r1, ResourceKind::Vehicle, None);
        let mut second = ResourceState::new(r2, ResourceKind::Vehicle, None);
        let original = booking(r1, 2);
        let copy = Booking {
            resource_id: r2,
            ..original.clone()
        };

        store.apply_event(&mut first, &Event::BookingCreated { booking: original.clone() });
        store.apply_event(&mut second, &Event::BookingCreated { booking: copy });

        assert_eq!(store.resource_for_booking(&original.id), Some(r1));
        assert_eq!(first.bookings.len(), 1);
        assert!(second.bookings.is_empty());
    }

    #[tokio::test]
    async fn apply_status_and_reschedule() {
        let store = Store::new();
        let rid = Ulid::new();
        let mut rs = ResourceState::new(rid, ResourceKind::ServiceBay, None);
        let early = booking(rid, 2);
        let moving = booking(rid, 3);
        let moving_id = moving.id;
        store.apply_event(&mut rs, &Event::BookingCreated { booking: early });
        store.apply_event(&mut rs, &Event::BookingCreated { booking: moving });

        store.apply_event(
            &mut rs,
            &Event::BookingStatusChanged {
                id: moving_id,
                resource_id: rid,
                status: BookingStatus::Confirmed,
                at: 5,
            },
        );
        let new_window = Ulid::new();
        store.apply_event(
            &mut rs,
            &Event::BookingRescheduled {
                id: moving_id,
                resource_id: rid,
                date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                window_id: new_window,
                at: 6,
            },
        );

        // moved ahead of the other booking and kept its status
        assert_eq!(rs.bookings[0].id, moving_id);
        assert_eq!(rs.bookings[0].status, BookingStatus::Confirmed);
        assert_eq!(rs.bookings[0].window_id, new_window);
        assert_eq!(rs.bookings[0].updated_at, 6);
    }

    #[test]
    fn resource_ids_sorted() {
        let store = Store::new();
        for _ in 0..5 {
            store.insert_resource(ResourceState::new(Ulid::new(), ResourceKind::Vehicle, None));
        }
        let ids = store.resource_ids();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(store.resource_count(), 5);
    }
}
