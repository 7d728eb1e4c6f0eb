use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, Months, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, used for audit timestamps.
pub type Ms = i64;

/// What a bookable resource is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// A vehicle booked for test drives.
    Vehicle,
    /// A service bay or technician slot booked for service visits.
    ServiceBay,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Vehicle => "vehicle",
            ResourceKind::ServiceBay => "service_bay",
        }
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vehicle" | "test_drive" => Ok(ResourceKind::Vehicle),
            "service_bay" | "service" | "bay" => Ok(ResourceKind::ServiceBay),
            other => Err(format!("unknown resource kind: {other}")),
        }
    }
}

/// A recurring bookable interval on one day of the week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub id: Ulid,
    pub weekday: Weekday,
    pub start: NaiveTime,
    pub end: NaiveTime,
    /// Max concurrent active bookings per resource.
    pub capacity: u32,
    /// Retired windows are no longer offered but still resolve for old bookings.
    pub retired: bool,
}

impl TimeWindow {
    pub fn new(id: Ulid, weekday: Weekday, start: NaiveTime, end: NaiveTime, capacity: u32) -> Self {
        Self {
            id,
            weekday,
            start,
            end,
            capacity,
            retired: false,
        }
    }

    /// Same weekday and the half-open time ranges intersect.
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.weekday == other.weekday && self.start < other.end && other.start < self.end
    }

    /// Whether this window can be booked on `date`.
    pub fn applies_to(&self, date: NaiveDate) -> bool {
        self.weekday == date.weekday()
    }

    /// Concrete `[start, end)` instants of this window on `date`.
    pub fn span_on(&self, date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
        (date.and_time(self.start), date.and_time(self.end))
    }
}

/// A blackout range of dates, inclusive on both ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holiday {
    pub id: Ulid,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub label: Option<String>,
}

impl Holiday {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Whether any day of this holiday falls in `[from, until)`.
    pub fn intersects(&self, from: NaiveDate, until: NaiveDate) -> bool {
        self.start < until && from <= self.end
    }
}

/// Booking lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl BookingStatus {
    /// Pending and confirmed bookings occupy capacity.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Cancelled) | (Confirmed, Completed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_ascii_uppercase())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "completed" => Ok(BookingStatus::Completed),
            "cancelled" | "canceled" => Ok(BookingStatus::Cancelled),
            other => Err(format!("unknown booking status: {other}")),
        }
    }
}

/// A reservation of one window on one date for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub resource_id: Ulid,
    pub date: NaiveDate,
    pub window_id: Ulid,
    pub status: BookingStatus,
    pub note: Option<String>,
    /// Actor id of whoever requested the booking.
    pub created_by: String,
    pub created_at: Ms,
    pub updated_at: Ms,
}

impl Booking {
    /// Active and holding exactly this `(date, window)` slot.
    pub fn occupies(&self, date: NaiveDate, window_id: Ulid) -> bool {
        self.status.is_active() && self.date == date && self.window_id == window_id
    }
}

/// Per-resource ledger state. Guarded by one lock per resource.
#[derive(Debug, Clone)]
pub struct ResourceState {
    pub id: Ulid,
    pub kind: ResourceKind,
    pub name: Option<String>,
    /// Every booking ever made on this resource, sorted by `date`.
    pub bookings: Vec<Booking>,
}

impl ResourceState {
    pub fn new(id: Ulid, kind: ResourceKind, name: Option<String>) -> Self {
        Self {
            id,
            kind,
            name,
            bookings: Vec::new(),
        }
    }

    /// Insert keeping date order; same-date bookings stay in arrival order.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self.bookings.partition_point(|b| b.date <= booking.date);
        self.bookings.insert(pos, booking);
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    /// Remove and return a booking, e.g. to re-insert it under a new date.
    pub fn take_booking(&mut self, id: Ulid) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Bookings whose date falls in `[from, until)`.
    pub fn between(&self, from: NaiveDate, until: NaiveDate) -> impl Iterator<Item = &Booking> {
        let lo = self.bookings.partition_point(|b| b.date < from);
        let hi = self.bookings.partition_point(|b| b.date < until);
        self.bookings[lo..hi.max(lo)].iter()
    }

    /// Active bookings holding `(date, window_id)`, skipping `exclude`.
    pub fn active_count(&self, date: NaiveDate, window_id: Ulid, exclude: Option<Ulid>) -> u32 {
        let next_day = date.succ_opt().unwrap_or(NaiveDate::MAX);
        self.between(date, next_day)
            .filter(|b| Some(b.id) != exclude && b.occupies(date, window_id))
            .count() as u32
    }
}

/// Journal record format. Every state change is exactly one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ResourceRegistered {
        id: Ulid,
        kind: ResourceKind,
        name: Option<String>,
    },
    WindowAdded {
        window: TimeWindow,
    },
    WindowUpdated {
        id: Ulid,
        start: NaiveTime,
        end: NaiveTime,
        capacity: u32,
    },
    WindowRetired {
        id: Ulid,
    },
    HolidayAdded {
        holiday: Holiday,
    },
    HolidayRemoved {
        id: Ulid,
    },
    BookingCreated {
        booking: Booking,
    },
    BookingStatusChanged {
        id: Ulid,
        resource_id: Ulid,
        status: BookingStatus,
        at: Ms,
    },
    BookingRescheduled {
        id: Ulid,
        resource_id: Ulid,
        date: NaiveDate,
        window_id: Ulid,
        at: Ms,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    pub id: Ulid,
    pub kind: ResourceKind,
    pub name: Option<String>,
}

/// One row of a "choose a time" listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotAvailability {
    pub window: TimeWindow,
    pub remaining: u32,
}

impl SlotAvailability {
    pub fn is_full(&self) -> bool {
        self.remaining == 0
    }
}

/// Kinds of calendar entries. Declaration order is the tie-break priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    Holiday,
    Booking,
    Task,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Holiday => "holiday",
            EntryKind::Booking => "booking",
            EntryKind::Task => "task",
        }
    }
}

impl FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "holiday" => Ok(EntryKind::Holiday),
            "booking" => Ok(EntryKind::Booking),
            "task" | "event" => Ok(EntryKind::Task),
            other => Err(format!("unknown calendar entry kind: {other}")),
        }
    }
}

/// A displayable calendar item. Built per request, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEntry {
    pub id: Ulid,
    pub kind: EntryKind,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub title: Option<String>,
    pub resource_id: Option<Ulid>,
    pub status: Option<BookingStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarView {
    Day,
    Week,
    Month,
}

impl CalendarView {
    /// Date range `[from, until)` shown by this view around `anchor`.
    /// Weeks start on Monday.
    pub fn range(&self, anchor: NaiveDate) -> (NaiveDate, NaiveDate) {
        match self {
            CalendarView::Day => (anchor, anchor + Days::new(1)),
            CalendarView::Week => {
                let back = anchor.weekday().num_days_from_monday() as u64;
                let from = anchor - Days::new(back);
                (from, from + Days::new(7))
            }
            CalendarView::Month => {
                let from = anchor.with_day(1).unwrap_or(anchor);
                (from, from + Months::new(1))
            }
        }
    }
}

impl FromStr for CalendarView {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "day" => Ok(CalendarView::Day),
            "week" => Ok(CalendarView::Week),
            "month" => Ok(CalendarView::Month),
            other => Err(format!("unknown calendar view: {other}")),
        }
    }
}

/// Which entry kinds a calendar request wants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum KindFilter {
    #[default]
    All,
    Include(Vec<EntryKind>),
    Exclude(Vec<EntryKind>),
}

impl KindFilter {
    pub fn admits(&self, kind: EntryKind) -> bool {
        match self {
            KindFilter::All => true,
            KindFilter::Include(kinds) => kinds.contains(&kind),
            KindFilter::Exclude(kinds) => !kinds.contains(&kind),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalendarFilter {
    pub kinds: KindFilter,
    /// Only bookings in one of these states. `None` means active bookings.
    pub statuses: Option<Vec<BookingStatus>>,
    /// Only bookings on this resource.
    pub resource_id: Option<Ulid>,
}

impl CalendarFilter {
    pub fn admits_booking(&self, booking: &Booking) -> bool {
        let status_ok = match &self.statuses {
            Some(statuses) => statuses.contains(&booking.status),
            None => booking.status.is_active(),
        };
        status_ok && self.resource_id.is_none_or(|rid| rid == booking.resource_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn time(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    fn booking_on(resource_id: Ulid, d: &str, window_id: Ulid, status: BookingStatus) -> Booking {
        Booking {
            id: Ulid::new(),
            resource_id,
            date: date(d),
            window_id,
            status,
            note: None,
            created_by: "alice".into(),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn window_overlap_is_half_open_and_per_weekday() {
        let a = TimeWindow::new(Ulid::new(), Weekday::Sat, time("10:00"), time("11:00"), 1);
        let b = TimeWindow::new(Ulid::new(), Weekday::Sat, time("10:30"), time("11:30"), 1);
        let c = TimeWindow::new(Ulid::new(), Weekday::Sat, time("11:00"), time("12:00"), 1);
        let d = TimeWindow::new(Ulid::new(), Weekday::Sun, time("10:00"), time("11:00"), 1);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent
        assert!(!a.overlaps(&d)); // different day
    }

    #[test]
    fn window_applies_to_matching_weekday() {
        let w = TimeWindow::new(Ulid::new(), Weekday::Sat, time("10:00"), time("11:00"), 1);
        assert!(w.applies_to(date("2024-03-02")));
        assert!(!w.applies_to(date("2024-03-03")));
        let (start, end) = w.span_on(date("2024-03-02"));
        assert_eq!(start, date("2024-03-02").and_time(time("10:00")));
        assert_eq!(end, date("2024-03-02").and_time(time("11:00")));
    }

    #[test]
    fn holiday_bounds_are_inclusive() {
        let h = Holiday {
            id: Ulid::new(),
            start: date("2024-12-24"),
            end: date("2024-12-26"),
            label: Some("Christmas".into()),
        };
        assert!(h.contains(date("2024-12-24")));
        assert!(h.contains(date("2024-12-26")));
        assert!(!h.contains(date("2024-12-27")));
        assert!(h.intersects(date("2024-12-26"), date("2024-12-30")));
        assert!(!h.intersects(date("2024-12-27"), date("2024-12-30")));
        assert!(!h.intersects(date("2024-12-20"), date("2024-12-24"))); // until is exclusive
    }

    #[test]
    fn legal_transitions() {
        use BookingStatus::*;
        let all = [Pending, Confirmed, Completed, Cancelled];
        let legal = [
            (Pending, Confirmed),
            (Pending, Cancelled),
            (Confirmed, Cancelled),
            (Confirmed, Completed),
        ];
        for from in all {
            for to in all {
                assert_eq!(from.can_transition_to(to), legal.contains(&(from, to)), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn status_parsing_accepts_both_spellings() {
        assert_eq!("CANCELED".parse::<BookingStatus>().unwrap(), BookingStatus::Cancelled);
        assert_eq!("cancelled".parse::<BookingStatus>().unwrap(), BookingStatus::Cancelled);
        assert!("archived".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn bookings_stay_sorted_by_date() {
        let rid = Ulid::new();
        let w = Ulid::new();
        let mut rs = ResourceState::new(rid, ResourceKind::Vehicle, None);
        rs.insert_booking(booking_on(rid, "2024-03-09", w, BookingStatus::Pending));
        rs.insert_booking(booking_on(rid, "2024-03-02", w, BookingStatus::Pending));
        rs.insert_booking(booking_on(rid, "2024-03-05", w, BookingStatus::Pending));
        let dates: Vec<_> = rs.bookings.iter().map(|b| b.date).collect();
        assert_eq!(dates, vec![date("2024-03-02"), date("2024-03-05"), date("2024-03-09")]);
    }

    #[test]
    fn between_is_half_open() {
        let rid = Ulid::new();
        let w = Ulid::new();
        let mut rs = ResourceState::new(rid, ResourceKind::Vehicle, None);
        for d in ["2024-03-01", "2024-03-02", "2024-03-03"] {
            rs.insert_booking(booking_on(rid, d, w, BookingStatus::Pending));
        }
        let hits: Vec<_> = rs.between(date("2024-03-02"), date("2024-03-03")).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].date, date("2024-03-02"));
        assert_eq!(rs.between(date("2024-04-01"), date("2024-04-02")).count(), 0);
    }

    #[test]
    fn active_count_ignores_inactive_excluded_and_other_windows() {
        let rid = Ulid::new();
        let w = Ulid::new();
        let other = Ulid::new();
        let mut rs = ResourceState::new(rid, ResourceKind::ServiceBay, None);
        let mine = booking_on(rid, "2024-03-02", w, BookingStatus::Confirmed);
        let mine_id = mine.id;
        rs.insert_booking(mine);
        rs.insert_booking(booking_on(rid, "2024-03-02", w, BookingStatus::Pending));
        rs.insert_booking(booking_on(rid, "2024-03-02", w, BookingStatus::Cancelled));
        rs.insert_booking(booking_on(rid, "2024-03-02", w, BookingStatus::Completed));
        rs.insert_booking(booking_on(rid, "2024-03-02", other, BookingStatus::Pending));
        rs.insert_booking(booking_on(rid, "2024-03-09", w, BookingStatus::Pending));

        assert_eq!(rs.active_count(date("2024-03-02"), w, None), 2);
        assert_eq!(rs.active_count(date("2024-03-02"), w, Some(mine_id)), 1);
    }

    #[test]
    fn take_booking_removes_it() {
        let rid = Ulid::new();
        let mut rs = ResourceState::new(rid, ResourceKind::Vehicle, None);
        let b = booking_on(rid, "2024-03-02", Ulid::new(), BookingStatus::Pending);
        let id = b.id;
        rs.insert_booking(b);
        assert!(rs.take_booking(id).is_some());
        assert!(rs.take_booking(id).is_none());
        assert!(rs.bookings.is_empty());
    }

    #[test]
    fn view_ranges() {
        // 2024-03-06 is a Wednesday
        let anchor = date("2024-03-06");
        assert_eq!(CalendarView::Day.range(anchor), (anchor, date("2024-03-07")));
        assert_eq!(CalendarView::Week.range(anchor), (date("2024-03-04"), date("2024-03-11")));
        assert_eq!(CalendarView::Month.range(anchor), (date("2024-03-01"), date("2024-04-01")));
        // Sunday belongs to the week that started the Monday before
        assert_eq!(
            CalendarView::Week.range(date("2024-03-10")),
            (date("2024-03-04"), date("2024-03-11"))
        );
    }

    #[test]
    fn entry_kind_priority_order() {
        assert!(EntryKind::Holiday < EntryKind::Booking);
        assert!(EntryKind::Booking < EntryKind::Task);
    }

    #[test]
    fn kind_filter() {
        assert!(KindFilter::All.admits(EntryKind::Task));
        let inc = KindFilter::Include(vec![EntryKind::Booking]);
        assert!(inc.admits(EntryKind::Booking));
        assert!(!inc.admits(EntryKind::Holiday));
        let exc = KindFilter::Exclude(vec![EntryKind::Task]);
        assert!(!exc.admits(EntryKind::Task));
        assert!(exc.admits(EntryKind::Holiday));
    }

    #[test]
    fn calendar_filter_defaults_to_active_bookings() {
        let rid = Ulid::new();
        let w = Ulid::new();
        let f = CalendarFilter::default();
        assert!(f.admits_booking(&booking_on(rid, "2024-03-02", w, BookingStatus::Pending)));
        assert!(!f.admits_booking(&booking_on(rid, "2024-03-02", w, BookingStatus::Cancelled)));

        let confirmed_only = CalendarFilter {
            statuses: Some(vec![BookingStatus::Confirmed]),
            ..Default::default()
        };
        assert!(!confirmed_only.admits_booking(&booking_on(rid, "2024-03-02", w, BookingStatus::Pending)));
        assert!(confirmed_only.admits_booking(&booking_on(rid, "2024-03-02", w, BookingStatus::Confirmed)));

        let other_resource = CalendarFilter {
            resource_id: Some(Ulid::new()),
            ..Default::default()
        };
        assert!(!other_resource.admits_booking(&booking_on(rid, "2024-03-02", w, BookingStatus::Pending)));
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::WindowAdded {
            window: TimeWindow::new(Ulid::new(), Weekday::Sat, time("10:00"), time("11:00"), 2),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
