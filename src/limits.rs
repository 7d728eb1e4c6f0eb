// Hard limits. Anything beyond these is rejected with LIMIT_EXCEEDED.

pub const MAX_RESOURCES_PER_TENANT: usize = 100_000;
pub const MAX_BOOKINGS_PER_RESOURCE: usize = 100_000;
pub const MAX_WINDOWS_PER_WEEKDAY: usize = 96;
pub const MAX_HOLIDAYS: usize = 10_000;
pub const MAX_HOLIDAY_SPAN_DAYS: i64 = 366;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_LABEL_LEN: usize = 256;
pub const MAX_NOTE_LEN: usize = 2_048;
pub const MAX_ACTOR_LEN: usize = 128;

pub const MIN_BOOKABLE_YEAR: i32 = 2000;
pub const MAX_BOOKABLE_YEAR: i32 = 2200;

pub const MAX_TENANTS: usize = 256;
pub const MAX_TENANT_NAME_LEN: usize = 64;

pub const MAX_WINDOW_CAPACITY: u32 = 1_000;
