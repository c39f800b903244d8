use crate::model::Ms;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// A single occurrence may not span more than 7 days.
pub const MAX_SPAN_DURATION_MS: Ms = 7 * 24 * 3_600_000;

pub const MAX_OCCURRENCES_PER_REQUEST: usize = 1_000;
pub const MAX_RESERVATIONS_PER_RESOURCE: usize = 100_000;
pub const MAX_ROOMS: usize = 10_000;

pub const MAX_TITLE_LEN: usize = 256;
pub const MAX_ORGANIZER_LEN: usize = 128;
pub const MAX_NAME_LEN: usize = 128;
pub const MAX_EQUIPMENT_TAGS: usize = 64;

/// Upper bound on the window accepted by free-slot and room-search queries.
pub const MAX_QUERY_WINDOW_MS: Ms = 366 * 24 * 3_600_000;
