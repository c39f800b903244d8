use std::collections::BTreeSet;
use std::fmt;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::BookingError;

/// Unix milliseconds (UTC). The only time type.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;
pub const HOUR_MS: Ms = 60 * MINUTE_MS;
pub const DAY_MS: Ms = 24 * HOUR_MS;

/// Render an instant for humans, e.g. in conflict messages.
pub fn format_ms(t: Ms) -> String {
    match DateTime::from_timestamp_millis(t) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M UTC").to_string(),
        None => t.to_string(),
    }
}

/// Half-open interval `[start, end)`. Always non-empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawSpan")]
pub struct Span {
    start: Ms,
    end: Ms,
}

#[derive(Deserialize)]
struct RawSpan {
    start: Ms,
    end: Ms,
}

impl TryFrom<RawSpan> for Span {
    type Error = BookingError;

    fn try_from(raw: RawSpan) -> Result<Self, Self::Error> {
        Span::new(raw.start, raw.end)
    }
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Result<Self, BookingError> {
        if end <= start {
            return Err(BookingError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> Ms {
        self.start
    }

    pub fn end(&self) -> Ms {
        self.end
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Same duration, moved by `delta` ms.
    pub fn shifted_by(&self, delta: Ms) -> Result<Self, BookingError> {
        match (self.start.checked_add(delta), self.end.checked_add(delta)) {
            (Some(start), Some(end)) => Ok(Self { start, end }),
            _ => Err(BookingError::LimitExceeded("timestamp out of range")),
        }
    }

    /// Used by the interval algebra, which only ever produces non-empty spans.
    pub(crate) fn from_bounds(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", format_ms(self.start), format_ms(self.end))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecurrencePattern {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
}

/// How a single booking request repeats. `until` bounds occurrence starts (inclusive)
/// and is ignored for `RecurrencePattern::None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub pattern: RecurrencePattern,
    pub until: Ms,
}

impl RecurrenceRule {
    pub fn new(pattern: RecurrencePattern, until: Ms) -> Self {
        Self { pattern, until }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn daily(until: Ms) -> Self {
        Self::new(RecurrencePattern::Daily, until)
    }

    pub fn weekly(until: Ms) -> Self {
        Self::new(RecurrencePattern::Weekly, until)
    }

    pub fn monthly(until: Ms) -> Self {
        Self::new(RecurrencePattern::Monthly, until)
    }

    pub fn is_recurring(&self) -> bool {
        self.pattern != RecurrencePattern::None
    }
}

/// A bookable meeting room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Ulid,
    pub name: String,
    pub capacity: u32,
    pub location: Option<String>,
    /// Capability tags such as `projector` or `video`.
    pub equipment: BTreeSet<String>,
}

impl Room {
    pub fn new(id: Ulid, name: impl Into<String>, capacity: u32) -> Self {
        Self {
            id,
            name: name.into(),
            capacity,
            location: None,
            equipment: BTreeSet::new(),
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_equipment<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.equipment.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn has_equipment(&self, required: &BTreeSet<String>) -> bool {
        required.is_subset(&self.equipment)
    }
}

/// One committed occurrence on a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub resource_id: Ulid,
    pub span: Span,
    pub title: String,
    pub organizer: String,
    /// Shared by every occurrence generated from one recurring request.
    pub series_id: Option<Ulid>,
}

/// Flat persisted form of a reservation, as exchanged with external stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationRecord {
    pub id: Ulid,
    pub resource_id: Ulid,
    pub start: Ms,
    pub end: Ms,
    #[serde(default)]
    pub recurrence_group_id: Option<Ulid>,
    pub title: String,
    pub organizer: String,
}

impl From<&Reservation> for ReservationRecord {
    fn from(r: &Reservation) -> Self {
        Self {
            id: r.id,
            resource_id: r.resource_id,
            start: r.span.start(),
            end: r.span.end(),
            recurrence_group_id: r.series_id,
            title: r.title.clone(),
            organizer: r.organizer.clone(),
        }
    }
}

impl TryFrom<ReservationRecord> for Reservation {
    type Error = BookingError;

    fn try_from(record: ReservationRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: record.id,
            resource_id: record.resource_id,
            span: Span::new(record.start, record.end)?,
            title: record.title,
            organizer: record.organizer,
            series_id: record.recurrence_group_id,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub resource_id: Ulid,
    pub start: Ms,
    pub end: Ms,
    pub recurrence: RecurrenceRule,
    pub title: String,
    pub organizer: String,
}

impl BookingRequest {
    pub fn new(
        resource_id: Ulid,
        start: Ms,
        end: Ms,
        title: impl Into<String>,
        organizer: impl Into<String>,
    ) -> Self {
        Self {
            resource_id,
            start,
            end,
            recurrence: RecurrenceRule::none(),
            title: title.into(),
            organizer: organizer.into(),
        }
    }

    pub fn with_recurrence(mut self, recurrence: RecurrenceRule) -> Self {
        self.recurrence = recurrence;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelScope {
    /// Only the referenced reservation.
    Occurrence,
    /// Every reservation sharing the referenced reservation's series.
    Series,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictResult {
    NoConflict,
    Conflict(Reservation),
}

impl ConflictResult {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ConflictResult::Conflict(_))
    }
}

/// Derived view of one resource at one instant. Never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilitySnapshot {
    pub resource_id: Ulid,
    pub as_of: Ms,
    pub current: Option<Reservation>,
    pub next: Option<Reservation>,
    pub is_free_now: bool,
    /// First instant at or after `as_of` when the resource is not busy.
    pub next_free_at: Ms,
}

/// Journal record format. A multi-occurrence booking is a single `Booked` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomCreated {
        room: Room,
    },
    RoomUpdated {
        room: Room,
    },
    RoomDeleted {
        id: Ulid,
    },
    Booked {
        resource_id: Ulid,
        reservations: Vec<Reservation>,
    },
    Cancelled {
        resource_id: Ulid,
        ids: Vec<Ulid>,
    },
    Rescheduled {
        id: Ulid,
        resource_id: Ulid,
        span: Span,
    },
}

impl Event {
    pub fn resource_id(&self) -> Ulid {
        match self {
            Event::RoomCreated { room } | Event::RoomUpdated { room } => room.id,
            Event::RoomDeleted { id } => *id,
            Event::Booked { resource_id, .. }
            | Event::Cancelled { resource_id, .. }
            | Event::Rescheduled { resource_id, .. } => *resource_id,
        }
    }
}
