use ulid::Ulid;

use crate::model::{Ms, Reservation, Span, format_ms};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    InvalidRange {
        start: Ms,
        end: Ms,
    },
    InvalidRecurrence {
        start: Ms,
        until: Ms,
    },
    /// An occurrence of the request collides with an existing reservation.
    /// Nothing from the request was committed.
    Conflict {
        occurrence_index: usize,
        occurrence: Span,
        existing: Box<Reservation>,
    },
    /// Two occurrences of the same request overlap each other.
    OverlappingOccurrences {
        first: usize,
        second: usize,
    },
    NotFound(Ulid),
    AlreadyExists(Ulid),
    HasReservations(Ulid),
    LimitExceeded(&'static str),
    InvalidRecord(String),
    JournalError(String),
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingError::InvalidRange { start, end } => {
                write!(f, "invalid range: end {end} is not after start {start}")
            }
            BookingError::InvalidRecurrence { start, until } => write!(
                f,
                "invalid recurrence: until {} precedes start {}",
                format_ms(*until),
                format_ms(*start)
            ),
            BookingError::Conflict {
                occurrence_index,
                occurrence,
                existing,
            } => write!(
                f,
                "room busy {}, booked by {} (\"{}\"); requested occurrence #{} at {} conflicts",
                existing.span, existing.organizer, existing.title, occurrence_index, occurrence
            ),
            BookingError::OverlappingOccurrences { first, second } => {
                write!(f, "occurrences #{first} and #{second} of the request overlap")
            }
            BookingError::NotFound(id) => write!(f, "not found: {id}"),
            BookingError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            BookingError::HasReservations(id) => {
                write!(f, "cannot delete room {id}: it still has reservations")
            }
            BookingError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            BookingError::InvalidRecord(msg) => write!(f, "invalid record: {msg}"),
            BookingError::JournalError(e) => write!(f, "journal error: {e}"),
        }
    }
}

impl std::error::Error for BookingError {}
