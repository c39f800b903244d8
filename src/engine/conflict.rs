use ulid::Ulid;

use crate::model::*;

use super::BookingError;
use super::store::ReservationStore;

pub(crate) fn now_ms() -> Ms {
    chrono::Utc::now().timestamp_millis()
}

pub(crate) fn validate_span(span: &Span) -> Result<(), BookingError> {
    use crate::limits::*;
    if span.start() < MIN_VALID_TIMESTAMP_MS || span.end() > MAX_VALID_TIMESTAMP_MS {
        return Err(BookingError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(BookingError::LimitExceeded("span too wide"));
    }
    Ok(())
}

/// Find the reservation on `resource_id` that blocks `candidate`.
///
/// When several overlap, the one with the earliest start is reported (ties by id);
/// any overlap at all is enough to reject. `exclude` skips one reservation so a
/// reschedule never collides with itself.
pub fn check_conflict(
    store: &ReservationStore,
    resource_id: Ulid,
    candidate: &Span,
    exclude: Option<Ulid>,
) -> ConflictResult {
    store
        .list_by_resource(resource_id)
        .iter()
        .filter(|r| Some(r.id) != exclude)
        .filter(|r| r.span.overlaps(candidate))
        .min_by_key(|r| (r.span.start(), r.id))
        .map_or(ConflictResult::NoConflict, |r| ConflictResult::Conflict(r.clone()))
}

/// Check every occurrence of a request; the first one (in expansion order) that
/// conflicts is reported together with its index.
pub fn check_occurrences(
    store: &ReservationStore,
    resource_id: Ulid,
    occurrences: &[Span],
    exclude: Option<Ulid>,
) -> Result<(), BookingError> {
    for (occurrence_index, occurrence) in occurrences.iter().enumerate() {
        if let ConflictResult::Conflict(existing) =
            check_conflict(store, resource_id, occurrence, exclude)
        {
            return Err(BookingError::Conflict {
                occurrence_index,
                occurrence: *occurrence,
                existing: Box::new(existing),
            });
        }
    }
    Ok(())
}

/// Occurrences of one request must not overlap each other. Input is sorted by start.
pub(crate) fn check_self_overlap(occurrences: &[Span]) -> Result<(), BookingError> {
    for (i, pair) in occurrences.windows(2).enumerate() {
        if pair[0].overlaps(&pair[1]) {
            return Err(BookingError::OverlappingOccurrences {
                first: i,
                second: i + 1,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: Ms = HOUR_MS;

    fn span(start: Ms, end: Ms) -> Span {
        Span::new(start, end).unwrap()
    }

    fn book(store: &mut ReservationStore, resource_id: Ulid, start: Ms, end: Ms) -> Reservation {
        let r = Reservation {
            id: Ulid::new(),
            resource_id,
            span: span(start, end),
            title: "Meeting".into(),
            organizer: "Kim".into(),
            series_id: None,
        };
        store.insert(r.clone()).unwrap();
        r
    }

    #[test]
    fn empty_resource_never_conflicts() {
        let store = ReservationStore::new();
        let result = check_conflict(&store, Ulid::new(), &span(0, H), None);
        assert_eq!(result, ConflictResult::NoConflict);
    }

    #[test]
    fn adjacent_does_not_conflict() {
        let mut store = ReservationStore::new();
        let rid = Ulid::new();
        book(&mut store, rid, 9 * H, 10 * H);
        assert!(!check_conflict(&store, rid, &span(10 * H, 11 * H), None).is_conflict());
        assert!(!check_conflict(&store, rid, &span(8 * H, 9 * H), None).is_conflict());
    }

    #[test]
    fn overlap_reports_existing() {
        let mut store = ReservationStore::new();
        let rid = Ulid::new();
        let existing = book(&mut store, rid, 9 * H, 10 * H);
        let result = check_conflict(&store, rid, &span(9 * H + H / 2, 10 * H + H / 2), None);
        assert_eq!(result, ConflictResult::Conflict(existing));
    }

    #[test]
    fn earliest_start_wins_regardless_of_insertion_order() {
        let mut store = ReservationStore::new();
        let rid = Ulid::new();
        book(&mut store, rid, 11 * H, 12 * H);
        let earliest = book(&mut store, rid, 9 * H, 10 * H);
        book(&mut store, rid, 10 * H, 11 * H);

        match check_conflict(&store, rid, &span(8 * H, 13 * H), None) {
            ConflictResult::Conflict(r) => assert_eq!(r.id, earliest.id),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn other_resources_are_ignored() {
        let mut store = ReservationStore::new();
        book(&mut store, Ulid::new(), 9 * H, 10 * H);
        assert!(!check_conflict(&store, Ulid::new(), &span(9 * H, 10 * H), None).is_conflict());
    }

    #[test]
    fn excluded_reservation_does_not_self_conflict() {
        let mut store = ReservationStore::new();
        let rid = Ulid::new();
        let r = book(&mut store, rid, 9 * H, 10 * H);
        assert!(check_conflict(&store, rid, &r.span, None).is_conflict());
        assert_eq!(
            check_conflict(&store, rid, &r.span, Some(r.id)),
            ConflictResult::NoConflict
        );
    }

    #[test]
    fn exclude_still_sees_other_bookings() {
        let mut store = ReservationStore::new();
        let rid = Ulid::new();
        let moving = book(&mut store, rid, 9 * H, 10 * H);
        let other = book(&mut store, rid, 10 * H, 11 * H);
        let result = check_conflict(&store, rid, &span(9 * H + H / 2, 10 * H + H / 2), Some(moving.id));
        assert_eq!(result, ConflictResult::Conflict(other));
    }

    #[test]
    fn occurrences_report_first_conflicting_index() {
        let mut store = ReservationStore::new();
        let rid = Ulid::new();
        let existing = book(&mut store, rid, 2 * DAY_MS + 9 * H, 2 * DAY_MS + 10 * H);
        let occurrences: Vec<Span> = (0..5)
            .map(|d| span(d * DAY_MS + 9 * H, d * DAY_MS + 10 * H))
            .collect();

        let err = check_occurrences(&store, rid, &occurrences, None).unwrap_err();
        match err {
            BookingError::Conflict {
                occurrence_index,
                occurrence,
                existing: hit,
            } => {
                assert_eq!(occurrence_index, 2);
                assert_eq!(occurrence, occurrences[2]);
                assert_eq!(*hit, existing);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn self_overlap_detected() {
        let ok = [span(0, 10), span(10, 20)];
        assert!(check_self_overlap(&ok).is_ok());
        let bad = [span(0, 10), span(20, 40), span(30, 50)];
        assert_eq!(
            check_self_overlap(&bad),
            Err(BookingError::OverlappingOccurrences { first: 1, second: 2 })
        );
    }

    #[test]
    fn validate_span_limits() {
        use crate::limits::*;
        let ok = span(MIN_VALID_TIMESTAMP_MS, MIN_VALID_TIMESTAMP_MS + H);
        assert!(validate_span(&ok).is_ok());
        let too_early = span(0, H);
        assert!(matches!(validate_span(&too_early), Err(BookingError::LimitExceeded(_))));
        let too_wide = span(
            MIN_VALID_TIMESTAMP_MS,
            MIN_VALID_TIMESTAMP_MS + MAX_SPAN_DURATION_MS + 1,
        );
        assert!(matches!(validate_span(&too_wide), Err(BookingError::LimitExceeded(_))));
    }
}
