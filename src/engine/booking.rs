//! Plan-then-commit booking flow over a [`ReservationStore`].
//!
//! `plan_*` functions are dry runs: they validate and check conflicts without
//! touching the store. The Engine journals a plan before applying it; the
//! synchronous wrappers (`book`, `cancel`, `reschedule`) apply directly.

use std::collections::{HashMap, HashSet};

use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::BookingError;
use super::conflict::{check_occurrences, check_self_overlap, validate_span};
use super::recurrence::expand;
use super::store::ReservationStore;

/// Validate a request and build the reservations it would create, in expansion order.
/// Either every occurrence is clear or the whole request is rejected.
pub fn plan_booking(
    store: &ReservationStore,
    request: &BookingRequest,
) -> Result<Vec<Reservation>, BookingError> {
    if request.title.len() > MAX_TITLE_LEN {
        return Err(BookingError::LimitExceeded("title too long"));
    }
    if request.organizer.len() > MAX_ORGANIZER_LEN {
        return Err(BookingError::LimitExceeded("organizer too long"));
    }
    let base = Span::new(request.start, request.end)?;
    validate_span(&base)?;

    let occurrences = expand(&base, &request.recurrence)?;
    if let Some(last) = occurrences.last() {
        validate_span(last)?;
    }
    if store.list_by_resource(request.resource_id).len() + occurrences.len()
        > MAX_RESERVATIONS_PER_RESOURCE
    {
        return Err(BookingError::LimitExceeded("too many reservations on resource"));
    }
    check_self_overlap(&occurrences)?;
    check_occurrences(store, request.resource_id, &occurrences, None)?;

    let series_id = request.recurrence.is_recurring().then(Ulid::new);
    Ok(occurrences
        .into_iter()
        .map(|span| Reservation {
            id: Ulid::new(),
            resource_id: request.resource_id,
            span,
            title: request.title.clone(),
            organizer: request.organizer.clone(),
            series_id,
        })
        .collect())
}

/// Insert a validated plan. Ids are fresh, so this only fails on a reused or
/// hand-built plan; in that case nothing from the plan is inserted.
pub fn commit(store: &mut ReservationStore, planned: Vec<Reservation>) -> Result<Vec<Ulid>, BookingError> {
    let mut seen = HashSet::with_capacity(planned.len());
    let mut per_resource: HashMap<Ulid, usize> = HashMap::new();
    for reservation in &planned {
        if store.contains(reservation.id) || !seen.insert(reservation.id) {
            return Err(BookingError::AlreadyExists(reservation.id));
        }
        *per_resource.entry(reservation.resource_id).or_default() += 1;
    }
    for (resource_id, added) in per_resource {
        if store.list_by_resource(resource_id).len() + added > MAX_RESERVATIONS_PER_RESOURCE {
            return Err(BookingError::LimitExceeded("too many reservations on resource"));
        }
    }

    let mut ids = Vec::with_capacity(planned.len());
    for reservation in planned {
        ids.push(reservation.id);
        store.insert(reservation)?;
    }
    Ok(ids)
}

/// Book a (possibly recurring) request. Returns created ids in expansion order.
pub fn book(store: &mut ReservationStore, request: &BookingRequest) -> Result<Vec<Ulid>, BookingError> {
    let planned = plan_booking(store, request)?;
    commit(store, planned)
}

/// Ids that a cancellation would remove.
///
/// `CancelScope::Series` on a reservation that is not part of a series cancels
/// just that reservation.
pub fn plan_cancel(
    store: &ReservationStore,
    id: Ulid,
    scope: CancelScope,
) -> Result<Vec<Ulid>, BookingError> {
    let reservation = store.get(id).ok_or(BookingError::NotFound(id))?;
    match (scope, reservation.series_id) {
        (CancelScope::Series, Some(series_id)) => Ok(store
            .series_members(series_id)
            .into_iter()
            .map(|r| r.id)
            .collect()),
        _ => Ok(vec![id]),
    }
}

/// Cancel one occurrence or a whole series. Returns how many were removed.
pub fn cancel(store: &mut ReservationStore, id: Ulid, scope: CancelScope) -> Result<usize, BookingError> {
    let ids = plan_cancel(store, id, scope)?;
    Ok(ids.into_iter().filter(|id| store.remove(*id)).count())
}

/// Validate moving a reservation to `[start, end)` against every *other*
/// reservation of its resource.
pub fn plan_reschedule(
    store: &ReservationStore,
    id: Ulid,
    start: Ms,
    end: Ms,
) -> Result<(Ulid, Span), BookingError> {
    let reservation = store.get(id).ok_or(BookingError::NotFound(id))?;
    let span = Span::new(start, end)?;
    validate_span(&span)?;
    check_occurrences(store, reservation.resource_id, &[span], Some(id))?;
    Ok((reservation.resource_id, span))
}

pub fn reschedule(store: &mut ReservationStore, id: Ulid, start: Ms, end: Ms) -> Result<Span, BookingError> {
    let (_, span) = plan_reschedule(store, id, start, end)?;
    store.reschedule(id, span);
    Ok(span)
}
