use ulid::Ulid;

use crate::model::*;

use super::store::ReservationStore;

// ── Availability views ────────────────────────────────────────────

/// Current/next reservation for a resource at `as_of`.
///
/// Reservations are sorted by start first (ties by id), so if imported data ever
/// holds overlapping reservations the earliest one is reported as current.
pub fn snapshot(store: &ReservationStore, resource_id: Ulid, as_of: Ms) -> AvailabilitySnapshot {
    let mut sorted: Vec<&Reservation> = store.list_by_resource(resource_id).iter().collect();
    sorted.sort_by_key(|r| (r.span.start(), r.id));

    let current = sorted.iter().find(|r| r.span.contains(as_of)).map(|r| (*r).clone());
    let next = sorted
        .iter()
        .find(|r| r.span.start() > as_of)
        .map(|r| (*r).clone());

    let busy: Vec<Span> = sorted.iter().map(|r| r.span).collect();
    let timeline = merge_overlapping(&busy);

    AvailabilitySnapshot {
        resource_id,
        as_of,
        is_free_now: current.is_none(),
        current,
        next,
        next_free_at: next_free_at(&timeline, as_of, 0),
    }
}

/// Busy blocks of a resource, sorted, with overlapping or touching reservations
/// coalesced so a calendar never draws the same minute twice.
pub fn merged_timeline(store: &ReservationStore, resource_id: Ulid) -> Vec<Span> {
    let mut busy: Vec<Span> = store
        .list_by_resource(resource_id)
        .iter()
        .map(|r| r.span)
        .collect();
    busy.sort_by_key(|s| s.start());
    merge_overlapping(&busy)
}

/// Free gaps of a resource inside `window`, optionally dropping gaps shorter
/// than `min_duration_ms`.
pub fn free_slots(
    store: &ReservationStore,
    resource_id: Ulid,
    window: &Span,
    min_duration_ms: Option<Ms>,
) -> Vec<Span> {
    let timeline = merged_timeline(store, resource_id);
    let mut free = subtract_intervals(&[*window], &timeline);
    if let Some(min_dur) = min_duration_ms {
        free.retain(|span| span.duration_ms() >= min_dur);
    }
    free
}

/// Earliest `t >= as_of` such that `[t, t + min_duration_ms)` touches no busy block.
/// `timeline` must be merged (see [`merge_overlapping`]).
pub fn next_free_at(timeline: &[Span], as_of: Ms, min_duration_ms: Ms) -> Ms {
    let mut cursor = as_of;
    for block in timeline {
        if block.end() <= cursor {
            continue;
        }
        if block.start() > cursor && block.start() - cursor >= min_duration_ms {
            return cursor;
        }
        cursor = cursor.max(block.end());
    }
    cursor
}

// ── Interval algebra ─────────────────────────────────────────────

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start() <= last.end()
        {
            *last = Span::from_bounds(last.start(), last.end().max(span.end()));
            continue;
        }
        merged.push(span);
    }
    merged
}

/// `base` minus `to_remove`. Both inputs sorted by start; `to_remove` disjoint.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for b in base {
        let mut current_start = b.start();
        let current_end = b.end();

        while ri < to_remove.len() && to_remove[ri].end() <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start() < current_end {
            let r = &to_remove[j];
            if r.start() > current_start {
                result.push(Span::from_bounds(current_start, r.start()));
            }
            current_start = current_start.max(r.end());
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::from_bounds(current_start, current_end));
        }
    }

    result
}
