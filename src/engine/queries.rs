use std::collections::BTreeSet;

use tokio::sync::broadcast;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability;
use super::conflict::{self, now_ms};
use super::{BookingError, Engine};

impl Engine {
    pub fn get_room(&self, id: &Ulid) -> Option<Room> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    /// All rooms, ordered by name.
    pub fn list_rooms(&self) -> Vec<Room> {
        let mut rooms: Vec<Room> = self.rooms.iter().map(|e| e.value().clone()).collect();
        rooms.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        rooms
    }

    /// Reservations of one room, ordered by start. Unknown rooms have none.
    pub async fn reservations(&self, resource_id: Ulid) -> Vec<Reservation> {
        let store = self.store.read().await;
        let mut list = store.list_by_resource(resource_id).to_vec();
        list.sort_by_key(|r| (r.span.start(), r.id));
        list
    }

    pub async fn get_reservation(&self, id: Ulid) -> Option<Reservation> {
        self.store.read().await.get(id).cloned()
    }

    /// Members of a recurring series, ordered by start.
    pub async fn series(&self, series_id: Ulid) -> Vec<Reservation> {
        let store = self.store.read().await;
        store.series_members(series_id).into_iter().cloned().collect()
    }

    pub async fn reservation_count(&self) -> usize {
        self.store.read().await.len()
    }

    /// Would `[start, end)` collide with anything on the room? `exclude` skips
    /// one reservation, as a reschedule does.
    pub async fn check_conflict(
        &self,
        resource_id: Ulid,
        start: Ms,
        end: Ms,
        exclude: Option<Ulid>,
    ) -> Result<ConflictResult, BookingError> {
        let candidate = Span::new(start, end)?;
        let store = self.store.read().await;
        Ok(conflict::check_conflict(&store, resource_id, &candidate, exclude))
    }

    pub async fn snapshot(&self, resource_id: Ulid, as_of: Ms) -> AvailabilitySnapshot {
        let store = self.store.read().await;
        availability::snapshot(&store, resource_id, as_of)
    }

    /// Snapshot at the current wall-clock time.
    pub async fn snapshot_now(&self, resource_id: Ulid) -> AvailabilitySnapshot {
        self.snapshot(resource_id, now_ms()).await
    }

    pub async fn merged_timeline(&self, resource_id: Ulid) -> Vec<Span> {
        let store = self.store.read().await;
        availability::merged_timeline(&store, resource_id)
    }

    pub async fn free_slots(
        &self,
        resource_id: Ulid,
        start: Ms,
        end: Ms,
        min_duration_ms: Option<Ms>,
    ) -> Result<Vec<Span>, BookingError> {
        let window = query_window(start, end)?;
        let store = self.store.read().await;
        Ok(availability::free_slots(&store, resource_id, &window, min_duration_ms))
    }

    /// Rooms with at least `min_capacity` seats, every tag in `required_equipment`,
    /// and nothing booked across `[start, end)`. Smallest fitting room first.
    pub async fn find_available_rooms(
        &self,
        start: Ms,
        end: Ms,
        min_capacity: u32,
        required_equipment: &BTreeSet<String>,
    ) -> Result<Vec<Room>, BookingError> {
        let window = query_window(start, end)?;
        let store = self.store.read().await;

        let mut available: Vec<Room> = self
            .rooms
            .iter()
            .map(|e| e.value().clone())
            .filter(|room| room.capacity >= min_capacity && room.has_equipment(required_equipment))
            .filter(|room| {
                !conflict::check_conflict(&store, room.id, &window, None).is_conflict()
            })
            .collect();
        available.sort_by(|a, b| {
            a.capacity
                .cmp(&b.capacity)
                .then_with(|| a.name.cmp(&b.name))
                .then(a.id.cmp(&b.id))
        });
        Ok(available)
    }

    /// Every reservation in its external record form, for export.
    pub async fn export_records(&self) -> Vec<ReservationRecord> {
        self.store.read().await.to_records()
    }

    /// Live stream of events touching one room.
    pub fn subscribe(&self, resource_id: Ulid) -> broadcast::Receiver<Event> {
        self.notify.subscribe(resource_id)
    }
}

fn query_window(start: Ms, end: Ms) -> Result<Span, BookingError> {
    let window = Span::new(start, end)?;
    if window.start() < MIN_VALID_TIMESTAMP_MS || window.end() > MAX_VALID_TIMESTAMP_MS {
        return Err(BookingError::LimitExceeded("timestamp out of range"));
    }
    if window.duration_ms() > MAX_QUERY_WINDOW_MS {
        return Err(BookingError::LimitExceeded("query window too wide"));
    }
    Ok(window)
}
