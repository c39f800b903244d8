use std::time::Instant;

use tokio::sync::oneshot;
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{self, record_operation};

use super::booking::{plan_booking, plan_cancel, plan_reschedule};
use super::{BookingError, Engine, JournalCommand};

fn validate_room(room: &Room) -> Result<(), BookingError> {
    if room.name.len() > MAX_NAME_LEN {
        return Err(BookingError::LimitExceeded("room name too long"));
    }
    if room.location.as_ref().is_some_and(|l| l.len() > MAX_NAME_LEN) {
        return Err(BookingError::LimitExceeded("room location too long"));
    }
    if room.equipment.len() > MAX_EQUIPMENT_TAGS {
        return Err(BookingError::LimitExceeded("too many equipment tags"));
    }
    Ok(())
}

impl Engine {
    pub async fn create_room(&self, room: Room) -> Result<(), BookingError> {
        validate_room(&room)?;
        let mut store = self.store.write().await;
        if self.rooms.contains_key(&room.id) {
            return Err(BookingError::AlreadyExists(room.id));
        }
        if self.rooms.len() >= MAX_ROOMS {
            return Err(BookingError::LimitExceeded("too many rooms"));
        }

        let id = room.id;
        let event = Event::RoomCreated { room };
        self.persist_and_apply(&mut store, &event).await?;
        info!(room_id = %id, "room created");
        Ok(())
    }

    /// Replace a room's descriptive fields. Reservations are untouched.
    pub async fn update_room(&self, room: Room) -> Result<(), BookingError> {
        validate_room(&room)?;
        let mut store = self.store.write().await;
        if !self.rooms.contains_key(&room.id) {
            return Err(BookingError::NotFound(room.id));
        }
        let event = Event::RoomUpdated { room };
        self.persist_and_apply(&mut store, &event).await
    }

    /// Remove a room. Rooms that still hold reservations cannot be deleted.
    pub async fn delete_room(&self, id: Ulid) -> Result<(), BookingError> {
        let mut store = self.store.write().await;
        if !self.rooms.contains_key(&id) {
            return Err(BookingError::NotFound(id));
        }
        if !store.list_by_resource(id).is_empty() {
            return Err(BookingError::HasReservations(id));
        }

        let event = Event::RoomDeleted { id };
        self.persist_and_apply(&mut store, &event).await?;
        self.notify.remove(&id);
        info!(room_id = %id, "room deleted");
        Ok(())
    }

    /// Book a single or recurring request. All occurrences land in one journal
    /// record, or none do. Returns ids in occurrence order.
    pub async fn book(&self, request: BookingRequest) -> Result<Vec<Ulid>, BookingError> {
        let started = Instant::now();
        let result = self.book_inner(&request).await;
        record_operation("book", started, &result);
        if let Err(BookingError::Conflict { existing, .. }) = &result {
            metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            debug!(
                room_id = %request.resource_id,
                existing = %existing.id,
                "booking rejected: room busy"
            );
        }
        result
    }

    async fn book_inner(&self, request: &BookingRequest) -> Result<Vec<Ulid>, BookingError> {
        let mut store = self.store.write().await;
        if !self.rooms.contains_key(&request.resource_id) {
            return Err(BookingError::NotFound(request.resource_id));
        }
        let reservations = plan_booking(&store, request)?;
        let ids: Vec<Ulid> = reservations.iter().map(|r| r.id).collect();

        let event = Event::Booked {
            resource_id: request.resource_id,
            reservations,
        };
        self.persist_and_apply(&mut store, &event).await?;
        info!(
            room_id = %request.resource_id,
            occurrences = ids.len(),
            organizer = %request.organizer,
            "booked"
        );
        Ok(ids)
    }

    /// Cancel one occurrence or its whole series. Returns how many were removed.
    pub async fn cancel(&self, id: Ulid, scope: CancelScope) -> Result<usize, BookingError> {
        let started = Instant::now();
        let result = self.cancel_inner(id, scope).await;
        record_operation("cancel", started, &result);
        result
    }

    async fn cancel_inner(&self, id: Ulid, scope: CancelScope) -> Result<usize, BookingError> {
        let mut store = self.store.write().await;
        let ids = plan_cancel(&store, id, scope)?;
        let resource_id = store
            .get(id)
            .map(|r| r.resource_id)
            .ok_or(BookingError::NotFound(id))?;
        let removed = ids.len();

        let event = Event::Cancelled { resource_id, ids };
        self.persist_and_apply(&mut store, &event).await?;
        info!(reservation_id = %id, ?scope, removed, "cancelled");
        Ok(removed)
    }

    /// Move a reservation to `[start, end)` on the same room.
    pub async fn reschedule(&self, id: Ulid, start: Ms, end: Ms) -> Result<Span, BookingError> {
        let started = Instant::now();
        let result = self.reschedule_inner(id, start, end).await;
        record_operation("reschedule", started, &result);
        result
    }

    async fn reschedule_inner(&self, id: Ulid, start: Ms, end: Ms) -> Result<Span, BookingError> {
        let mut store = self.store.write().await;
        let (resource_id, span) = plan_reschedule(&store, id, start, end)?;
        let event = Event::Rescheduled { id, resource_id, span };
        self.persist_and_apply(&mut store, &event).await?;
        Ok(span)
    }

    /// Rewrite the journal with only the events needed to rebuild current state.
    ///
    /// Holds the store read lock for the duration, so no append can land
    /// between the snapshot and the file swap.
    pub async fn compact_journal(&self) -> Result<(), BookingError> {
        let store = self.store.read().await;

        let mut rooms: Vec<Room> = self.rooms.iter().map(|e| e.value().clone()).collect();
        rooms.sort_by_key(|r| r.id);
        let mut events: Vec<Event> = rooms
            .into_iter()
            .map(|room| Event::RoomCreated { room })
            .collect();

        let mut resource_ids: Vec<Ulid> = store.resource_ids().collect();
        resource_ids.sort();
        for resource_id in resource_ids {
            let reservations = store.list_by_resource(resource_id).to_vec();
            if !reservations.is_empty() {
                events.push(Event::Booked { resource_id, reservations });
            }
        }
        let event_count = events.len();

        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| BookingError::JournalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| BookingError::JournalError("journal writer dropped response".into()))?
            .map_err(|e| BookingError::JournalError(e.to_string()))?;

        metrics::counter!(observability::JOURNAL_COMPACTIONS_TOTAL).increment(1);
        info!(events = event_count, "journal compacted");
        Ok(())
    }

    pub async fn journal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .journal_tx
            .send(JournalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
