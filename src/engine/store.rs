use std::collections::HashMap;

use ulid::Ulid;

use crate::limits::MAX_RESERVATIONS_PER_RESOURCE;
use crate::model::*;

use super::BookingError;

/// Sole owner of all reservations. No internal locking: callers serialize writes.
///
/// Per resource, reservations are kept in insertion order; anything that cares
/// about time order sorts explicitly.
#[derive(Debug, Clone, Default)]
pub struct ReservationStore {
    by_resource: HashMap<Ulid, Vec<Reservation>>,
    /// Reverse lookup: reservation id → resource id
    resource_of: HashMap<Ulid, Ulid>,
}

impl ReservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.resource_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resource_of.is_empty()
    }

    /// Append a reservation to its resource. Conflict checks are the caller's job.
    pub fn insert(&mut self, reservation: Reservation) -> Result<(), BookingError> {
        if self.resource_of.contains_key(&reservation.id) {
            return Err(BookingError::AlreadyExists(reservation.id));
        }
        let list = self.by_resource.entry(reservation.resource_id).or_default();
        if list.len() >= MAX_RESERVATIONS_PER_RESOURCE {
            return Err(BookingError::LimitExceeded("too many reservations on resource"));
        }
        self.resource_of.insert(reservation.id, reservation.resource_id);
        list.push(reservation);
        Ok(())
    }

    /// Remove by id. Returns false if there was nothing to remove.
    pub fn remove(&mut self, id: Ulid) -> bool {
        self.take(id).is_some()
    }

    pub(crate) fn take(&mut self, id: Ulid) -> Option<Reservation> {
        let resource_id = self.resource_of.remove(&id)?;
        let list = self.by_resource.get_mut(&resource_id)?;
        let pos = list.iter().position(|r| r.id == id)?;
        let removed = list.remove(pos);
        if list.is_empty() {
            self.by_resource.remove(&resource_id);
        }
        Some(removed)
    }

    /// Remove every occurrence of a series. Returns how many were removed.
    pub fn remove_by_series(&mut self, series_id: Ulid) -> usize {
        let ids: Vec<Ulid> = self
            .series_members(series_id)
            .into_iter()
            .map(|r| r.id)
            .collect();
        ids.into_iter().filter(|id| self.remove(*id)).count()
    }

    pub fn list_by_resource(&self, resource_id: Ulid) -> &[Reservation] {
        self.by_resource
            .get(&resource_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn get(&self, id: Ulid) -> Option<&Reservation> {
        let resource_id = self.resource_of.get(&id)?;
        self.list_by_resource(*resource_id).iter().find(|r| r.id == id)
    }

    pub fn contains(&self, id: Ulid) -> bool {
        self.resource_of.contains_key(&id)
    }

    /// All occurrences sharing `series_id`, sorted by start.
    pub fn series_members(&self, series_id: Ulid) -> Vec<&Reservation> {
        let mut members: Vec<&Reservation> = self
            .iter()
            .filter(|r| r.series_id == Some(series_id))
            .collect();
        members.sort_by_key(|r| (r.span.start(), r.id));
        members
    }

    /// Move a reservation to a new span in place. Returns false if unknown.
    pub fn reschedule(&mut self, id: Ulid, span: Span) -> bool {
        let Some(resource_id) = self.resource_of.get(&id) else {
            return false;
        };
        match self
            .by_resource
            .get_mut(resource_id)
            .and_then(|list| list.iter_mut().find(|r| r.id == id))
        {
            Some(reservation) => {
                reservation.span = span;
                true
            }
            None => false,
        }
    }

    pub fn resource_ids(&self) -> impl Iterator<Item = Ulid> + '_ {
        self.by_resource.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reservation> {
        self.by_resource.values().flatten()
    }

    // ── Record boundary ──────────────────────────────────────

    /// Rebuild a store from persisted records, e.g. at startup.
    pub fn from_records<I>(records: I) -> Result<Self, BookingError>
    where
        I: IntoIterator<Item = ReservationRecord>,
    {
        let mut store = Self::new();
        for record in records {
            store.insert(Reservation::try_from(record)?)?;
        }
        Ok(store)
    }

    /// Records sorted by resource, then start, so output is stable.
    pub fn to_records(&self) -> Vec<ReservationRecord> {
        let mut all: Vec<&Reservation> = self.iter().collect();
        all.sort_by_key(|r| (r.resource_id, r.span.start(), r.id));
        all.into_iter().map(ReservationRecord::from).collect()
    }

    pub fn import_json(json: &str) -> Result<Self, BookingError> {
        let records: Vec<ReservationRecord> =
            serde_json::from_str(json).map_err(|e| BookingError::InvalidRecord(e.to_string()))?;
        Self::from_records(records)
    }

    pub fn export_json(&self) -> Result<String, BookingError> {
        serde_json::to_string(&self.to_records())
            .map_err(|e| BookingError::InvalidRecord(e.to_string()))
    }
}
