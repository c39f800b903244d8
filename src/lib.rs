//! Meeting-room booking with conflict detection, recurring reservations and
//! availability views.
//!
//! [`engine::Engine`] is the entry point for hosts: it journals every change,
//! replays on open and broadcasts applied events per room. The synchronous core
//! (`engine::book`, `engine::check_conflict`, `engine::snapshot`, ...) works on a
//! plain [`engine::ReservationStore`] and needs no runtime.

pub mod config;
pub mod engine;
pub mod journal;
pub mod limits;
pub mod maintenance;
pub mod model;
pub mod notify;
pub mod observability;
