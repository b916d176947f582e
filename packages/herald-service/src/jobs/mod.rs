//! Postgres-backed jobs. Each is a [`crate::RecordStore`] plus the formatter and selections
//! that the scheduler runs.

pub mod event_updates;
pub mod live_events;
pub mod scheduled_notes;
