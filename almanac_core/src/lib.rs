#![forbid(unsafe_code)]

//! Core domain model and business logic for the Almanac calendar.
//!
//! This crate provides:
//! - Calendar primitives (ISO and DD/MM/YYYY dates, week-of-month, times)
//! - Domain types (series, occurrences, unscheduled items)
//! - The recurrence expansion engine
//! - Agenda views (month, year, day, recent names)
//! - Persistence (locked JSON stores) and CSV export
//! - Occurrence editing workflows

pub mod types;
pub mod error;
pub mod calendar;
pub mod config;
pub mod logging;
pub mod recurrence;
pub mod agenda;
pub mod store;
pub mod unscheduled;
pub mod edits;
pub mod export;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use recurrence::{expand, normalize, RecurrenceRule};
pub use agenda::{month_agenda, occurrences_on, recent_names, year_overview};
pub use store::{JsonSeriesStore, MemorySeriesStore, SeriesStore};
pub use unscheduled::{AddOutcome, JsonUnscheduledStore, MemoryUnscheduledStore, UnscheduledStore};
