//! Agenda views built on top of the recurrence engine.
//!
//! Every view takes an immutable snapshot of the stored series and expands
//! each one over the period being displayed.

use crate::calendar;
use crate::recurrence::expand;
use crate::{Occurrence, Series, UnscheduledItem};
use chrono::NaiveDate;
use std::collections::HashSet;

/// Default number of suggestions returned by [`recent_names`]
pub const DEFAULT_RECENT_NAMES_LIMIT: usize = 20;

/// Occurrences of every series inside `[start, end]`, sorted by start time
///
/// Sorting is stable, so occurrences sharing a start time keep date order
/// and then series order. Untimed occurrences come first.
pub fn agenda_between(series: &[Series], start: NaiveDate, end: NaiveDate) -> Vec<Occurrence> {
    let mut occurrences: Vec<Occurrence> = series
        .iter()
        .flat_map(|s| expand(s, start, end))
        .collect();

    occurrences.sort_by(|a, b| a.start_time.cmp(&b.start_time));
    occurrences
}

/// The agenda for one month; empty for an invalid month
pub fn month_agenda(series: &[Series], year: i32, month: u32) -> Vec<Occurrence> {
    match calendar::month_bounds(year, month) {
        Some((first, last)) => agenda_between(series, first, last),
        None => {
            tracing::warn!("Invalid month {}-{}, empty agenda", year, month);
            Vec::new()
        }
    }
}

/// Twelve month buckets for `year`, January first
pub fn year_overview(series: &[Series], year: i32) -> Vec<Vec<Occurrence>> {
    (1..=12).map(|month| month_agenda(series, year, month)).collect()
}

/// Everything happening on a single day
pub fn occurrences_on(series: &[Series], date: NaiveDate) -> Vec<Occurrence> {
    agenda_between(series, date, date)
}

/// Name suggestions for new events
///
/// Unscheduled item names come first in their stored order, followed by
/// series names from the most recently created. Names are trimmed, blanks
/// dropped, and each name appears once.
pub fn recent_names(
    series: &[Series],
    unscheduled: &[UnscheduledItem],
    limit: usize,
) -> Vec<String> {
    let mut by_age: Vec<&Series> = series.iter().collect();
    // Newest first; records without a timestamp sink to the end
    by_age.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let candidates = unscheduled
        .iter()
        .map(|item| item.name.as_str())
        .chain(by_age.iter().map(|s| s.name.as_str()));

    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for name in candidates {
        if names.len() >= limit {
            break;
        }
        let name = name.trim();
        if name.is_empty() || !seen.insert(name) {
            continue;
        }
        names.push(name.to_string());
    }
    names
}
