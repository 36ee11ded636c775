//! Recurrence expansion engine.
//!
//! Turns a stored [`Series`] into the concrete dates it falls on:
//! - [`normalize`] reconciles the storage fields (new-format or legacy
//!   `repeat`) into one canonical [`RecurrenceRule`]
//! - [`expand`] walks a date range day by day and emits an [`Occurrence`]
//!   for every matching, non-excluded day
//!
//! Both are pure. They never fail: inconsistent input (an end date before
//! the start date, an inverted range) simply yields fewer occurrences.

use crate::calendar::{self, days_in_range};
use crate::{LegacyRepeat, Occurrence, RepeatFrequency, RepeatSnapshot, Series, WeekSelector};
use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeSet, HashSet};

/// Frequency used when a record carries no recurrence information at all,
/// or carries week selectors without a frequency
pub const DEFAULT_FREQUENCY: RepeatFrequency = RepeatFrequency::None;

/// Canonical recurrence descriptor for a series
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub start_date: NaiveDate,
    pub frequency: RepeatFrequency,
    pub weeks: BTreeSet<WeekSelector>,
    pub exclusions: HashSet<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl RecurrenceRule {
    /// True when the rule can only ever produce its start date
    pub fn is_single(&self) -> bool {
        self.frequency == RepeatFrequency::None && self.weeks.is_empty()
    }

    /// Whether `date` fits the pattern, ignoring exclusions and the end date
    pub fn matches(&self, date: NaiveDate) -> bool {
        // The creation date is never dropped, whatever the pattern says
        if date == self.start_date {
            return true;
        }

        let months_diff = calendar::months_between(self.start_date, date);

        if self.weeks.is_empty() {
            self.matches_day_of_month(date, months_diff)
        } else {
            self.matches_week_selection(date, months_diff)
        }
    }

    fn matches_week_selection(&self, date: NaiveDate, months_diff: i32) -> bool {
        let frequency_ok = match self.frequency {
            RepeatFrequency::None => false,
            RepeatFrequency::Quarterly => months_diff >= 0 && months_diff % 3 == 0,
            RepeatFrequency::Daily | RepeatFrequency::Monthly | RepeatFrequency::Other(_) => {
                months_diff >= 0
            }
        };

        if !frequency_ok || date < self.start_date {
            return false;
        }
        if calendar::weekday_index(date) != calendar::weekday_index(self.start_date) {
            return false;
        }

        let week = calendar::week_of_month(date);
        self.weeks.iter().any(|w| w.covers(week))
    }

    fn matches_day_of_month(&self, date: NaiveDate, months_diff: i32) -> bool {
        let same_day = date.day() == self.start_date.day();
        match self.frequency {
            RepeatFrequency::None => date == self.start_date,
            RepeatFrequency::Daily => date >= self.start_date,
            RepeatFrequency::Monthly => same_day && months_diff >= 0,
            RepeatFrequency::Quarterly => same_day && months_diff >= 0 && months_diff % 3 == 0,
            RepeatFrequency::Other(_) => same_day && date >= self.start_date,
        }
    }

    /// The last day that can still produce an occurrence inside the range
    fn effective_end(&self, range_end: NaiveDate) -> NaiveDate {
        match self.end_date {
            Some(end) => end.min(range_end),
            None => range_end,
        }
    }
}

/// Reconcile a stored series into its canonical recurrence rule
///
/// - Explicit `repeatWeeks`/`repeatFreq` fields win, even when empty; a
///   missing counterpart takes the canonical default.
/// - Otherwise the legacy `repeat` tokens are partitioned: `week1`..`week4`
///   become selectors and the first frequency token sets the frequency, with
///   the deprecated `weekly` read as monthly.
/// - Otherwise the series does not repeat.
pub fn normalize(series: &Series) -> RecurrenceRule {
    let (frequency, weeks) = if series.repeat_frequency.is_some() || series.repeat_weeks.is_some() {
        (
            series.repeat_frequency.clone().unwrap_or(DEFAULT_FREQUENCY),
            series
                .repeat_weeks
                .iter()
                .flatten()
                .copied()
                .collect::<BTreeSet<_>>(),
        )
    } else if let Some(legacy) = &series.repeat {
        migrate_legacy(legacy)
    } else {
        (DEFAULT_FREQUENCY, BTreeSet::new())
    };

    RecurrenceRule {
        start_date: series.start_date,
        frequency,
        weeks,
        exclusions: series.exclusions.iter().copied().collect(),
        end_date: series.end_date,
    }
}

fn migrate_legacy(legacy: &LegacyRepeat) -> (RepeatFrequency, BTreeSet<WeekSelector>) {
    let tokens = legacy.tokens();

    let weeks = tokens
        .iter()
        .filter_map(|t| WeekSelector::from_token(t))
        .collect();

    let frequency = tokens
        .iter()
        .find_map(|t| match t.trim().to_lowercase().as_str() {
            "daily" => Some(RepeatFrequency::Daily),
            "monthly" | "weekly" => Some(RepeatFrequency::Monthly),
            "quarterly" => Some(RepeatFrequency::Quarterly),
            "none" => Some(RepeatFrequency::None),
            _ => None,
        })
        .unwrap_or(DEFAULT_FREQUENCY);

    (frequency, weeks)
}

/// Whether a series can only ever occur once
pub fn is_single(series: &Series) -> bool {
    normalize(series).is_single()
}

/// Every occurrence of `series` between `range_start` and `range_end`, both
/// inclusive, in ascending date order
///
/// Returns an empty list for an inverted range, for a range entirely after
/// the series' end date, and for a one-off series whose date lies outside
/// the range.
pub fn expand(series: &Series, range_start: NaiveDate, range_end: NaiveDate) -> Vec<Occurrence> {
    let rule = normalize(series);
    let mut occurrences = Vec::new();

    let last_day = rule.effective_end(range_end);

    // A one-off series can be placed without scanning
    let first_day = if rule.is_single() {
        if rule.start_date > last_day || rule.start_date < range_start {
            return occurrences;
        }
        rule.start_date
    } else {
        range_start
    };

    let snapshot = RepeatSnapshot {
        repeat_weeks: rule.weeks.iter().copied().collect(),
        repeat_frequency: rule.frequency.clone(),
    };

    for day in days_in_range(first_day, last_day) {
        if rule.matches(day) && !rule.exclusions.contains(&day) {
            occurrences.push(Occurrence {
                date: day,
                series_id: series.id.clone(),
                name: series.name.clone(),
                start_time: series.start_time.clone(),
                end_time: series.end_time.clone(),
                repeat: snapshot.clone(),
            });
        }
    }

    occurrences
}
