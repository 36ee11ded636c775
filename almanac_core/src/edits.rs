//! Occurrence editing workflows.
//!
//! Editing a single occurrence of a repeating series never rewrites the
//! series pattern. The occurrence is split off instead: the original date is
//! excluded (or the whole series dropped when it only ever had that one
//! date) and a one-off series is created for the new details.

use crate::calendar::add_days;
use crate::recurrence::{self, expand};
use crate::store::SeriesStore;
use crate::unscheduled::UnscheduledStore;
use crate::{Error, Result, RepeatFrequency, Series, UnscheduledItem, WeekSelector};
use chrono::NaiveDate;

/// Name given to series created without one
pub const UNTITLED: &str = "Untitled";

fn display_name(name: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        UNTITLED.to_string()
    } else {
        name.to_string()
    }
}

/// Fetch a series and make sure it actually falls on `date`
fn occurring_series<S>(store: &S, id: &str, date: NaiveDate) -> Result<Series>
where
    S: SeriesStore + ?Sized,
{
    let series = store.get(id)?;
    if expand(&series, date, date).is_empty() {
        return Err(Error::InvalidInput(format!(
            "series {} has no occurrence on {}",
            id, date
        )));
    }
    Ok(series)
}

/// Remove one occurrence by excluding its date
pub fn delete_occurrence<S>(store: &mut S, id: &str, date: NaiveDate) -> Result<Series>
where
    S: SeriesStore + ?Sized,
{
    occurring_series(&*store, id, date)?;
    let updated = store.add_exclusion(id, date)?;
    tracing::info!("Excluded {} from series {}", date, id);
    Ok(updated)
}

/// End a series the day before `from`, keeping everything earlier
pub fn stop_series_from<S>(store: &mut S, id: &str, from: NaiveDate) -> Result<Series>
where
    S: SeriesStore + ?Sized,
{
    let day_before = add_days(from, -1);
    let updated = store.set_end_date(id, day_before)?;
    tracing::info!("Series {} now ends on {}", id, day_before);
    Ok(updated)
}

/// Move one occurrence to another date
///
/// Returns the one-off series created on `to`, or `None` when the dates are
/// equal. The new series is created before the original date is excluded,
/// so a rejected duplicate leaves the store untouched.
pub fn move_occurrence<S>(
    store: &mut S,
    id: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Option<Series>>
where
    S: SeriesStore + ?Sized,
{
    if from == to {
        return Ok(None);
    }

    let original = occurring_series(&*store, id, from)?;
    let moved = Series::new(display_name(&original.name), to)
        .with_times(original.start_time.clone(), original.end_time.clone());

    let created = store.create(moved)?;
    store.add_exclusion(id, from)?;

    tracing::info!("Moved {} occurrence of {} to {} as {}", from, id, to, created.id);
    Ok(Some(created))
}

/// New details for an edited occurrence; unset fields keep their value
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OccurrenceEdit {
    pub name: Option<String>,
    pub date: Option<NaiveDate>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

/// What happened to the series an edited occurrence came from
#[derive(Clone, Debug, PartialEq)]
pub enum OriginalFate {
    /// The series only had that one date and was removed
    Deleted(Series),
    /// The edited date was excluded from the series
    Excluded(Series),
}

#[derive(Clone, Debug, PartialEq)]
pub struct EditOutcome {
    pub created: Series,
    pub original: OriginalFate,
}

/// Replace one occurrence with a one-off series carrying the edited details
pub fn edit_occurrence<S>(
    store: &mut S,
    id: &str,
    date: NaiveDate,
    edit: OccurrenceEdit,
) -> Result<EditOutcome>
where
    S: SeriesStore + ?Sized,
{
    let original = occurring_series(&*store, id, date)?;

    let name = display_name(edit.name.as_deref().unwrap_or(&original.name));
    let replacement = Series::new(name, edit.date.unwrap_or(date)).with_times(
        edit.start_time.unwrap_or_else(|| original.start_time.clone()),
        edit.end_time.unwrap_or_else(|| original.end_time.clone()),
    );

    let created = store.create(replacement)?;

    let original = if recurrence::is_single(&original) {
        OriginalFate::Deleted(store.delete(id)?)
    } else {
        OriginalFate::Excluded(store.add_exclusion(id, date)?)
    };

    tracing::info!("Edited {} occurrence of {} into {}", date, id, created.id);
    Ok(EditOutcome { created, original })
}

/// Where and how to place an unscheduled item
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduleRequest {
    /// Name for the new series; the item's own name when `None`
    pub name: Option<String>,
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub frequency: RepeatFrequency,
    pub weeks: Vec<WeekSelector>,
}

impl ScheduleRequest {
    pub fn on(date: NaiveDate) -> Self {
        Self {
            name: None,
            date,
            start_time: String::new(),
            end_time: String::new(),
            frequency: RepeatFrequency::None,
            weeks: Vec::new(),
        }
    }
}

/// Create a series from an unscheduled item
///
/// The item stays in the unscheduled list so it can be placed again.
pub fn schedule_unscheduled<S, U>(
    series_store: &mut S,
    unscheduled: &U,
    item_id: &str,
    request: ScheduleRequest,
) -> Result<Series>
where
    S: SeriesStore + ?Sized,
    U: UnscheduledStore + ?Sized,
{
    let item = unscheduled.get(item_id)?;
    let name = request.name.as_deref().unwrap_or(&item.name);
    let series = Series::new(display_name(name), request.date)
        .with_times(request.start_time, request.end_time)
        .with_repeat(request.frequency, request.weeks);

    let created = series_store.create(series)?;
    tracing::info!("Scheduled {:?} as series {}", item.name, created.id);
    Ok(created)
}

/// Items and series removed by [`delete_unscheduled_cascade`]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CascadeOutcome {
    pub item: Option<UnscheduledItem>,
    pub series: Vec<Series>,
}

/// Delete an unscheduled item together with every series sharing its name
///
/// Deleting an item that does not exist removes nothing.
pub fn delete_unscheduled_cascade<S, U>(
    series_store: &mut S,
    unscheduled: &mut U,
    item_id: &str,
) -> Result<CascadeOutcome>
where
    S: SeriesStore + ?Sized,
    U: UnscheduledStore + ?Sized,
{
    let Some(item) = unscheduled.delete(item_id)? else {
        return Ok(CascadeOutcome::default());
    };

    let name = item.name.trim();
    let mut removed = Vec::new();
    for series in series_store.list()? {
        if series.name.trim() == name {
            removed.push(series_store.delete(&series.id)?);
        }
    }

    tracing::info!(
        "Deleted unscheduled item {} and {} matching series",
        item.id,
        removed.len()
    );
    Ok(CascadeOutcome {
        item: Some(item),
        series: removed,
    })
}
