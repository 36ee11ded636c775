//! Calendar primitives.
//!
//! Pure date arithmetic over local calendar dates (no timezone), plus the two
//! text forms used at the boundary: ISO `YYYY-MM-DD` for storage and
//! `DD/MM/YYYY` for user input. Wall-clock times are plain `HH:MM` strings.

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Timelike};

/// Format a date as `YYYY-MM-DD`
pub fn iso_text(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parse `YYYY-MM-DD` text
///
/// Each part may carry surrounding whitespace or omit zero padding
/// (`2024-1-5`). Returns `None` for anything that is not a real calendar date.
pub fn parse_iso(text: &str) -> Option<NaiveDate> {
    let mut parts = text.trim().split('-');
    let year = parts.next()?.trim().parse::<i32>().ok()?;
    let month = parts.next()?.trim().parse::<u32>().ok()?;
    let day = parts.next()?.trim().parse::<u32>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Format a date as `DD/MM/YYYY`
pub fn ddmmyyyy_text(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Parse `DD/MM/YYYY` text
///
/// Fails when the text does not split into exactly three numeric parts, when
/// the month is outside 1-12 or the day outside 1-31. Day-of-month is also
/// checked against the month's length, so `31/02/2024` is rejected rather
/// than rolled over.
pub fn parse_ddmmyyyy(text: &str) -> Option<NaiveDate> {
    let parts: Vec<&str> = text.trim().split('/').collect();
    if parts.len() != 3 {
        return None;
    }

    let day = parts[0].trim().parse::<u32>().ok()?;
    let month = parts[1].trim().parse::<u32>().ok()?;
    let year = parts[2].trim().parse::<i32>().ok()?;

    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }

    NaiveDate::from_ymd_opt(year, month, day)
}

/// Parse a date typed by a user: `DD/MM/YYYY` first, then ISO
pub fn parse_user_date(text: &str) -> Option<NaiveDate> {
    if text.contains('/') {
        parse_ddmmyyyy(text)
    } else {
        parse_iso(text)
    }
}

/// Shift a date by `n` days (negative moves backwards)
pub fn add_days(date: NaiveDate, n: i64) -> NaiveDate {
    date + Duration::days(n)
}

/// Day of week with Sunday = 0 through Saturday = 6
pub fn weekday_index(date: NaiveDate) -> u32 {
    date.weekday().num_days_from_sunday()
}

/// Week of the month, 1-5: days 1-7 are week 1, 8-14 week 2, and so on
///
/// Days 29-31 fall into week 5, which no week selector can express.
pub fn week_of_month(date: NaiveDate) -> u32 {
    (date.day() - 1) / 7 + 1
}

/// Signed number of calendar months from `a`'s month to `b`'s month
pub fn months_between(a: NaiveDate, b: NaiveDate) -> i32 {
    (b.year() - a.year()) * 12 + (b.month() as i32 - a.month() as i32)
}

/// Every date from `start` to `end`, both inclusive
///
/// Yields nothing when `start > end`.
pub fn days_in_range(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |d| *d <= end)
}

/// First and last day of a month (`month` is 1-12)
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((first, next_first.pred_opt()?))
}

/// Sunday-first week rows covering a month
///
/// Cells outside the month are `None`. Returns an empty grid for an invalid
/// month.
pub fn month_grid(year: i32, month: u32) -> Vec<[Option<NaiveDate>; 7]> {
    let Some((first, last)) = month_bounds(year, month) else {
        return Vec::new();
    };

    let mut rows = Vec::new();
    let mut row = [None; 7];
    let mut col = weekday_index(first) as usize;

    for day in days_in_range(first, last) {
        row[col] = Some(day);
        col += 1;
        if col == 7 {
            rows.push(row);
            row = [None; 7];
            col = 0;
        }
    }
    if col > 0 {
        rows.push(row);
    }
    rows
}

/// Normalize a wall-clock time to zero-padded `HH:MM`
///
/// Accepts `H`, `HH`, `H:M`, `HH:MM`, `HHMM` and similar partial forms.
/// Hours clamp to 0-23 and minutes to 0-59; missing minutes become `00`.
/// Empty input stays empty. Text that is not one or two digit groups with an
/// optional colon is returned trimmed and otherwise unchanged.
pub fn normalize_time(text: &str) -> String {
    let s = text.trim();
    if s.is_empty() {
        return String::new();
    }

    let Some((hours, minutes)) = split_time_groups(s) else {
        return s.to_string();
    };

    let hh = hours.parse::<u32>().unwrap_or(0).min(23);
    let mm = if minutes.is_empty() {
        0
    } else {
        minutes.parse::<u32>().unwrap_or(0).min(59)
    };

    format!("{:02}:{:02}", hh, mm)
}

/// Split `s` into an hour group (1-2 digits) and a minute group (0-2 digits)
fn split_time_groups(s: &str) -> Option<(&str, &str)> {
    let all_digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());

    let (hours, minutes) = match s.split_once(':') {
        Some((h, m)) => (h, m),
        // Without a colon the hour group takes up to two leading digits
        None if all_digits(s) => s.split_at(s.len().min(2)),
        None => return None,
    };

    let hours_ok = (1..=2).contains(&hours.len()) && all_digits(hours);
    let minutes_ok = minutes.len() <= 2 && all_digits(minutes);
    (hours_ok && minutes_ok).then_some((hours, minutes))
}

/// Default start and end time for a new event
///
/// The start is the first slot boundary strictly after `now`, the end is one
/// slot later. Both wrap past midnight.
pub fn default_slot(now: NaiveTime, slot_minutes: u32) -> (String, String) {
    let slot = slot_minutes.max(1);
    let total = now.hour() * 60 + now.minute();
    let start = (total + 1).div_ceil(slot) * slot;
    let end = start + slot;
    (minutes_to_hhmm(start), minutes_to_hhmm(end))
}

fn minutes_to_hhmm(minutes: u32) -> String {
    format!("{:02}:{:02}", (minutes / 60) % 24, minutes % 60)
}
