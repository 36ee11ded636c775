//! Core domain types for Almanac.
//!
//! This module defines the records exchanged with storage and the values the
//! recurrence engine produces:
//! - Series (the persisted recurring-event definition)
//! - Frequencies, week-of-month selectors and the legacy `repeat` field
//! - Occurrences (derived, never persisted)
//! - Unscheduled items

use crate::calendar;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Recurrence Vocabulary
// ============================================================================

/// How often a series repeats
///
/// Stored as lowercase text. Values outside the known set are preserved as
/// `Other` so that records written by older tooling still expand (through
/// the engine's fallback rules) and survive a save unchanged.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(from = "String", into = "String")]
pub enum RepeatFrequency {
    #[default]
    None,
    Daily,
    Monthly,
    Quarterly,
    Other(String),
}

impl From<String> for RepeatFrequency {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "" | "none" => RepeatFrequency::None,
            "daily" => RepeatFrequency::Daily,
            "monthly" => RepeatFrequency::Monthly,
            "quarterly" => RepeatFrequency::Quarterly,
            _ => RepeatFrequency::Other(s),
        }
    }
}

impl From<RepeatFrequency> for String {
    fn from(freq: RepeatFrequency) -> Self {
        freq.to_string()
    }
}

impl fmt::Display for RepeatFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepeatFrequency::None => write!(f, "none"),
            RepeatFrequency::Daily => write!(f, "daily"),
            RepeatFrequency::Monthly => write!(f, "monthly"),
            RepeatFrequency::Quarterly => write!(f, "quarterly"),
            RepeatFrequency::Other(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid repeat frequency: {0} (expected none, daily, monthly or quarterly)")]
pub struct ParseRepeatFrequencyError(String);

/// Strict parsing for user input: only the four supported frequencies
impl FromStr for RepeatFrequency {
    type Err = ParseRepeatFrequencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match RepeatFrequency::from(s.to_string()) {
            RepeatFrequency::Other(_) => Err(ParseRepeatFrequencyError(s.to_string())),
            freq => Ok(freq),
        }
    }
}

/// Week-of-month selector, 1 through 4
///
/// Stored as the tokens `week1`..`week4`; bare integers are accepted on input.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "WeekRepr", into = "String")]
pub struct WeekSelector(u8);

impl WeekSelector {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 4;

    pub fn new(week: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&week).then_some(Self(week))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Parse a legacy `weekN` tag; anything else (including `week5`) is `None`
    pub fn from_token(token: &str) -> Option<Self> {
        let n = token.trim().strip_prefix("week")?;
        if n.len() != 1 {
            return None;
        }
        n.parse::<u8>().ok().and_then(Self::new)
    }

    /// Whether this selector covers a `week_of_month` value
    pub fn covers(self, week_of_month: u32) -> bool {
        u32::from(self.0) == week_of_month
    }
}

impl fmt::Display for WeekSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "week{}", self.0)
    }
}

impl From<WeekSelector> for String {
    fn from(week: WeekSelector) -> Self {
        week.to_string()
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("Invalid week selector: {0} (expected 1-4 or week1-week4)")]
pub struct ParseWeekSelectorError(String);

impl FromStr for WeekSelector {
    type Err = ParseWeekSelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_token(s)
            .or_else(|| s.trim().parse::<u8>().ok().and_then(Self::new))
            .ok_or_else(|| ParseWeekSelectorError(s.to_string()))
    }
}

/// Wire forms a week selector may take in stored JSON
#[derive(Deserialize)]
#[serde(untagged)]
enum WeekRepr {
    Number(u64),
    Token(String),
}

impl TryFrom<WeekRepr> for WeekSelector {
    type Error = ParseWeekSelectorError;

    fn try_from(repr: WeekRepr) -> Result<Self, Self::Error> {
        match repr {
            WeekRepr::Number(n) => u8::try_from(n)
                .ok()
                .and_then(WeekSelector::new)
                .ok_or_else(|| ParseWeekSelectorError(n.to_string())),
            WeekRepr::Token(s) => s.parse(),
        }
    }
}

/// The legacy `repeat` field: one token or a mixed list of tokens
///
/// Only normalization reads this; new records never write it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum LegacyRepeat {
    One(String),
    Many(Vec<String>),
}

impl LegacyRepeat {
    pub fn tokens(&self) -> Vec<&str> {
        match self {
            LegacyRepeat::One(s) => vec![s.as_str()],
            LegacyRepeat::Many(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

// ============================================================================
// Series
// ============================================================================

/// A persisted recurring-event definition
///
/// Field names follow the JSON storage format. The recurrence fields are kept
/// exactly as stored; `recurrence::normalize` turns them into a canonical rule.
/// Stored fields this type does not know about are carried in `extra` and
/// written back as they were.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Series {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(deserialize_with = "iso_date")]
    pub start_date: NaiveDate,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub start_time: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub end_time: String,

    #[serde(
        rename = "repeatFreq",
        alias = "repeatFrequency",
        default,
        deserialize_with = "blank_as_absent",
        skip_serializing_if = "Option::is_none"
    )]
    pub repeat_frequency: Option<RepeatFrequency>,

    #[serde(
        default,
        deserialize_with = "lenient_weeks",
        skip_serializing_if = "Option::is_none"
    )]
    pub repeat_weeks: Option<Vec<WeekSelector>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<LegacyRepeat>,

    #[serde(default, deserialize_with = "iso_dates")]
    pub exclusions: Vec<NaiveDate>,

    #[serde(default, deserialize_with = "optional_iso_date")]
    pub end_date: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Series {
    /// A new-format, non-repeating series with no id yet
    pub fn new(name: impl Into<String>, start_date: NaiveDate) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            start_date,
            start_time: String::new(),
            end_time: String::new(),
            repeat_frequency: Some(RepeatFrequency::None),
            repeat_weeks: Some(Vec::new()),
            repeat: None,
            exclusions: Vec::new(),
            end_date: None,
            created_at: Some(Utc::now()),
            extra: Map::new(),
        }
    }

    pub fn with_times(mut self, start_time: impl Into<String>, end_time: impl Into<String>) -> Self {
        self.start_time = start_time.into();
        self.end_time = end_time.into();
        self
    }

    pub fn with_repeat(mut self, frequency: RepeatFrequency, weeks: Vec<WeekSelector>) -> Self {
        self.repeat_frequency = Some(frequency);
        self.repeat_weeks = Some(weeks);
        self.repeat = None;
        self
    }

    pub fn is_excluded(&self, date: NaiveDate) -> bool {
        self.exclusions.contains(&date)
    }
}

// ============================================================================
// Occurrences
// ============================================================================

/// The recurrence settings an occurrence was produced from, for display
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RepeatSnapshot {
    pub repeat_weeks: Vec<WeekSelector>,
    #[serde(rename = "repeatFreq")]
    pub repeat_frequency: RepeatFrequency,
}

impl RepeatSnapshot {
    pub fn is_repeating(&self) -> bool {
        !self.repeat_weeks.is_empty() || self.repeat_frequency != RepeatFrequency::None
    }
}

impl fmt::Display for RepeatSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.repeat_weeks.is_empty() {
            let weeks: Vec<String> = self.repeat_weeks.iter().map(|w| w.to_string()).collect();
            write!(f, "{} ", weeks.join(", "))?;
        }
        write!(f, "{}", self.repeat_frequency)
    }
}

/// One concrete calendar day on which a series falls
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    pub date: NaiveDate,
    pub series_id: String,
    pub name: String,
    pub start_time: String,
    pub end_time: String,
    pub repeat: RepeatSnapshot,
}

// ============================================================================
// Unscheduled Items
// ============================================================================

/// A named item waiting to be placed on the calendar
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UnscheduledItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Field readers
// ============================================================================

fn iso_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    calendar::parse_iso(&text)
        .ok_or_else(|| de::Error::custom(format!("invalid ISO date: {:?}", text)))
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_weeks<'de, D>(deserializer: D) -> Result<Option<Vec<WeekSelector>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?;
    Ok(raw.map(|values| {
        values
            .into_iter()
            .filter_map(|v| match serde_json::from_value::<WeekSelector>(v.clone()) {
                Ok(week) => Some(week),
                Err(_) => {
                    tracing::warn!("Ignoring unsupported week selector {}", v);
                    None
                }
            })
            .collect()
    }))
}

/// A blank frequency reads as absent, like a missing field
fn blank_as_absent<'de, D>(deserializer: D) -> Result<Option<RepeatFrequency>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .filter(|s| !s.trim().is_empty())
        .map(RepeatFrequency::from))
}

fn iso_dates<'de, D>(deserializer: D) -> Result<Vec<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default();
    raw.iter()
        .map(|s| {
            calendar::parse_iso(s)
                .ok_or_else(|| de::Error::custom(format!("invalid exclusion date: {:?}", s)))
        })
        .collect()
}

fn optional_iso_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(s) if !s.trim().is_empty() => calendar::parse_iso(&s)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid end date: {:?}", s))),
        _ => Ok(None),
    }
}
