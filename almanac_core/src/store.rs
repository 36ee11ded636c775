//! Series persistence with file locking.
//!
//! Series live in a single JSON array (`events.json`), in insertion order.
//! Every mutation is a locked load-modify-save cycle so that concurrent
//! `almanac` processes never lose each other's writes.

use crate::calendar::normalize_time;
use crate::{Error, Result, Series};
use chrono::{NaiveDate, Utc};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// File name of the series store inside the data directory
pub const SERIES_FILE: &str = "events.json";

/// Storage interface for series records
pub trait SeriesStore {
    /// All series in insertion order
    fn list(&self) -> Result<Vec<Series>>;

    fn get(&self, id: &str) -> Result<Series>;

    /// Store a new series and return it as stored
    ///
    /// The name is trimmed and times are normalized to `HH:MM`. A missing id
    /// is generated. A series identical to an existing one in name, start
    /// date and times is rejected with [`Error::Duplicate`].
    fn create(&mut self, series: Series) -> Result<Series>;

    /// Replace the series stored under `id`
    fn replace(&mut self, id: &str, series: Series) -> Result<Series>;

    /// Remove a series, returning the removed record
    fn delete(&mut self, id: &str) -> Result<Series>;

    /// Skip one date of a series; adding the same date twice is a no-op
    fn add_exclusion(&mut self, id: &str, date: NaiveDate) -> Result<Series>;

    fn set_end_date(&mut self, id: &str, date: NaiveDate) -> Result<Series>;

    /// Overwrite the whole collection
    fn replace_all(&mut self, series: Vec<Series>) -> Result<()>;
}

/// Generate a fresh series id
pub fn new_series_id() -> String {
    format!("ts-{}", uuid::Uuid::new_v4().simple())
}

// ============================================================================
// Record operations shared by every store
// ============================================================================

fn canonicalize(series: &mut Series) {
    series.id = series.id.trim().to_string();
    series.name = series.name.trim().to_string();
    series.start_time = normalize_time(&series.start_time);
    series.end_time = normalize_time(&series.end_time);
}

/// Same name, start date and times once both sides are normalized
fn same_slot(a: &Series, b: &Series) -> bool {
    a.name.trim() == b.name.trim()
        && a.start_date == b.start_date
        && normalize_time(&a.start_time) == normalize_time(&b.start_time)
        && normalize_time(&a.end_time) == normalize_time(&b.end_time)
}

fn position(records: &[Series], id: &str) -> Result<usize> {
    records
        .iter()
        .position(|s| s.id == id)
        .ok_or_else(|| Error::NotFound(format!("series {}", id)))
}

fn insert_new(records: &mut Vec<Series>, mut series: Series) -> Result<Series> {
    canonicalize(&mut series);
    if series.name.is_empty() {
        return Err(Error::InvalidInput("series name is required".into()));
    }

    if let Some(existing) = records.iter().find(|s| same_slot(s, &series)) {
        tracing::warn!(
            "Create blocked, {:?} on {} duplicates series {}",
            series.name,
            series.start_date,
            existing.id
        );
        return Err(Error::Duplicate(Box::new(existing.clone())));
    }

    if series.id.is_empty() {
        series.id = new_series_id();
    } else if records.iter().any(|s| s.id == series.id) {
        return Err(Error::InvalidInput(format!(
            "series id {} is already in use",
            series.id
        )));
    }
    if series.created_at.is_none() {
        series.created_at = Some(Utc::now());
    }

    records.push(series.clone());
    tracing::debug!("Created series {}", series.id);
    Ok(series)
}

fn replace_existing(records: &mut [Series], id: &str, mut series: Series) -> Result<Series> {
    let idx = position(records, id)?;
    canonicalize(&mut series);
    series.id = id.to_string();
    if series.created_at.is_none() {
        series.created_at = records[idx].created_at;
    }
    for (key, value) in &records[idx].extra {
        series
            .extra
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
    records[idx] = series.clone();
    Ok(series)
}

fn remove(records: &mut Vec<Series>, id: &str) -> Result<Series> {
    let idx = position(records, id)?;
    Ok(records.remove(idx))
}

fn exclude(records: &mut [Series], id: &str, date: NaiveDate) -> Result<Series> {
    let idx = position(records, id)?;
    let series = &mut records[idx];
    if !series.is_excluded(date) {
        series.exclusions.push(date);
    }
    Ok(series.clone())
}

fn end_on(records: &mut [Series], id: &str, date: NaiveDate) -> Result<Series> {
    let idx = position(records, id)?;
    records[idx].end_date = Some(date);
    Ok(records[idx].clone())
}

// ============================================================================
// JSON file storage
// ============================================================================

/// A JSON array of records on disk
///
/// Reads take a shared lock on the file. Writes go through a temp file in the
/// same directory that is synced and renamed over the target, and
/// [`JsonArrayFile::update`] holds an exclusive lock on a `.lock` sidecar for
/// the whole cycle. Records that cannot be read are never dropped: every
/// rewrite keeps them verbatim after the readable ones.
#[derive(Clone, Debug)]
pub(crate) struct JsonArrayFile {
    path: PathBuf,
}

/// The contents of a store file, split by readability
struct Contents<T> {
    records: Vec<T>,
    unreadable: Vec<Value>,
}

impl<T> Default for Contents<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            unreadable: Vec::new(),
        }
    }
}

impl JsonArrayFile {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    fn sidecar(&self, suffix: &str) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(suffix);
        PathBuf::from(name)
    }

    /// Load every readable record
    ///
    /// A missing file is an empty collection. A file that is not a JSON
    /// array is moved aside to `<file>.corrupt` and treated as empty.
    /// Individual records that cannot be read are skipped.
    pub(crate) fn load<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        Ok(self.read::<T>()?.records)
    }

    fn read<T: DeserializeOwned>(&self) -> Result<Contents<T>> {
        if !self.path.exists() {
            tracing::debug!("No store file at {:?}, starting empty", self.path);
            return Ok(Contents::default());
        }

        let contents = {
            let file = File::open(&self.path)?;
            file.lock_shared()?;
            let mut contents = String::new();
            let read = std::io::BufReader::new(&file).read_to_string(&mut contents);
            file.unlock()?;
            read?;
            contents
        };

        if contents.trim().is_empty() {
            return Ok(Contents::default());
        }

        let values = match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Array(values)) => values,
            Ok(_) => {
                self.set_aside("top-level value is not an array")?;
                return Ok(Contents::default());
            }
            Err(e) => {
                self.set_aside(&e.to_string())?;
                return Ok(Contents::default());
            }
        };

        let mut loaded = Contents {
            records: Vec::with_capacity(values.len()),
            unreadable: Vec::new(),
        };
        for (index, value) in values.into_iter().enumerate() {
            match serde_json::from_value::<T>(value.clone()) {
                Ok(record) => loaded.records.push(record),
                Err(e) => {
                    tracing::warn!(
                        "Skipping unreadable record {} in {:?}: {}",
                        index,
                        self.path,
                        e
                    );
                    loaded.unreadable.push(value);
                }
            }
        }

        tracing::debug!(
            "Loaded {} records from {:?} ({} unreadable)",
            loaded.records.len(),
            self.path,
            loaded.unreadable.len()
        );
        Ok(loaded)
    }

    fn set_aside(&self, reason: &str) -> Result<()> {
        let corrupt = self.sidecar(".corrupt");
        tracing::warn!(
            "Store file {:?} is corrupted ({}). Moving it to {:?} and starting empty.",
            self.path,
            reason,
            corrupt
        );
        std::fs::rename(&self.path, &corrupt)?;
        Ok(())
    }

    /// Atomically write the whole collection, unreadable records last
    fn save<T: Serialize>(&self, contents: &Contents<T>) -> Result<()> {
        let parent = self.path.parent().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "store path missing parent")
        })?;
        std::fs::create_dir_all(parent)?;

        let mut values = contents
            .records
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        values.extend(contents.unreadable.iter().cloned());

        let temp = NamedTempFile::new_in(parent)?;
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, &values)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;

        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved {} records to {:?}", values.len(), self.path);
        Ok(())
    }

    /// Load, modify and save under an exclusive lock
    ///
    /// `f` sees only the readable records. Nothing is written when `f` fails.
    pub(crate) fn update<T, R, F>(&self, f: F) -> Result<R>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut Vec<T>) -> Result<R>,
    {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.sidecar(".lock"))?;
        lock.lock_exclusive()?;

        let outcome = self.read::<T>().and_then(|mut contents| {
            let result = f(&mut contents.records)?;
            self.save(&contents)?;
            Ok(result)
        });

        lock.unlock()?;
        outcome
    }
}

/// Series store backed by `events.json`
#[derive(Clone, Debug)]
pub struct JsonSeriesStore {
    file: JsonArrayFile,
}

impl JsonSeriesStore {
    /// Store at an explicit file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonArrayFile::new(path),
        }
    }

    /// Store at `events.json` inside `data_dir`
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(SERIES_FILE))
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl SeriesStore for JsonSeriesStore {
    fn list(&self) -> Result<Vec<Series>> {
        self.file.load()
    }

    fn get(&self, id: &str) -> Result<Series> {
        self.list()?
            .into_iter()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::NotFound(format!("series {}", id)))
    }

    fn create(&mut self, series: Series) -> Result<Series> {
        self.file
            .update(|records: &mut Vec<Series>| insert_new(records, series))
    }

    fn replace(&mut self, id: &str, series: Series) -> Result<Series> {
        self.file
            .update(|records: &mut Vec<Series>| replace_existing(records, id, series))
    }

    fn delete(&mut self, id: &str) -> Result<Series> {
        let removed = self
            .file
            .update(|records: &mut Vec<Series>| remove(records, id))?;
        tracing::info!("Deleted series {}", removed.id);
        Ok(removed)
    }

    fn add_exclusion(&mut self, id: &str, date: NaiveDate) -> Result<Series> {
        self.file
            .update(|records: &mut Vec<Series>| exclude(records, id, date))
    }

    fn set_end_date(&mut self, id: &str, date: NaiveDate) -> Result<Series> {
        self.file
            .update(|records: &mut Vec<Series>| end_on(records, id, date))
    }

    fn replace_all(&mut self, series: Vec<Series>) -> Result<()> {
        self.file.update(|records: &mut Vec<Series>| {
            *records = series;
            Ok(())
        })
    }
}

/// In-process series store, mainly for tests and embedding
#[derive(Clone, Debug, Default)]
pub struct MemorySeriesStore {
    records: Vec<Series>,
}

impl MemorySeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing records, kept as given
    pub fn with_series(records: Vec<Series>) -> Self {
        Self { records }
    }
}

impl SeriesStore for MemorySeriesStore {
    fn list(&self) -> Result<Vec<Series>> {
        Ok(self.records.clone())
    }

    fn get(&self, id: &str) -> Result<Series> {
        let idx = position(&self.records, id)?;
        Ok(self.records[idx].clone())
    }

    fn create(&mut self, series: Series) -> Result<Series> {
        insert_new(&mut self.records, series)
    }

    fn replace(&mut self, id: &str, series: Series) -> Result<Series> {
        replace_existing(&mut self.records, id, series)
    }

    fn delete(&mut self, id: &str) -> Result<Series> {
        remove(&mut self.records, id)
    }

    fn add_exclusion(&mut self, id: &str, date: NaiveDate) -> Result<Series> {
        exclude(&mut self.records, id, date)
    }

    fn set_end_date(&mut self, id: &str, date: NaiveDate) -> Result<Series> {
        end_on(&mut self.records, id, date)
    }

    fn replace_all(&mut self, series: Vec<Series>) -> Result<()> {
        self.records = series;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging;
    use crate::RepeatFrequency;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Behaviour every store must share
    fn check_store_contract(store: &mut dyn SeriesStore) {
        let created = store
            .create(Series::new("  Standup ", date(2024, 1, 10)).with_times("9", "9:3"))
            .unwrap();
        assert!(created.id.starts_with("ts-"));
        assert_eq!(created.name, "Standup");
        assert_eq!(created.start_time, "09:00");
        assert_eq!(created.end_time, "09:03");

        let dup = store
            .create(Series::new("Standup", date(2024, 1, 10)).with_times("09:00", "09:03"))
            .unwrap_err();
        match dup {
            Error::Duplicate(existing) => assert_eq!(existing.id, created.id),
            other => panic!("expected duplicate, got {:?}", other),
        }

        // A different time is a different series
        let second = store
            .create(Series::new("Standup", date(2024, 1, 10)).with_times("10:00", ""))
            .unwrap();
        assert_ne!(second.id, created.id);

        let ids: Vec<String> = store.list().unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![created.id.clone(), second.id.clone()]);

        store.add_exclusion(&created.id, date(2024, 1, 12)).unwrap();
        let excluded = store.add_exclusion(&created.id, date(2024, 1, 12)).unwrap();
        assert_eq!(excluded.exclusions, vec![date(2024, 1, 12)]);

        let ended = store.set_end_date(&created.id, date(2024, 3, 1)).unwrap();
        assert_eq!(ended.end_date, Some(date(2024, 3, 1)));

        let replaced = store
            .replace(
                &created.id,
                Series::new(" Daily standup", date(2024, 1, 10))
                    .with_times("9:15", "")
                    .with_repeat(RepeatFrequency::Daily, vec![]),
            )
            .unwrap();
        assert_eq!(replaced.id, created.id);
        assert_eq!(replaced.name, "Daily standup");
        assert_eq!(replaced.start_time, "09:15");
        assert_eq!(store.get(&created.id).unwrap(), replaced);

        let removed = store.delete(&second.id).unwrap();
        assert_eq!(removed.id, second.id);
        assert!(matches!(store.get(&second.id), Err(Error::NotFound(_))));
        assert!(matches!(store.delete(&second.id), Err(Error::NotFound(_))));
        assert!(matches!(
            store.add_exclusion("missing", date(2024, 1, 1)),
            Err(Error::NotFound(_))
        ));

        store.replace_all(Vec::new()).unwrap();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_memory_store_contract() {
        check_store_contract(&mut MemorySeriesStore::new());
    }

    #[test]
    fn test_json_store_contract() {
        logging::init_test();
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = JsonSeriesStore::in_dir(temp_dir.path());
        check_store_contract(&mut store);
    }

    #[test]
    fn test_create_requires_name() {
        let mut store = MemorySeriesStore::new();
        let err = store.create(Series::new("   ", date(2024, 1, 1))).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_create_rejects_reused_id() {
        let mut store = MemorySeriesStore::new();
        let mut first = Series::new("One", date(2024, 1, 1));
        first.id = "ts-fixed".into();
        store.create(first).unwrap();

        let mut second = Series::new("Two", date(2024, 1, 2));
        second.id = "ts-fixed".into();
        assert!(matches!(store.create(second), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_duplicate_check_normalizes_stored_records() {
        let mut legacy = Series::new("Yoga ", date(2024, 5, 1)).with_times("7", "8:0");
        legacy.id = "ts-legacy".into();
        let mut store = MemorySeriesStore::with_series(vec![legacy]);

        let err = store
            .create(Series::new("Yoga", date(2024, 5, 1)).with_times("07:00", "08:00"))
            .unwrap_err();
        assert!(matches!(err, Error::Duplicate(_)));
    }

    #[test]
    fn test_json_store_persists_across_instances() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = JsonSeriesStore::in_dir(temp_dir.path());
        let created = store.create(Series::new("Review", date(2024, 2, 2))).unwrap();

        let reopened = JsonSeriesStore::in_dir(temp_dir.path());
        assert_eq!(reopened.get(&created.id).unwrap().name, "Review");
    }

    #[test]
    fn test_missing_file_is_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = JsonSeriesStore::in_dir(temp_dir.path());
        assert!(store.list().unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_corrupted_file_is_set_aside() {
        logging::init_test();
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(SERIES_FILE);
        std::fs::write(&path, "{ invalid json").unwrap();

        let mut store = JsonSeriesStore::new(&path);
        assert!(store.list().unwrap().is_empty());
        assert!(temp_dir.path().join("events.json.corrupt").exists());

        store.create(Series::new("Fresh", date(2024, 1, 1))).unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_unreadable_records_are_skipped() {
        logging::init_test();
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(SERIES_FILE);
        std::fs::write(
            &path,
            r#"[
                {"id": "ts-1", "name": "Good", "startDate": "2024-01-01"},
                {"id": "ts-2", "name": "No date"},
                {"id": "ts-3", "name": "Legacy", "startDate": "2024-01-02", "repeat": ["week1", "weekly"]}
            ]"#,
        )
        .unwrap();

        let store = JsonSeriesStore::new(&path);
        let ids: Vec<String> = store.list().unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["ts-1", "ts-3"]);
    }

    #[test]
    fn test_writes_keep_unreadable_records_and_unknown_fields() {
        logging::init_test();
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(SERIES_FILE);
        std::fs::write(
            &path,
            r#"[
                {"id": "ts-1", "name": "Ended", "startDate": "2024-01-01",
                 "repeatFreq": "daily", "color": "red", "endDate": "2024-13-01"},
                {"id": "ts-2", "name": "Typo", "startDate": "2024-02-30"},
                {"id": "ts-3", "name": "Tagged", "startDate": "2024-01-03", "color": "blue"}
            ]"#,
        )
        .unwrap();

        let mut store = JsonSeriesStore::new(&path);
        let ids: Vec<String> = store.list().unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["ts-3"]);

        store.create(Series::new("Unrelated", date(2024, 3, 1))).unwrap();
        store.add_exclusion("ts-3", date(2024, 1, 4)).unwrap();
        store
            .replace("ts-3", Series::new("Retagged", date(2024, 1, 3)))
            .unwrap();

        let raw: Vec<serde_json::Value> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let by_id = |id: &str| raw.iter().find(|r| r["id"] == id).cloned().unwrap();

        assert_eq!(raw.len(), 4);
        assert_eq!(by_id("ts-1")["endDate"], "2024-13-01");
        assert_eq!(by_id("ts-1")["color"], "red");
        assert_eq!(by_id("ts-2")["startDate"], "2024-02-30");
        assert_eq!(by_id("ts-3")["name"], "Retagged");
        assert_eq!(by_id("ts-3")["color"], "blue");
    }

    #[test]
    fn test_failed_update_writes_nothing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = JsonSeriesStore::in_dir(temp_dir.path());
        store.create(Series::new("Keep", date(2024, 1, 1))).unwrap();
        let before = std::fs::read_to_string(store.path()).unwrap();

        assert!(store.delete("missing").is_err());
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), before);
    }

    #[test]
    fn test_atomic_save_leaves_no_temp_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = JsonSeriesStore::in_dir(temp_dir.path());
        store.create(Series::new("Only", date(2024, 1, 1))).unwrap();

        let extras: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name != SERIES_FILE && name != "events.json.lock")
            .collect();
        assert!(extras.is_empty(), "Unexpected files: {:?}", extras);
    }

    #[test]
    fn test_written_file_uses_storage_field_names() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = JsonSeriesStore::in_dir(temp_dir.path());
        store
            .create(
                Series::new("Report", date(2024, 4, 2))
                    .with_repeat(RepeatFrequency::Quarterly, vec![]),
            )
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw[0]["startDate"], "2024-04-02");
        assert_eq!(raw[0]["repeatFreq"], "quarterly");
        assert_eq!(raw[0]["exclusions"], serde_json::json!([]));
    }
}
