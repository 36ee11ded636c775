//! CSV export of occurrences.
//!
//! One row per occurrence, in the order given. Dates are ISO text so the
//! file sorts and imports cleanly into spreadsheets.

use crate::calendar::iso_text;
use crate::{Occurrence, Result};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow<'a> {
    date: String,
    series_id: &'a str,
    name: &'a str,
    start_time: &'a str,
    end_time: &'a str,
    repeat: String,
}

impl<'a> From<&'a Occurrence> for CsvRow<'a> {
    fn from(occurrence: &'a Occurrence) -> Self {
        CsvRow {
            date: iso_text(occurrence.date),
            series_id: &occurrence.series_id,
            name: &occurrence.name,
            start_time: &occurrence.start_time,
            end_time: &occurrence.end_time,
            repeat: occurrence.repeat.to_string(),
        }
    }
}

/// Write occurrences as CSV, with a header row, to any writer
pub fn write_occurrences<W: Write>(occurrences: &[Occurrence], out: W) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(true).from_writer(out);
    for occurrence in occurrences {
        writer.serialize(CsvRow::from(occurrence))?;
    }
    writer.flush()?;
    Ok(())
}

/// Export occurrences to a CSV file, replacing any previous content
///
/// Returns the number of rows written. The file is synced before returning.
pub fn export_csv(occurrences: &[Occurrence], csv_path: &Path) -> Result<usize> {
    if let Some(parent) = csv_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = File::create(csv_path)?;
    write_occurrences(occurrences, &file)?;
    file.sync_all()?;

    tracing::info!("Exported {} occurrences to {:?}", occurrences.len(), csv_path);
    Ok(occurrences.len())
}
