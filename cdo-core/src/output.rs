use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::model::{DateRange, Record, ResultSet};

/// File name used when no explicit output path is given, e.g. `noaa_gsod_2024.csv`.
pub fn default_file_name(dataset: &str, range: DateRange) -> String {
    let dataset = dataset.to_lowercase();
    match range.whole_year() {
        Some(year) => format!("noaa_{dataset}_{year}.csv"),
        None => format!(
            "noaa_{dataset}_{}_{}.csv",
            range.start().format("%Y%m%d"),
            range.end().format("%Y%m%d")
        ),
    }
}

pub fn default_output_path(output_dir: &Path, dataset: &str, range: DateRange) -> PathBuf {
    output_dir.join(default_file_name(dataset, range))
}

/// Writes `results` to `path` as CSV, returning the number of data rows.
///
/// The header is the union of all field names in first-seen order; records that lack a
/// field get an empty cell. The file is written next to `path` and renamed into place,
/// so a failure never leaves a partial file behind.
pub fn write_csv(results: &ResultSet, path: &Path) -> Result<usize> {
    if results.is_empty() {
        return Err(anyhow!("Refusing to write an empty result set to {}", path.display()));
    }

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;

    if results.is_heterogeneous() {
        warn!("records have differing field sets; writing the union of all fields");
    }

    let header = results.field_names();
    info!(path = %path.display(), rows = results.len(), columns = header.len(), "writing CSV");

    let tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temporary file in {}", parent.display()))?;

    {
        let mut wtr = csv::Writer::from_writer(tmp.as_file());
        wtr.write_record(&header).context("Failed to write CSV header")?;

        for record in results.records() {
            wtr.write_record(header.iter().map(|name| cell(record, name)))
                .context("Failed to write CSV row")?;
        }

        wtr.flush().context("Failed to flush CSV output")?;
    }

    tmp.persist(path)
        .with_context(|| format!("Failed to write output file: {}", path.display()))?;

    info!(rows = results.len(), "CSV written successfully");
    Ok(results.len())
}

fn cell(record: &Record, name: &str) -> String {
    match record.get(name) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn default_names_follow_range() {
        let year = DateRange::year(2024).unwrap();
        assert_eq!(default_file_name("GSOD", year), "noaa_gsod_2024.csv");

        let partial = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        )
        .unwrap();
        assert_eq!(default_file_name("GHCND", partial), "noaa_ghcnd_20240101_20240331.csv");
        assert_eq!(
            default_output_path(Path::new("data/raw"), "GSOD", year),
            PathBuf::from("data/raw/noaa_gsod_2024.csv")
        );
    }

    #[test]
    fn writes_header_and_one_line_per_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/out/noaa.csv");

        let results = ResultSet::from(
            (1..=5)
                .map(|d| record(json!({"date": format!("2024-01-0{d}"), "value": d})))
                .collect::<Vec<_>>(),
        );

        let rows = write_csv(&results, &path).unwrap();
        assert_eq!(rows, 5);

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "date,value");
        assert_eq!(lines[1], "2024-01-01,1");
        assert_eq!(lines[5], "2024-01-05,5");
    }

    #[test]
    fn heterogeneous_records_use_union_header() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mixed.csv");

        let results = ResultSet::from(vec![
            record(json!({"date": "2024-01-01", "value": 1.5})),
            record(json!({"date": "2024-01-02", "attributes": "H,,S,", "value": null})),
        ]);

        write_csv(&results, &path).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "date,value,attributes\n2024-01-01,1.5,\n2024-01-02,,\"H,,S,\"\n");
    }

    #[test]
    fn empty_result_set_is_not_written() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("empty.csv");

        let err = write_csv(&ResultSet::new(), &path).unwrap_err();
        assert!(err.to_string().contains("empty result set"));
        assert!(!path.exists());
    }

    #[test]
    fn existing_file_is_replaced() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.csv");
        fs::write(&path, "stale\n").unwrap();

        write_csv(&ResultSet::from(vec![record(json!({"a": true}))]), &path).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "a\ntrue\n");
    }
}
