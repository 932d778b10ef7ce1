use std::{
    fs,
    ops::Range,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use tracing::info;

pub const DEFAULT_PARTS: usize = 4;

/// Row ranges for cutting `rows` into `parts` contiguous slices.
///
/// Slice `i` ends at `ceil(rows * i / parts)`, so earlier parts take the extra rows and
/// later parts may be empty when there are fewer rows than parts.
pub fn part_bounds(rows: usize, parts: usize) -> Vec<Range<usize>> {
    if parts == 0 {
        return Vec::new();
    }

    let mut bounds = Vec::with_capacity(parts);
    let mut start = 0;
    for i in 1..=parts {
        let end = (rows * i).div_ceil(parts);
        bounds.push(start..end);
        start = end;
    }
    bounds
}

/// One written part file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPart {
    pub path: PathBuf,
    pub rows: usize,
}

/// Splits the CSV at `input` into `parts` files named `<prefix>_<n>.csv` in `out_dir`,
/// each starting with the input's header row.
pub fn split_csv(input: &Path, out_dir: &Path, prefix: &str, parts: usize) -> Result<Vec<SplitPart>> {
    if parts == 0 {
        return Err(anyhow!("Number of parts must be at least 1"));
    }

    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(input)
        .with_context(|| format!("Failed to open input CSV: {}", input.display()))?;

    let header = rdr
        .byte_headers()
        .with_context(|| format!("Failed to read CSV header: {}", input.display()))?
        .clone();

    let body = rdr
        .byte_records()
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read CSV rows: {}", input.display()))?;

    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory: {}", out_dir.display()))?;

    let mut written = Vec::with_capacity(parts);
    for (n, bounds) in part_bounds(body.len(), parts).into_iter().enumerate() {
        let path = out_dir.join(format!("{prefix}_{}.csv", n + 1));

        let mut wtr = csv::WriterBuilder::new()
            .flexible(true)
            .from_path(&path)
            .with_context(|| format!("Failed to create part file: {}", path.display()))?;
        wtr.write_byte_record(&header)
            .with_context(|| format!("Failed to write header to {}", path.display()))?;
        for record in &body[bounds.clone()] {
            wtr.write_byte_record(record)
                .with_context(|| format!("Failed to write row to {}", path.display()))?;
        }
        wtr.flush().with_context(|| format!("Failed to flush {}", path.display()))?;

        info!(path = %path.display(), rows = bounds.len(), "wrote part");
        written.push(SplitPart { path, rows: bounds.len() });
    }

    Ok(written)
}

/// Default prefix for part files: the input's file stem.
pub fn default_prefix(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "part".to_string())
}
