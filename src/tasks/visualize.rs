//! Aggregates every per-version result table into `results/result.csv`.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::data::{read_result_table, to_csv, ResultRow, RESULT_FILE, REVIEWED_RESULT_FILE};
use crate::error::DataError;
use crate::utils::write_atomic;

type RowKey = (String, String, String, String, String);

fn owned_key(row: &ResultRow) -> RowKey {
    let (detector, project, version, misuse, finding) = row.key();
    (
        detector.to_string(),
        project.to_string(),
        version.to_string(),
        misuse.to_string(),
        finding.to_string(),
    )
}

/// Concatenates all result tables below `results_path`, preferring reviewed rows.
///
/// A `reviewed-result.csv` next to a `result.csv` overrides the computed rows
/// it shares a (detector, project, version, misuse, finding) key with.
/// Returns the aggregated rows, which are also written to
/// `<results_path>/result.csv`.
pub fn visualize(results_path: &Path) -> Result<Vec<ResultRow>, DataError> {
    let aggregate = results_path.join(RESULT_FILE);
    let mut rows = Vec::new();

    if results_path.is_dir() {
        let walker = WalkDir::new(results_path).min_depth(2).sort_by_file_name();
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() || entry.file_name() != RESULT_FILE {
                continue;
            }

            let table = entry.path();
            let reviewed: HashMap<RowKey, ResultRow> =
                read_result_table(&table.with_file_name(REVIEWED_RESULT_FILE))?
                    .into_iter()
                    .map(|row| (owned_key(&row), row))
                    .collect();
            debug!(table = %table.display(), reviewed = reviewed.len(), "Aggregating");

            for row in read_result_table(table)? {
                match reviewed.get(&owned_key(&row)) {
                    Some(review) => rows.push(review.clone()),
                    None => rows.push(row),
                }
            }
        }
    }

    write_atomic(&aggregate, to_csv(&rows))?;
    info!(rows = rows.len(), output = %aggregate.display(), "Wrote aggregated results");
    Ok(rows)
}
