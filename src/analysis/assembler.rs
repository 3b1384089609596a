// Assembler module - merge per-source tables and ingest CSV feature tables
//
// Every source (an audio file or a CSV file) becomes one FeatureTable. The
// assembler concatenates them row-wise in input order and stamps each row
// with the id of the source it came from.

use std::collections::BTreeSet;
use std::path::Path;

use ndarray::Array2;

use crate::analysis::table::{FeatureTable, FILE_NAME_COLUMN, LABEL_COLUMN, SECOND_COLUMN};
use crate::error::PipelineError;

/// Concatenate per-source tables, stamping `file_name` with the source id
///
/// Sources must share the same feature columns. Sources without `second`
/// get their ordinal row index instead. A `label` column survives only when
/// every source has one.
pub fn assemble(sources: Vec<(String, FeatureTable)>) -> Result<FeatureTable, PipelineError> {
    if sources.is_empty() {
        return Err(PipelineError::EmptyInput {
            operation: "assemble",
        });
    }

    let labeled = sources.iter().filter(|(_, t)| t.has_labels()).count();
    if labeled > 0 && labeled < sources.len() {
        tracing::warn!(
            "[Assembler] Only {} of {} sources carry labels; dropping label column",
            labeled,
            sources.len()
        );
    }

    let stamped = sources
        .into_iter()
        .map(|(source_id, table)| {
            let rows = table.n_rows();
            let table = match table.seconds() {
                Some(_) => table,
                None => table.with_seconds((0..rows).map(|i| i as f64).collect())?,
            };
            table.with_file_names(vec![source_id; rows])
        })
        .collect::<Result<Vec<_>, _>>()?;

    let merged = FeatureTable::concat(&stamped)?;
    tracing::info!(
        sources = stamped.len(),
        rows = merged.n_rows(),
        "[Assembler] Assembled feature table"
    );
    Ok(merged)
}

enum CsvColumn {
    Numeric(Vec<f64>),
    Categorical(Vec<String>),
}

/// Integer-code categorical values by their lexicographic rank; empty → -1
fn encode_categories(values: &[String]) -> Vec<i64> {
    let categories: Vec<&str> = values
        .iter()
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    values
        .iter()
        .map(|v| {
            if v.is_empty() {
                -1
            } else {
                categories
                    .binary_search(&v.as_str())
                    .map(|i| i as i64)
                    .unwrap_or(-1)
            }
        })
        .collect()
}

/// Read a CSV file with a header row into a FeatureTable
///
/// Columns whose non-empty cells all parse as numbers become feature columns
/// (empty cells become NaN). The first categorical column is integer-coded
/// into `label` when no `label` column exists; other categorical columns are
/// dropped. `file_name` is ignored and `second` is synthesized when absent.
pub fn read_csv_table<P: AsRef<Path>>(path: P) -> Result<FeatureTable, PipelineError> {
    let path = path.as_ref();
    let ingest_error = |reason: String| PipelineError::CsvIngest {
        path: path.display().to_string(),
        reason,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|err| ingest_error(err.to_string()))?;
    let headers: Vec<String> = reader
        .headers()
        .map_err(|err| ingest_error(err.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();
    if headers.is_empty() {
        return Err(ingest_error("missing header row".to_string()));
    }

    let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record.map_err(|err| ingest_error(err.to_string()))?;
        for (column, value) in cells.iter_mut().zip(record.iter()) {
            column.push(value.to_string());
        }
    }
    let n_rows = cells.first().map(Vec::len).unwrap_or(0);

    let columns: Vec<CsvColumn> = cells
        .into_iter()
        .map(|values| {
            let parsed: Option<Vec<f64>> = values
                .iter()
                .map(|v| {
                    if v.is_empty() {
                        Some(f64::NAN)
                    } else {
                        v.parse::<f64>().ok()
                    }
                })
                .collect();
            match parsed {
                Some(numbers) => CsvColumn::Numeric(numbers),
                None => CsvColumn::Categorical(values),
            }
        })
        .collect();

    let mut feature_names = Vec::new();
    let mut feature_columns: Vec<Vec<f64>> = Vec::new();
    let mut seconds = None;
    let mut labels: Option<Vec<i64>> = None;
    let mut categorical = Vec::new();

    for (name, column) in headers.iter().zip(columns) {
        match (name.as_str(), column) {
            (FILE_NAME_COLUMN, _) => {}
            (SECOND_COLUMN, CsvColumn::Numeric(values)) => seconds = Some(values),
            (SECOND_COLUMN, CsvColumn::Categorical(_)) => {
                return Err(ingest_error("'second' column is not numeric".to_string()))
            }
            (LABEL_COLUMN, CsvColumn::Numeric(values)) => {
                if values.iter().any(|v| v.is_finite() && v.fract() != 0.0) {
                    return Err(ingest_error("'label' column holds non-integer values".to_string()));
                }
                labels = Some(
                    values
                        .iter()
                        .map(|&v| if v.is_finite() { v as i64 } else { -1 })
                        .collect(),
                );
            }
            (LABEL_COLUMN, CsvColumn::Categorical(values)) => {
                labels = Some(encode_categories(&values))
            }
            (_, CsvColumn::Numeric(values)) => {
                feature_names.push(name.clone());
                feature_columns.push(values);
            }
            (_, CsvColumn::Categorical(values)) => categorical.push((name.clone(), values)),
        }
    }

    let mut categorical = categorical.into_iter();
    if labels.is_none() {
        if let Some((name, values)) = categorical.next() {
            tracing::info!("[Assembler] Encoding categorical column '{}' as label", name);
            labels = Some(encode_categories(&values));
        }
    }
    for (name, _) in categorical {
        tracing::warn!("[Assembler] Dropping non-numeric column '{}'", name);
    }

    let width = feature_columns.len();
    let mut matrix = Array2::<f64>::zeros((n_rows, width));
    for (col, values) in feature_columns.iter().enumerate() {
        for (row, &value) in values.iter().enumerate() {
            matrix[[row, col]] = value;
        }
    }

    let table = FeatureTable::new(feature_names, matrix)?
        .with_seconds(seconds.unwrap_or_else(|| (0..n_rows).map(|i| i as f64).collect()))?;
    let table = match labels {
        Some(labels) => table.with_labels(labels)?,
        None => table,
    };

    tracing::info!(
        path = %path.display(),
        rows = table.n_rows(),
        features = table.feature_names().len(),
        labeled = table.has_labels(),
        "[Assembler] Ingested CSV table"
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::io::Write;

    fn write_csv(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn table(rows: usize) -> FeatureTable {
        FeatureTable::new(vec!["a".into(), "b".into()], Array2::zeros((rows, 2))).unwrap()
    }

    #[test]
    fn test_assemble_stamps_sources_and_synthesizes_seconds() {
        let merged = assemble(vec![
            ("one.wav".to_string(), table(2)),
            ("two.wav".to_string(), table(1)),
        ])
        .unwrap();
        assert_eq!(merged.n_rows(), 3);
        assert_eq!(merged.seconds(), Some(&[0.0, 1.0, 0.0][..]));
        assert_eq!(
            merged.file_names().unwrap(),
            &["one.wav".to_string(), "one.wav".to_string(), "two.wav".to_string()]
        );
    }

    #[test]
    fn test_assemble_drops_partial_labels() {
        let labeled = table(2).with_labels(vec![0, 1]).unwrap();
        let merged = assemble(vec![
            ("a.csv".to_string(), labeled),
            ("b.csv".to_string(), table(2)),
        ])
        .unwrap();
        assert!(!merged.has_labels());
    }

    #[test]
    fn test_assemble_rejects_mismatched_columns() {
        let other = FeatureTable::new(vec!["c".into()], array![[1.0]]).unwrap();
        let err = assemble(vec![
            ("a".to_string(), table(1)),
            ("b".to_string(), other),
        ])
        .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidParameter { .. }));
    }

    #[test]
    fn test_assemble_empty() {
        assert!(matches!(
            assemble(Vec::new()),
            Err(PipelineError::EmptyInput { .. })
        ));
    }

    #[test]
    fn test_csv_encodes_first_categorical_as_label() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            &dir,
            "data.csv",
            "f1,kind,f2,file_name,mood\n1.0,snare,2.0,x.wav,calm\n3.0,kick,,x.wav,loud\n5.0,snare,6.0,x.wav,calm\n",
        );
        let table = read_csv_table(&path).unwrap();
        assert_eq!(table.feature_names(), &["f1", "f2"]);
        assert_eq!(table.labels(), Some(&[1, 0, 1][..]));
        assert_eq!(table.seconds(), Some(&[0.0, 1.0, 2.0][..]));
        assert!(table.features()[[1, 1]].is_nan());
        assert!(table.file_names().is_none());
    }

    #[test]
    fn test_csv_numeric_label_and_second() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            &dir,
            "data.csv",
            "second,f1,label\n0.5,1.0,2\n1.5,2.0,0\n",
        );
        let table = read_csv_table(&path).unwrap();
        assert_eq!(table.feature_names(), &["f1"]);
        assert_eq!(table.labels(), Some(&[2, 0][..]));
        assert_eq!(table.seconds(), Some(&[0.5, 1.5][..]));
    }

    #[test]
    fn test_csv_missing_file() {
        let err = read_csv_table("/nonexistent/data.csv").unwrap_err();
        assert!(matches!(err, PipelineError::CsvIngest { .. }));
    }
}
