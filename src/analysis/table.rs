// Table module - the feature table threaded through every pipeline stage
//
// A table holds a dense row-major feature matrix plus three optional
// metadata columns. Metadata is never part of the matrix, so stages that
// feed the matrix to a numeric routine cannot accidentally consume it.

use ndarray::{Array2, ArrayView2, Axis};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::error::PipelineError;

/// Segment start time in seconds
pub const SECOND_COLUMN: &str = "second";
/// Provenance of the row
pub const FILE_NAME_COLUMN: &str = "file_name";
/// Integer class id
pub const LABEL_COLUMN: &str = "label";
/// Columns that are carried through stages but never used as model input
pub const METADATA_COLUMNS: [&str; 3] = [SECOND_COLUMN, FILE_NAME_COLUMN, LABEL_COLUMN];

/// Whether `name` is one of the metadata columns
pub fn is_metadata_column(name: &str) -> bool {
    METADATA_COLUMNS.contains(&name)
}

/// One fixed-duration window of a signal reduced to a feature vector
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Window start in seconds
    pub start_time: f64,
    /// Ordered feature values
    pub features: Vec<f64>,
}

/// Feature matrix with row-aligned metadata columns
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    feature_names: Vec<String>,
    features: Array2<f64>,
    seconds: Option<Vec<f64>>,
    file_names: Option<Vec<String>>,
    labels: Option<Vec<i64>>,
}

impl FeatureTable {
    /// Create a table from feature columns only
    ///
    /// Fails when the name count does not match the matrix width, a name is
    /// repeated, or a name collides with a metadata column.
    pub fn new(feature_names: Vec<String>, features: Array2<f64>) -> Result<Self, PipelineError> {
        if feature_names.len() != features.ncols() {
            return Err(PipelineError::invalid(
                "feature columns",
                format!(
                    "{} names for {} columns",
                    feature_names.len(),
                    features.ncols()
                ),
            ));
        }
        for (i, name) in feature_names.iter().enumerate() {
            if is_metadata_column(name) {
                return Err(PipelineError::invalid(
                    "feature columns",
                    format!("'{name}' is a metadata column"),
                ));
            }
            if feature_names[..i].contains(name) {
                return Err(PipelineError::invalid(
                    "feature columns",
                    format!("duplicate column '{name}'"),
                ));
            }
        }
        Ok(Self {
            feature_names,
            features,
            seconds: None,
            file_names: None,
            labels: None,
        })
    }

    /// Build a table from extracted segments, naming columns `<prefix>_1..n`
    pub fn from_segments(segments: &[Segment], prefix: &str) -> Result<Self, PipelineError> {
        let width = segments.first().map(|s| s.features.len()).unwrap_or(0);
        if let Some(bad) = segments.iter().find(|s| s.features.len() != width) {
            return Err(PipelineError::invalid(
                "segments",
                format!(
                    "segment at {}s has {} features, expected {}",
                    bad.start_time,
                    bad.features.len(),
                    width
                ),
            ));
        }
        let flat: Vec<f64> = segments
            .iter()
            .flat_map(|s| s.features.iter().copied())
            .collect();
        let matrix = Array2::from_shape_vec((segments.len(), width), flat)
            .map_err(|err| PipelineError::computation("table", err))?;
        let names = (1..=width).map(|i| format!("{prefix}_{i}")).collect();
        Self::new(names, matrix)?.with_seconds(segments.iter().map(|s| s.start_time).collect())
    }

    fn check_len(&self, column: &'static str, len: usize) -> Result<(), PipelineError> {
        if len != self.n_rows() {
            return Err(PipelineError::invalid(
                column,
                format!("{} values for {} rows", len, self.n_rows()),
            ));
        }
        Ok(())
    }

    /// Attach the `second` column
    pub fn with_seconds(mut self, seconds: Vec<f64>) -> Result<Self, PipelineError> {
        self.check_len(SECOND_COLUMN, seconds.len())?;
        self.seconds = Some(seconds);
        Ok(self)
    }

    /// Attach the `file_name` column
    pub fn with_file_names(mut self, file_names: Vec<String>) -> Result<Self, PipelineError> {
        self.check_len(FILE_NAME_COLUMN, file_names.len())?;
        self.file_names = Some(file_names);
        Ok(self)
    }

    /// Attach or overwrite the `label` column
    pub fn with_labels(mut self, labels: Vec<i64>) -> Result<Self, PipelineError> {
        self.check_len(LABEL_COLUMN, labels.len())?;
        self.labels = Some(labels);
        Ok(self)
    }

    /// Remove the `label` column
    pub fn without_labels(mut self) -> Self {
        self.labels = None;
        self
    }

    /// Copy of this table whose feature columns are replaced wholesale
    ///
    /// Every metadata column is carried over unchanged and row-aligned.
    pub fn with_replaced_features(
        &self,
        feature_names: Vec<String>,
        features: Array2<f64>,
    ) -> Result<Self, PipelineError> {
        if features.nrows() != self.n_rows() {
            return Err(PipelineError::invalid(
                "feature columns",
                format!(
                    "replacement has {} rows, table has {}",
                    features.nrows(),
                    self.n_rows()
                ),
            ));
        }
        let mut table = Self::new(feature_names, features)?;
        table.seconds = self.seconds.clone();
        table.file_names = self.file_names.clone();
        table.labels = self.labels.clone();
        Ok(table)
    }

    pub fn n_rows(&self) -> usize {
        self.features.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Model input matrix (feature columns only)
    pub fn features(&self) -> ArrayView2<'_, f64> {
        self.features.view()
    }

    pub fn seconds(&self) -> Option<&[f64]> {
        self.seconds.as_deref()
    }

    pub fn file_names(&self) -> Option<&[String]> {
        self.file_names.as_deref()
    }

    pub fn labels(&self) -> Option<&[i64]> {
        self.labels.as_deref()
    }

    pub fn has_labels(&self) -> bool {
        self.labels.is_some()
    }

    /// Index of a feature column by name
    pub fn feature_index(&self, name: &str) -> Option<usize> {
        self.feature_names.iter().position(|n| n == name)
    }

    /// The `(x, y)` projection as an n×2 matrix, when both columns exist
    pub fn projection(&self) -> Option<Array2<f64>> {
        let x = self.feature_index("x")?;
        let y = self.feature_index("y")?;
        Some(self.features.select(Axis(1), &[x, y]))
    }

    /// All column names in serialization order
    pub fn column_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.feature_names.iter().map(String::as_str).collect();
        if self.seconds.is_some() {
            names.push(SECOND_COLUMN);
        }
        if self.file_names.is_some() {
            names.push(FILE_NAME_COLUMN);
        }
        if self.labels.is_some() {
            names.push(LABEL_COLUMN);
        }
        names
    }

    /// Concatenate tables row-wise, preserving order
    ///
    /// All tables must share the same feature columns in the same order. A
    /// metadata column is kept only when every input carries it.
    pub fn concat(tables: &[FeatureTable]) -> Result<Self, PipelineError> {
        let first = tables
            .first()
            .ok_or(PipelineError::EmptyInput { operation: "concatenate" })?;
        if let Some(other) = tables
            .iter()
            .find(|t| t.feature_names != first.feature_names)
        {
            return Err(PipelineError::invalid(
                "feature columns",
                format!(
                    "tables disagree on feature columns: [{}] vs [{}]",
                    first.feature_names.join(", "),
                    other.feature_names.join(", ")
                ),
            ));
        }

        let views: Vec<ArrayView2<'_, f64>> = tables.iter().map(|t| t.features.view()).collect();
        let features = ndarray::concatenate(Axis(0), &views)
            .map_err(|err| PipelineError::computation("table", err))?;

        let mut table = Self::new(first.feature_names.clone(), features)?;
        table.seconds = concat_column(tables, |t| t.seconds.as_ref());
        table.file_names = concat_column(tables, |t| t.file_names.as_ref());
        table.labels = concat_column(tables, |t| t.labels.as_ref());
        Ok(table)
    }
}

fn concat_column<T: Clone>(
    tables: &[FeatureTable],
    column: impl Fn(&FeatureTable) -> Option<&Vec<T>>,
) -> Option<Vec<T>> {
    let mut out = Vec::new();
    for table in tables {
        out.extend_from_slice(column(table)?);
    }
    Some(out)
}

/// Serializes as an array of flat records, one per row
impl Serialize for FeatureTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.n_rows()))?;
        for row in 0..self.n_rows() {
            seq.serialize_element(&RowRef { table: self, row })?;
        }
        seq.end()
    }
}

struct RowRef<'a> {
    table: &'a FeatureTable,
    row: usize,
}

impl Serialize for RowRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let table = self.table;
        let mut map = serializer.serialize_map(Some(table.column_names().len()))?;
        for (col, name) in table.feature_names.iter().enumerate() {
            map.serialize_entry(name, &table.features[[self.row, col]])?;
        }
        if let Some(seconds) = &table.seconds {
            map.serialize_entry(SECOND_COLUMN, &seconds[self.row])?;
        }
        if let Some(file_names) = &table.file_names {
            map.serialize_entry(FILE_NAME_COLUMN, &file_names[self.row])?;
        }
        if let Some(labels) = &table.labels {
            map.serialize_entry(LABEL_COLUMN, &labels[self.row])?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_row_table() -> FeatureTable {
        FeatureTable::new(
            vec!["feature_1".into(), "feature_2".into()],
            array![[1.0, 2.0], [3.0, 4.0]],
        )
        .unwrap()
        .with_seconds(vec![0.0, 1.0])
        .unwrap()
    }

    #[test]
    fn test_rejects_metadata_as_feature() {
        let err = FeatureTable::new(vec!["second".into()], array![[1.0]]).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidParameter { .. }));
    }

    #[test]
    fn test_rejects_misaligned_metadata() {
        assert!(two_row_table().with_labels(vec![1]).is_err());
    }

    #[test]
    fn test_rows_serialize_in_column_order() {
        let table = two_row_table()
            .with_file_names(vec!["a.wav".into(), "a.wav".into()])
            .unwrap();
        let json = serde_json::to_value(&table).unwrap();
        let rows = json.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["feature_2"], 4.0);
        assert_eq!(rows[1]["second"], 1.0);
        assert_eq!(rows[1]["file_name"], "a.wav");
        assert!(rows[0].get("label").is_none());

        let text = serde_json::to_string(&table).unwrap();
        let first = text.find("feature_1").unwrap();
        let second = text.find("\"second\"").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_replaced_features_keep_metadata() {
        let table = two_row_table().with_labels(vec![0, 1]).unwrap();
        let reduced = table
            .with_replaced_features(vec!["x".into(), "y".into()], array![[9.0, 8.0], [7.0, 6.0]])
            .unwrap();
        assert_eq!(reduced.seconds(), Some(&[0.0, 1.0][..]));
        assert_eq!(reduced.labels(), Some(&[0, 1][..]));
        assert_eq!(reduced.projection().unwrap(), array![[9.0, 8.0], [7.0, 6.0]]);
    }

    #[test]
    fn test_concat_requires_matching_columns() {
        let other = FeatureTable::new(vec!["x".into(), "y".into()], array![[0.0, 0.0]]).unwrap();
        assert!(FeatureTable::concat(&[two_row_table(), other]).is_err());
    }

    #[test]
    fn test_concat_drops_partial_metadata() {
        let labeled = two_row_table().with_labels(vec![0, 1]).unwrap();
        let merged = FeatureTable::concat(&[labeled, two_row_table()]).unwrap();
        assert_eq!(merged.n_rows(), 4);
        assert!(merged.labels().is_none());
        assert_eq!(merged.seconds(), Some(&[0.0, 1.0, 0.0, 1.0][..]));
    }

    #[test]
    fn test_from_segments_names_columns() {
        let segments = vec![
            Segment {
                start_time: 0.0,
                features: vec![1.0, 2.0, 3.0],
            },
            Segment {
                start_time: 1.0,
                features: vec![4.0, 5.0, 6.0],
            },
        ];
        let table = FeatureTable::from_segments(&segments, "feature").unwrap();
        assert_eq!(table.feature_names(), &["feature_1", "feature_2", "feature_3"]);
        assert_eq!(table.seconds(), Some(&[0.0, 1.0][..]));
    }
}
