//! Read-only per-cell record table.
//!
//! Rows are keyed by `(image_id, cell_id)`. Numeric feature matrices are
//! grouped into named assay slots (for example raw `counts` and transformed
//! `exprs`), and metadata columns carry categorical or numeric annotations
//! such as cell type. The table is only ever consumed by the renderers; it is
//! (de)serialized as JSON for the command line tool.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{CellrasterError, Result};

/// One metadata column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum Column {
    Numeric(Vec<f64>),
    Categorical(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(values) => values.len(),
            Column::Categorical(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Column::Numeric(_))
    }

    /// Category label of a row; numeric values are formatted.
    pub fn label(&self, row: usize) -> String {
        match self {
            Column::Numeric(values) => format_number(values[row]),
            Column::Categorical(values) => values[row].clone(),
        }
    }
}

pub(crate) fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawCellTable {
    image_ids: Vec<String>,
    cell_ids: Vec<u32>,
    #[serde(default)]
    assays: BTreeMap<String, BTreeMap<String, Vec<f64>>>,
    #[serde(default)]
    metadata: BTreeMap<String, Column>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawCellTable", into = "RawCellTable")]
pub struct CellTable {
    image_ids: Vec<String>,
    cell_ids: Vec<u32>,
    assays: BTreeMap<String, BTreeMap<String, Vec<f64>>>,
    metadata: BTreeMap<String, Column>,
    index: HashMap<(String, u32), usize>,
}

impl CellTable {
    /// Create a table with one row per `(image_ids[i], cell_ids[i])`.
    pub fn new(image_ids: Vec<String>, cell_ids: Vec<u32>) -> Result<Self> {
        if image_ids.len() != cell_ids.len() {
            return Err(CellrasterError::Schema(format!(
                "{} image ids but {} cell ids",
                image_ids.len(),
                cell_ids.len()
            )));
        }
        let mut index = HashMap::with_capacity(cell_ids.len());
        for (row, (image_id, &cell_id)) in image_ids.iter().zip(&cell_ids).enumerate() {
            if index.insert((image_id.clone(), cell_id), row).is_some() {
                return Err(CellrasterError::Schema(format!(
                    "duplicate cell record ({image_id}, {cell_id})"
                )));
            }
        }
        Ok(Self {
            image_ids,
            cell_ids,
            assays: BTreeMap::new(),
            metadata: BTreeMap::new(),
            index,
        })
    }

    /// Add a feature to an assay slot.
    pub fn with_feature(
        mut self,
        slot: impl Into<String>,
        feature: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<Self> {
        let feature = feature.into();
        self.check_len(&feature, values.len())?;
        self.assays
            .entry(slot.into())
            .or_default()
            .insert(feature, values);
        Ok(self)
    }

    pub fn with_metadata(mut self, column: impl Into<String>, values: Column) -> Result<Self> {
        let column = column.into();
        self.check_len(&column, values.len())?;
        self.metadata.insert(column, values);
        Ok(self)
    }

    fn check_len(&self, name: &str, len: usize) -> Result<()> {
        if len != self.n_rows() {
            return Err(CellrasterError::Schema(format!(
                "column '{name}' has {len} values for {} cells",
                self.n_rows()
            )));
        }
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.cell_ids.len()
    }

    pub fn image_id(&self, row: usize) -> &str {
        &self.image_ids[row]
    }

    pub fn cell_id(&self, row: usize) -> u32 {
        self.cell_ids[row]
    }

    /// Row of a cell, if the table has one.
    pub fn row(&self, image_id: &str, cell_id: u32) -> Option<usize> {
        self.index.get(&(image_id.to_string(), cell_id)).copied()
    }

    pub fn has_feature(&self, slot: &str, feature: &str) -> bool {
        self.assays
            .get(slot)
            .is_some_and(|features| features.contains_key(feature))
    }

    pub fn has_metadata(&self, column: &str) -> bool {
        self.metadata.contains_key(column)
    }

    pub fn feature(&self, slot: &str, feature: &str) -> Result<&[f64]> {
        let features = self
            .assays
            .get(slot)
            .ok_or_else(|| CellrasterError::NotFound(format!("assay slot '{slot}'")))?;
        features
            .get(feature)
            .map(Vec::as_slice)
            .ok_or_else(|| CellrasterError::NotFound(format!("feature '{feature}' in '{slot}'")))
    }

    pub fn metadata(&self, column: &str) -> Result<&Column> {
        self.metadata
            .get(column)
            .ok_or_else(|| CellrasterError::NotFound(format!("metadata column '{column}'")))
    }

    /// Distinct labels of a metadata column over the given rows.
    pub fn labels(&self, column: &str, rows: &[usize]) -> Result<BTreeSet<String>> {
        let column = self.metadata(column)?;
        Ok(rows.iter().map(|&row| column.label(row)).collect())
    }
}

impl TryFrom<RawCellTable> for CellTable {
    type Error = CellrasterError;

    fn try_from(raw: RawCellTable) -> Result<Self> {
        let mut table = CellTable::new(raw.image_ids, raw.cell_ids)?;
        for (slot, features) in raw.assays {
            for (feature, values) in features {
                table = table.with_feature(slot.clone(), feature, values)?;
            }
        }
        for (column, values) in raw.metadata {
            table = table.with_metadata(column, values)?;
        }
        Ok(table)
    }
}

impl From<CellTable> for RawCellTable {
    fn from(table: CellTable) -> Self {
        RawCellTable {
            image_ids: table.image_ids,
            cell_ids: table.cell_ids,
            assays: table.assays,
            metadata: table.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CellTable {
        CellTable::new(
            vec!["A".into(), "A".into(), "B".into()],
            vec![1, 2, 1],
        )
        .unwrap()
        .with_feature("counts", "CD3", vec![1.0, 5.0, 3.0])
        .unwrap()
        .with_metadata(
            "celltype",
            Column::Categorical(vec!["T".into(), "B".into(), "T".into()]),
        )
        .unwrap()
    }

    #[test]
    fn test_row_lookup() {
        let table = sample();
        assert_eq!(table.row("A", 2), Some(1));
        assert_eq!(table.row("B", 1), Some(2));
        assert_eq!(table.row("B", 2), None);
        assert_eq!(table.image_id(1), "A");
    }

    #[test]
    fn test_duplicate_rows_rejected() {
        let err = CellTable::new(vec!["A".into(), "A".into()], vec![3, 3]).unwrap_err();
        assert!(matches!(err, CellrasterError::Schema(_)));
    }

    #[test]
    fn test_column_length_checked() {
        let err = sample()
            .with_feature("counts", "CD8", vec![1.0])
            .unwrap_err();
        assert!(err.to_string().contains("CD8"));
    }

    #[test]
    fn test_missing_lookups() {
        let table = sample();
        assert!(matches!(
            table.feature("exprs", "CD3"),
            Err(CellrasterError::NotFound(_))
        ));
        assert!(matches!(
            table.metadata("area"),
            Err(CellrasterError::NotFound(_))
        ));
        assert!(table.has_feature("counts", "CD3"));
        assert!(!table.has_feature("counts", "CD8"));
    }

    #[test]
    fn test_json_roundtrip_rebuilds_index() {
        let json = serde_json::to_string(&sample()).unwrap();
        let table: CellTable = serde_json::from_str(&json).unwrap();
        assert_eq!(table.row("A", 2), Some(1));
        assert_eq!(table.feature("counts", "CD3").unwrap(), &[1.0, 5.0, 3.0]);
    }

    #[test]
    fn test_json_with_bad_lengths_fails() {
        let json = r#"{
            "image_ids": ["A", "A"],
            "cell_ids": [1, 2],
            "metadata": {"celltype": {"type": "categorical", "values": ["T"]}}
        }"#;
        assert!(serde_json::from_str::<CellTable>(json).is_err());
    }

    #[test]
    fn test_numeric_labels() {
        let column = Column::Numeric(vec![3.0, 2.5]);
        assert_eq!(column.label(0), "3");
        assert_eq!(column.label(1), "2.5");
    }
}
