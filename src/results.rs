//! Selection of the best reconstruction per reference molecule

use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResultsError {
    #[error("No record for identifier {0}")]
    NotFound(u64),
    #[error("Column '{0}' is missing from the header")]
    MissingColumn(String),
    #[error("Cannot parse '{value}' in column '{column}' of row {row}")]
    InvalidCell {row: usize, column: String, value: String},
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// Outcome of one reconstruction attempt of a reference molecule
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionRecord<T> {
    pub id: u64,
    pub residual: f64,
    pub result: T,
}

impl<T> ReconstructionRecord<T> {
    pub fn new(id: u64, residual: f64, result: T) -> ReconstructionRecord<T> {
        ReconstructionRecord {id, residual, result}
    }

    /// Residual ordering in which NaN compares above every number
    fn key(&self) -> OrderedFloat<f64> {
        OrderedFloat(self.residual)
    }
}

/// Lowest-residual record per identifier, in order of first appearance
///
/// Of several records with the same lowest residual, the earliest is kept.
pub fn lowest_residual<T>(records: &[ReconstructionRecord<T>]) -> IndexMap<u64, &ReconstructionRecord<T>> {
    let mut best: IndexMap<u64, &ReconstructionRecord<T>> = IndexMap::new();
    for record in records {
        best.entry(record.id)
            .and_modify(|current| if record.key() < current.key() {
                *current = record;
            })
            .or_insert(record);
    }
    best
}

pub fn best_for_identifier<T>(records: &[ReconstructionRecord<T>], id: u64) -> Result<&ReconstructionRecord<T>, ResultsError> {
    records.iter()
        .filter(|record| record.id == id)
        .min_by_key(|record| record.key())
        .ok_or(ResultsError::NotFound(id))
}

/// All records sharing the lowest residual of an identifier
pub fn tied_for_best<T>(records: &[ReconstructionRecord<T>], id: u64) -> Result<Vec<&ReconstructionRecord<T>>, ResultsError> {
    let lowest = best_for_identifier(records, id)?.key();
    Ok(records.iter()
        .filter(|record| record.id == id && record.key() == lowest)
        .collect())
}

/// Best record for each requested identifier, in request order
pub fn lowest_residual_for<'a, T, I>(records: &'a [ReconstructionRecord<T>], ids: I) -> Result<Vec<&'a ReconstructionRecord<T>>, ResultsError>
    where I: IntoIterator<Item = u64>
{
    let best = lowest_residual(records);
    ids.into_iter()
        .map(|id| best.get(&id).copied().ok_or(ResultsError::NotFound(id)))
        .collect()
}

/// Header names of the identifier, residual and result columns
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub id: String,
    pub residual: String,
    pub result: String,
}

impl Default for ColumnNames {
    fn default() -> ColumnNames {
        ColumnNames {
            id: "QM9 ID".to_string(),
            residual: "RMSD".to_string(),
            result: "Result".to_string(),
        }
    }
}

/// Reads records from CSV with a header row. Other columns are ignored.
pub fn read_records<R: std::io::Read>(reader: R, columns: &ColumnNames) -> Result<Vec<ReconstructionRecord<String>>, ResultsError> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers = reader.headers()?.clone();
    let position = |name: &str| {
        headers.iter()
            .position(|header| header.trim() == name)
            .ok_or_else(|| ResultsError::MissingColumn(name.to_string()))
    };
    let id_column = position(&columns.id)?;
    let residual_column = position(&columns.residual)?;
    let result_column = position(&columns.result)?;

    reader.records()
        .enumerate()
        .map(|(row, record)| -> Result<ReconstructionRecord<String>, ResultsError> {
            let record = record?;
            let cell = |index: usize| record.get(index).unwrap_or("").trim().to_string();
            let invalid = |column: &str, value: String| ResultsError::InvalidCell {row, column: column.to_string(), value};

            let id_cell = cell(id_column);
            let id = id_cell.parse::<u64>().map_err(|_| invalid(&columns.id, id_cell.clone()))?;
            let residual_cell = cell(residual_column);
            let residual = residual_cell.parse::<f64>().map_err(|_| invalid(&columns.residual, residual_cell.clone()))?;

            Ok(ReconstructionRecord {id, residual, result: cell(result_column)})
        })
        .collect()
}
