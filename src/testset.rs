//! Subsets of reference molecule identifiers bucketed by atom count

use indexmap::IndexMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TestSetError {
    #[error("Test set key '{0}' is not an integer size")]
    InvalidKey(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Identifiers by molecule size, in file order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TestSet {
    pub buckets: IndexMap<usize, Vec<u64>>,
}

impl TestSet {
    /// Parses a JSON object mapping string-encoded sizes onto identifier lists
    pub fn from_json_str(json: &str) -> Result<TestSet, TestSetError> {
        let raw: IndexMap<String, Vec<u64>> = serde_json::from_str(json)?;
        TestSet::from_raw(raw)
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<TestSet, TestSetError> {
        let raw: IndexMap<String, Vec<u64>> = serde_json::from_reader(reader)?;
        TestSet::from_raw(raw)
    }

    pub fn from_path<P: AsRef<std::path::Path>>(path: P) -> Result<TestSet, TestSetError> {
        let file = std::fs::File::open(path)?;
        TestSet::from_reader(std::io::BufReader::new(file))
    }

    fn from_raw(raw: IndexMap<String, Vec<u64>>) -> Result<TestSet, TestSetError> {
        let buckets = raw.into_iter()
            .map(|(key, ids)| -> Result<(usize, Vec<u64>), TestSetError> {
                let size = key.trim().parse::<usize>()
                    .map_err(|_| TestSetError::InvalidKey(key.clone()))?;
                Ok((size, ids))
            })
            .collect::<Result<IndexMap<usize, Vec<u64>>, TestSetError>>()?;

        Ok(TestSet {buckets})
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All `(size, id)` pairs in file order
    pub fn iter(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.buckets.iter().flat_map(|(&size, ids)| ids.iter().map(move |&id| (size, id)))
    }
}
