//! Identifiers grouped by point group label

use indexmap::IndexMap;
use thiserror::Error;

use crate::symmetry::PointGroupLabel;
use crate::testset::TestSet;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GroupingError {
    #[error("No point group label for identifier {0}")]
    NotFound(u64),
}

/// Identifiers per label, labels and identifiers in order of discovery
pub fn by_group<I>(labelled: I) -> IndexMap<PointGroupLabel, Vec<u64>>
    where I: IntoIterator<Item = (u64, PointGroupLabel)>
{
    let mut groups: IndexMap<PointGroupLabel, Vec<u64>> = IndexMap::new();
    for (id, label) in labelled {
        groups.entry(label).or_default().push(id);
    }
    groups
}

/// Flattens labels stored per molecule size before grouping
pub fn by_group_nested(labels: &IndexMap<usize, IndexMap<u64, PointGroupLabel>>) -> IndexMap<PointGroupLabel, Vec<u64>> {
    by_group(labels.values().flat_map(|entries| {
        entries.iter().map(|(&id, label)| (id, label.clone()))
    }))
}

/// Groups the test set members in test set order
pub fn by_group_for_test_set(test_set: &TestSet, labels: &IndexMap<u64, PointGroupLabel>) -> Result<IndexMap<PointGroupLabel, Vec<u64>>, GroupingError> {
    let labelled = test_set.iter()
        .map(|(_, id)| {
            labels.get(&id)
                .map(|label| (id, label.clone()))
                .ok_or(GroupingError::NotFound(id))
        })
        .collect::<Result<Vec<(u64, PointGroupLabel)>, GroupingError>>()?;

    Ok(by_group(labelled))
}
