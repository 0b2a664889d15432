//! Independent work items spread over the rayon thread pool
//!
//! Results are collected in input order before anything is aggregated.

use std::collections::HashMap;
use indexmap::IndexMap;
use rand::SeedableRng;
use rayon::prelude::*;
use thiserror::Error;

use crate::atoms::AtomCollection;
use crate::config::SeparationSettings;
use crate::descriptor::{Descriptor, DescriptorError, Pipeline};
use crate::optimise::separation::{Separation, SeparationError, create_initial_atoms};
use crate::symmetry::{PointGroupAnalyzer, PointGroupLabel, SymmetryClassifier, SymmetryError};
use crate::testset::TestSet;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("No molecule for identifier {0}")]
    NotFound(u64),
    #[error(transparent)]
    Symmetry(#[from] SymmetryError),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error(transparent)]
    Separation(#[from] SeparationError),
}

/// Point group of every test set member, by size and then identifier
pub fn point_groups<A>(
    test_set: &TestSet,
    molecules: &HashMap<u64, AtomCollection>,
    classifier: &SymmetryClassifier<A>
) -> Result<IndexMap<usize, IndexMap<u64, PointGroupLabel>>, BatchError>
    where A: PointGroupAnalyzer + Sync
{
    let members: Vec<(usize, u64)> = test_set.iter().collect();
    let labels = members.par_iter()
        .map(|&(size, id)| -> Result<(usize, u64, PointGroupLabel), BatchError> {
            let atoms = molecules.get(&id).ok_or(BatchError::NotFound(id))?;
            Ok((size, id, classifier.classify(atoms)?))
        })
        .collect::<Result<Vec<_>, BatchError>>()?;

    let mut nested: IndexMap<usize, IndexMap<u64, PointGroupLabel>> = IndexMap::new();
    for (size, id, label) in labels {
        nested.entry(size).or_default().insert(id, label);
    }

    log::info!("Classified {} molecules in {} size buckets", members.len(), nested.len());
    Ok(nested)
}

pub fn descriptors(pipeline: &Pipeline, collections: &[AtomCollection]) -> Result<Vec<Descriptor>, BatchError> {
    let descriptors = collections.par_iter()
        .map(|atoms| pipeline.apply(atoms))
        .collect::<Result<Vec<Descriptor>, DescriptorError>>()?;

    log::info!("Computed {} descriptors of length {}", descriptors.len(), pipeline.len());
    Ok(descriptors)
}

/// Separated random starting geometries
///
/// Item `i` draws from its own generator seeded with `seed + i`, so the
/// output does not depend on scheduling.
pub fn initial_geometries(
    count: usize,
    num_atoms: usize,
    max_radius: f64,
    settings: &SeparationSettings,
    species: Option<&[u32]>,
    seed: u64
) -> Result<Vec<Separation>, BatchError> {
    let separations = (0..count).into_par_iter()
        .map(|index| {
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed.wrapping_add(index as u64));
            create_initial_atoms(&mut rng, num_atoms, max_radius, settings, species)
        })
        .collect::<Result<Vec<Separation>, SeparationError>>()?;

    let unconverged = separations.iter().filter(|s| !s.converged()).count();
    log::info!("Generated {} geometries of {} atoms, {} not converged", count, num_atoms, unconverged);
    Ok(separations)
}
