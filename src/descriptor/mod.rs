//! Rotation- and permutation-invariant descriptors of atom collections
//!
//! A descriptor is computed by a fixed sequence of stages: positions are
//! scaled into the unit ball, species are mapped onto feature weights and
//! the weighted points are expanded into moment invariants.

use thiserror::Error;
use serde::{Deserialize, Serialize};
extern crate nalgebra as na;

use crate::atoms::AtomCollection;
use crate::config::{ConfigurationError, DescriptorSettings, SpeciesMap};

pub mod stages;
pub mod zernike;

use stages::{FeatureMapper, ScalePositions, WeightedPoints};
use zernike::ZernikeInvariants;

#[derive(Error, Debug, PartialEq)]
pub enum DescriptorError {
    #[error("Atom collection is empty")]
    EmptyCollection,
    #[error("Species {number} of atom {index} is not in the species map")]
    UnknownSpecies {index: usize, number: f64},
}

/// Stateless stage of a descriptor computation
pub trait Transform<In> {
    type Output;

    fn apply(&self, input: In) -> Result<Self::Output, DescriptorError>;
}

/// Two stages applied in sequence
#[derive(Clone, Debug, PartialEq)]
pub struct Chain<A, B> {
    pub first: A,
    pub second: B,
}

impl<A, B> Chain<A, B> {
    pub fn new(first: A, second: B) -> Chain<A, B> {
        Chain {first, second}
    }

    /// Append another stage
    pub fn then<C>(self, third: C) -> Chain<Chain<A, B>, C> {
        Chain::new(self, third)
    }
}

impl<In, A, B> Transform<In> for Chain<A, B>
    where A: Transform<In>,
        B: Transform<A::Output>
{
    type Output = B::Output;

    fn apply(&self, input: In) -> Result<Self::Output, DescriptorError> {
        self.second.apply(self.first.apply(input)?)
    }
}

/// Moment values and their `(n, l)` expansion indices
#[derive(Clone, Debug, PartialEq)]
pub struct Invariants {
    pub values: na::DVector<f64>,
    pub indices: Vec<(usize, usize)>,
}

impl Invariants {
    /// Highest expansion order present
    pub fn max_order(&self) -> usize {
        self.indices.iter().map(|&(n, _)| n).max().unwrap_or(0)
    }
}

/// Fixed-length invariant vector with the settings it was computed with
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub values: na::DVector<f64>,
    pub indices: Vec<(usize, usize)>,
    pub max_order: usize,
    pub cutoff: f64,
    pub apply_cutoff: bool,
    pub species: SpeciesMap,
}

impl Descriptor {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Invariant of expansion order `n` and angular index `l`
    pub fn get(&self, n: usize, l: usize) -> Option<f64> {
        self.indices.iter()
            .position(|&index| index == (n, l))
            .map(|k| self.values[k])
    }

    /// Euclidean distance between descriptors of equal layout
    pub fn distance(&self, other: &Descriptor) -> Option<f64> {
        (self.indices == other.indices).then(|| (&self.values - &other.values).norm())
    }
}

type Stages<M> = Chain<Chain<ScalePositions, FeatureMapper>, M>;

/// Scale, feature-map and moment stages composed in that order
///
/// Pipelines hold no per-call state, so one pipeline can be applied to many
/// collections, also from several threads.
#[derive(Clone, Debug)]
pub struct Pipeline<M = ZernikeInvariants> {
    stages: Stages<M>,
    settings: DescriptorSettings,
}

/// Pipeline with default species map and smooth cutoff envelope
pub fn build(cutoff: f64, max_order: usize) -> Result<Pipeline, ConfigurationError> {
    Pipeline::from_settings(&DescriptorSettings {cutoff, max_order, ..Default::default()})
}

impl Pipeline {
    pub fn from_settings(settings: &DescriptorSettings) -> Result<Pipeline, ConfigurationError> {
        Pipeline::with_moments(settings, ZernikeInvariants::new(settings.max_order))
    }

    pub fn len(&self) -> usize {
        self.stages.second.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<M> Pipeline<M> where M: Transform<WeightedPoints, Output = Invariants> {
    /// Pipeline with an alternative moment stage
    pub fn with_moments(settings: &DescriptorSettings, moments: M) -> Result<Pipeline<M>, ConfigurationError> {
        settings.validate()?;

        let stages = Chain::new(
            ScalePositions::from_cutoff(settings.cutoff),
            FeatureMapper {species: settings.species.clone(), apply_cutoff: settings.apply_cutoff}
        ).then(moments);

        Ok(Pipeline {stages, settings: settings.clone()})
    }

    pub fn settings(&self) -> &DescriptorSettings {
        &self.settings
    }

    /// Descriptor of a collection. Its order is that of the moment stage,
    /// which need not match the settings for pipelines built `with_moments`.
    pub fn apply(&self, atoms: &AtomCollection) -> Result<Descriptor, DescriptorError> {
        let invariants = self.stages.apply(atoms)?;

        Ok(Descriptor {
            max_order: invariants.max_order(),
            values: invariants.values,
            indices: invariants.indices,
            cutoff: self.settings.cutoff,
            apply_cutoff: self.settings.apply_cutoff,
            species: self.settings.species.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::descriptor::*;
    use crate::atoms::{Matrix3N, random_atoms_in_sphere};
    use rand::SeedableRng;
    use rand::seq::SliceRandom;

    fn methane() -> AtomCollection {
        let a = 0.629;
        let positions = Matrix3N::from_column_slice(&[
            0.0, 0.0, 0.0,
            a, a, a,
            -a, -a, a,
            -a, a, -a,
            a, -a, -a,
        ]);
        AtomCollection::new(positions, vec![6.0, 1.0, 1.0, 1.0, 1.0]).unwrap()
    }

    fn random_molecule(seed: u64) -> AtomCollection {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let mut atoms = random_atoms_in_sphere(&mut rng, 9, 3.0, true, 1.0);
        let numbers = (0..atoms.len())
            .map(|_| *crate::config::SPECIES.choose(&mut rng).unwrap() as f64)
            .collect();
        atoms.set_numbers(numbers).unwrap();
        atoms
    }

    #[test]
    fn invariant_count() {
        let pipeline = build(5.0, 7).unwrap();
        assert_eq!(pipeline.len(), 20);
        let descriptor = pipeline.apply(&methane()).unwrap();
        assert_eq!(descriptor.len(), 20);
        assert_eq!(descriptor.max_order, 7);
        assert_eq!(descriptor.cutoff, 5.0);
        assert!(descriptor.apply_cutoff);
        assert!(descriptor.get(0, 0).unwrap() > 0.0);
        assert_eq!(descriptor.get(1, 0), None);
    }

    #[test]
    fn rotation_invariance() {
        let pipeline = build(5.0, 7).unwrap();
        for seed in 0..3 {
            let atoms = random_molecule(seed);
            let reference = pipeline.apply(&atoms).unwrap();

            let rotation = na::Rotation3::from_scaled_axis(na::Vector3::new(0.4, -1.1, 2.3 + seed as f64));
            let rotated = pipeline.apply(&atoms.rotated(&rotation)).unwrap();
            approx::assert_relative_eq!(reference.values, rotated.values, epsilon = 1e-10, max_relative = 1e-8);
        }
    }

    #[test]
    fn permutation_invariance() {
        let pipeline = build(5.0, 7).unwrap();
        let atoms = methane();
        let reference = pipeline.apply(&atoms).unwrap();
        let swapped = atoms.permuted(&[0, 3, 1, 4, 2]).unwrap();
        approx::assert_relative_eq!(
            reference.values,
            pipeline.apply(&swapped).unwrap().values,
            epsilon = 1e-12,
            max_relative = 1e-10
        );
    }

    #[test]
    fn descriptors_distinguish_species() {
        let pipeline = build(5.0, 7).unwrap();
        let atoms = methane();
        let mut relabelled = atoms.clone();
        relabelled.set_numbers(vec![7.0, 1.0, 1.0, 1.0, 1.0]).unwrap();

        let distance = pipeline.apply(&atoms).unwrap()
            .distance(&pipeline.apply(&relabelled).unwrap())
            .unwrap();
        assert!(distance > 1e-6);
    }

    #[test]
    fn stage_errors() {
        let pipeline = build(5.0, 7).unwrap();
        assert_eq!(pipeline.apply(&AtomCollection::empty()), Err(DescriptorError::EmptyCollection));

        let mut atoms = methane();
        atoms.set_numbers(vec![10.0, 1.0, 1.0, 1.0, 1.0]).unwrap();
        assert_eq!(
            pipeline.apply(&atoms),
            Err(DescriptorError::UnknownSpecies {index: 0, number: 10.0})
        );
    }

    #[test]
    fn configuration_errors() {
        assert_eq!(build(5.0, 0).unwrap_err(), ConfigurationError::NonPositiveMaxOrder);
        assert_eq!(build(0.0, 7).unwrap_err(), ConfigurationError::InvalidCutoff(0.0));

        let settings = DescriptorSettings {
            species: SpeciesMap {numbers: vec![], range: (1.0, 2.0)},
            ..Default::default()
        };
        assert_eq!(Pipeline::from_settings(&settings).unwrap_err(), ConfigurationError::EmptySpeciesMap);
    }

    #[test]
    fn envelope_reduces_outer_atoms() {
        let plain = Pipeline::from_settings(&DescriptorSettings {apply_cutoff: false, ..Default::default()}).unwrap();
        let enveloped = build(5.0, 7).unwrap();
        let atoms = methane();

        let a = plain.apply(&atoms).unwrap();
        let b = enveloped.apply(&atoms).unwrap();
        assert!(b.get(0, 0).unwrap() < a.get(0, 0).unwrap());
    }

    #[test]
    fn explicit_chain() {
        let chain = Chain::new(ScalePositions::from_cutoff(5.0), FeatureMapper {species: SpeciesMap::default(), apply_cutoff: true})
            .then(ZernikeInvariants::new(7));
        let invariants = chain.apply(&methane()).unwrap();
        let descriptor = build(5.0, 7).unwrap().apply(&methane()).unwrap();
        assert_eq!(invariants.values, descriptor.values);
    }

    #[test]
    fn order_follows_moment_stage() {
        let pipeline = Pipeline::with_moments(&DescriptorSettings::default(), ZernikeInvariants::new(4)).unwrap();
        let descriptor = pipeline.apply(&methane()).unwrap();
        assert_eq!(pipeline.settings().max_order, 7);
        assert_eq!(descriptor.max_order, 4);
        assert_eq!(descriptor.len(), 9);
        assert_eq!(descriptor.get(5, 1), None);
    }
}
