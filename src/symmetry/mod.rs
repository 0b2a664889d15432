//! Schoenflies point group classification of atom collections

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use thiserror::Error;
extern crate nalgebra as na;

use crate::atoms::{AtomCollection, Matrix3N, Vector3};
use crate::config::ClassifierSettings;

pub mod inertia;
pub mod analyzer;

pub use analyzer::SchoenfliesAnalyzer;

/// Schoenflies symbol, e.g. `C2v`, `D*h` or `Kh`
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PointGroupLabel(pub String);

impl PointGroupLabel {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PointGroupLabel {
    fn from(label: &str) -> PointGroupLabel {
        PointGroupLabel(label.to_string())
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SymmetryError {
    #[error("Atom collection is empty")]
    EmptyCollection,
}

/// Standard atomic weights of the first ten elements
const ATOMIC_WEIGHTS: [f64; 10] = [
    1.008, 4.0026, 6.94, 9.0122, 10.81, 12.011, 14.007, 15.999, 18.998, 20.180
];

/// Atomic mass of an element, falling back to the atomic number past neon
pub fn atomic_mass(number: u32) -> f64 {
    match number {
        1..=10 => ATOMIC_WEIGHTS[(number - 1) as usize],
        0 => 1.0,
        z => z as f64
    }
}

/// Atoms with integral species and masses, as seen by point group analysis
#[derive(Clone, Debug, PartialEq)]
pub struct Molecule {
    pub positions: Matrix3N,
    pub numbers: Vec<u32>,
    pub masses: Vec<f64>,
}

impl Molecule {
    /// Rounds species to integers. With `ignore_species` every atom becomes hydrogen.
    pub fn from_atoms(atoms: &AtomCollection, ignore_species: bool) -> Molecule {
        let numbers: Vec<u32> = if ignore_species {
            vec![1; atoms.len()]
        } else {
            atoms.numbers().iter()
                .map(|&number| number.round().max(0.0) as u32)
                .collect()
        };
        let masses = numbers.iter().map(|&z| atomic_mass(z)).collect();

        Molecule {positions: atoms.positions().clone(), numbers, masses}
    }

    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }

    pub fn centre_of_mass(&self) -> Vector3 {
        let total: f64 = self.masses.iter().sum();
        let weighted = self.positions.column_iter()
            .zip(self.masses.iter())
            .fold(Vector3::zeros(), |acc, (col, &mass)| acc + col * mass);
        weighted / total
    }

    pub fn centred(&self) -> Molecule {
        let com = self.centre_of_mass();
        let mut positions = self.positions.clone();
        for mut col in positions.column_iter_mut() {
            col -= com;
        }
        Molecule {positions, numbers: self.numbers.clone(), masses: self.masses.clone()}
    }
}

/// Assigns a point group to a molecule as positioned
pub trait PointGroupAnalyzer {
    fn analyze(&self, molecule: &Molecule) -> PointGroupLabel;
}

/// Point group classification of atom collections
///
/// Unless `recentre` is set in the settings, symmetry elements are sought
/// through the coordinate origin, so a collection displaced from the origin
/// generally has lower symmetry than its shape.
#[derive(Clone, Debug)]
pub struct SymmetryClassifier<A = SchoenfliesAnalyzer> {
    analyzer: A,
    recentre: bool,
    ignore_species: bool,
}

impl SymmetryClassifier {
    pub fn new(settings: &ClassifierSettings) -> SymmetryClassifier {
        SymmetryClassifier {
            analyzer: SchoenfliesAnalyzer::new(settings.tolerance, settings.eigen_tolerance),
            recentre: settings.recentre,
            ignore_species: settings.ignore_species,
        }
    }
}

impl Default for SymmetryClassifier {
    fn default() -> SymmetryClassifier {
        SymmetryClassifier::new(&ClassifierSettings::default())
    }
}

impl<A: PointGroupAnalyzer> SymmetryClassifier<A> {
    pub fn with_analyzer(analyzer: A, recentre: bool, ignore_species: bool) -> SymmetryClassifier<A> {
        SymmetryClassifier {analyzer, recentre, ignore_species}
    }

    pub fn classify(&self, atoms: &AtomCollection) -> Result<PointGroupLabel, SymmetryError> {
        if atoms.is_empty() {
            return Err(SymmetryError::EmptyCollection);
        }

        let molecule = Molecule::from_atoms(atoms, self.ignore_species);
        let molecule = match self.recentre {
            true => molecule.centred(),
            false => molecule
        };

        Ok(self.analyzer.analyze(&molecule))
    }
}

#[cfg(test)]
mod tests {
    use crate::symmetry::*;

    fn collection(coordinates: &[f64], numbers: &[f64]) -> AtomCollection {
        AtomCollection::new(Matrix3N::from_column_slice(coordinates), numbers.to_vec()).unwrap()
    }

    fn centred_classifier() -> SymmetryClassifier {
        SymmetryClassifier::new(&ClassifierSettings {recentre: true, ..Default::default()})
    }

    fn water() -> AtomCollection {
        collection(
            &[0.0, 0.0, 0.1173, 0.0, 0.7572, -0.4692, 0.0, -0.7572, -0.4692],
            &[8.0, 1.0, 1.0]
        )
    }

    fn methane(a: f64) -> AtomCollection {
        collection(
            &[0.0, 0.0, 0.0, a, a, a, -a, -a, a, -a, a, -a, a, -a, -a],
            &[6.0, 1.0, 1.0, 1.0, 1.0]
        )
    }

    fn label(classifier: &SymmetryClassifier, atoms: &AtomCollection) -> String {
        classifier.classify(atoms).unwrap().to_string()
    }

    #[test]
    fn small_molecules() {
        let classifier = centred_classifier();
        assert_eq!(label(&classifier, &water()), "C2v");

        let ammonia = collection(&[
            0.0, 0.0, 0.0,
            0.9377, 0.0, -0.3816,
            -0.46885, 0.81207, -0.3816,
            -0.46885, -0.81207, -0.3816,
        ], &[7.0, 1.0, 1.0, 1.0]);
        assert_eq!(label(&classifier, &ammonia), "C3v");

        assert_eq!(label(&classifier, &methane(0.629)), "Td");

        let d = 1.56;
        let hexafluoride = collection(&[
            0.0, 0.0, 0.0,
            d, 0.0, 0.0, -d, 0.0, 0.0,
            0.0, d, 0.0, 0.0, -d, 0.0,
            0.0, 0.0, d, 0.0, 0.0, -d,
        ], &[16.0, 9.0, 9.0, 9.0, 9.0, 9.0, 9.0]);
        assert_eq!(label(&classifier, &hexafluoride), "Oh");

        let ethylene = collection(&[
            0.0, 0.0, 0.6695,
            0.0, 0.0, -0.6695,
            0.0, 0.9289, 1.2321,
            0.0, -0.9289, 1.2321,
            0.0, 0.9289, -1.2321,
            0.0, -0.9289, -1.2321,
        ], &[6.0, 6.0, 1.0, 1.0, 1.0, 1.0]);
        assert_eq!(label(&classifier, &ethylene), "D2h");
    }

    #[test]
    fn benzene() {
        let mut coordinates = Vec::new();
        let mut numbers = Vec::new();
        for (radius, number) in [(1.39, 6.0), (2.48, 1.0)] {
            for k in 0..6 {
                let angle = std::f64::consts::PI / 3.0 * k as f64;
                coordinates.extend([radius * angle.cos(), radius * angle.sin(), 0.0]);
                numbers.push(number);
            }
        }
        assert_eq!(label(&centred_classifier(), &collection(&coordinates, &numbers)), "D6h");
    }

    #[test]
    fn linear_molecules() {
        let classifier = centred_classifier();
        let carbon_dioxide = collection(&[0.0, 0.0, -1.16, 0.0, 0.0, 0.0, 0.0, 0.0, 1.16], &[8.0, 6.0, 8.0]);
        assert_eq!(label(&classifier, &carbon_dioxide), "D*h");

        let hydrogen_cyanide = collection(&[0.0, 0.0, -1.064, 0.0, 0.0, 0.0, 0.0, 0.0, 1.156], &[1.0, 6.0, 7.0]);
        assert_eq!(label(&classifier, &hydrogen_cyanide), "C*v");
    }

    #[test]
    fn single_atom() {
        let classifier = centred_classifier();
        assert_eq!(label(&classifier, &collection(&[1.0, 2.0, 3.0], &[6.0])), "Kh");
        assert_eq!(classifier.classify(&AtomCollection::empty()), Err(SymmetryError::EmptyCollection));
    }

    #[test]
    fn species_can_be_ignored() {
        let a = 0.629;
        let chiral = collection(
            &[0.0, 0.0, 0.0, a, a, a, -a, -a, a, -a, a, -a, a, -a, -a],
            &[6.0, 1.0, 7.0, 8.0, 9.0]
        );
        let settings = ClassifierSettings::default();
        assert_eq!(label(&SymmetryClassifier::new(&settings), &chiral), "C1");

        let ignoring = SymmetryClassifier::new(&ClassifierSettings {ignore_species: true, ..settings});
        assert_eq!(label(&ignoring, &chiral), "Td");
    }

    #[test]
    fn inversion_only() {
        // Three inverted pairs of distinct species at 60 degrees to each
        // other, so no axis or plane normal is parallel or perpendicular to all
        let a = Vector3::new(1.2, 0.0, 0.0);
        let b = 1.5 * Vector3::new(0.5, 0.75f64.sqrt(), 0.0);
        let c = 1.8 * Vector3::new(0.5, 0.5 / 3.0f64.sqrt(), (2.0f64 / 3.0).sqrt());
        let coordinates: Vec<f64> = [a, b, c, -a, -b, -c].iter()
            .flat_map(|v| v.iter().copied().collect::<Vec<f64>>())
            .collect();
        let atoms = collection(&coordinates, &[1.0, 6.0, 7.0, 1.0, 6.0, 7.0]);

        assert_eq!(label(&SymmetryClassifier::default(), &atoms), "Ci");
        assert_eq!(label(&centred_classifier(), &atoms), "Ci");
    }

    #[test]
    fn elements_through_origin() {
        let shifted = water().translated(&Vector3::new(1.0, 0.0, 0.0));

        // Only the mirror plane containing the shift survives
        assert_eq!(label(&SymmetryClassifier::default(), &shifted), "Cs");
        assert_eq!(label(&centred_classifier(), &shifted), "C2v");
    }

    #[test]
    fn masses_and_labels() {
        approx::assert_relative_eq!(atomic_mass(6), 12.011);
        assert_eq!(atomic_mass(16), 16.0);
        assert_eq!(PointGroupLabel::from("C2v"), PointGroupLabel("C2v".to_string()));
        assert_eq!(serde_json::to_string(&PointGroupLabel::from("Td")).unwrap(), "\"Td\"");
    }
}
