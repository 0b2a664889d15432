use rand::Rng;
use rand::distributions::{Distribution, Uniform};
use thiserror::Error;
use itertools::Itertools;

extern crate nalgebra as na;
pub type Matrix3N = na::Matrix3xX<f64>;
pub type Vector3 = na::Vector3<f64>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AtomsError {
    #[error("{positions} positions but {numbers} species values")]
    LengthMismatch {positions: usize, numbers: usize},
}

/// Fixed-size ordered collection of atoms
///
/// Each atom has a position and an atomic-number-like species value. The
/// atom count is fixed at construction.
#[derive(Clone, Debug, PartialEq)]
pub struct AtomCollection {
    positions: Matrix3N,
    numbers: Vec<f64>,
}

impl AtomCollection {
    pub fn new(positions: Matrix3N, numbers: Vec<f64>) -> Result<AtomCollection, AtomsError> {
        if positions.ncols() != numbers.len() {
            return Err(AtomsError::LengthMismatch {positions: positions.ncols(), numbers: numbers.len()});
        }

        Ok(AtomCollection {positions, numbers})
    }

    /// Collection of atoms all of the same species
    pub fn uniform(positions: Matrix3N, number: f64) -> AtomCollection {
        let numbers = vec![number; positions.ncols()];
        AtomCollection {positions, numbers}
    }

    pub fn empty() -> AtomCollection {
        AtomCollection {positions: Matrix3N::zeros(0), numbers: Vec::new()}
    }

    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }

    pub fn positions(&self) -> &Matrix3N {
        &self.positions
    }

    pub fn positions_mut(&mut self) -> &mut Matrix3N {
        &mut self.positions
    }

    pub fn position(&self, index: usize) -> Vector3 {
        self.positions.column(index).into_owned()
    }

    pub fn numbers(&self) -> &[f64] {
        &self.numbers
    }

    /// Replace all species values at once
    pub fn set_numbers(&mut self, numbers: Vec<f64>) -> Result<(), AtomsError> {
        if numbers.len() != self.len() {
            return Err(AtomsError::LengthMismatch {positions: self.len(), numbers: numbers.len()});
        }

        self.numbers = numbers;
        Ok(())
    }

    pub fn fill_numbers(&mut self, number: f64) {
        self.numbers.iter_mut().for_each(|n| *n = number);
    }

    /// Unweighted mean position, `None` if empty
    pub fn centroid(&self) -> Option<Vector3> {
        (!self.is_empty()).then(|| self.positions.column_sum() / self.len() as f64)
    }

    /// Copy translated so that the centroid is at the origin
    pub fn centred(&self) -> AtomCollection {
        let mut copy = self.clone();
        if let Some(centroid) = self.centroid() {
            copy.positions.column_iter_mut().for_each(|mut c| c -= centroid);
        }
        copy
    }

    pub fn translated(&self, shift: &Vector3) -> AtomCollection {
        let mut copy = self.clone();
        copy.positions.column_iter_mut().for_each(|mut c| c += shift);
        copy
    }

    pub fn scaled(&self, factor: f64) -> AtomCollection {
        AtomCollection {positions: self.positions.scale(factor), numbers: self.numbers.clone()}
    }

    pub fn rotated(&self, rotation: &na::Rotation3<f64>) -> AtomCollection {
        AtomCollection {positions: rotation * &self.positions, numbers: self.numbers.clone()}
    }

    /// Reorder atoms so that atom `i` of the result is atom `order[i]` of self
    ///
    /// Returns `None` if `order` is not a permutation of the atom indices.
    pub fn permuted(&self, order: &[usize]) -> Option<AtomCollection> {
        let n = self.len();
        if order.len() != n || !order.iter().all(|&i| i < n) || !order.iter().all_unique() {
            return None;
        }

        let columns: Vec<Vector3> = order.iter().map(|&i| self.position(i)).collect();
        let positions = from_columns(&columns);
        let numbers = order.iter().map(|&i| self.numbers[i]).collect();
        Some(AtomCollection {positions, numbers})
    }

    /// Smallest pairwise distance, `None` for fewer than two atoms
    pub fn min_separation(&self) -> Option<f64> {
        (0..self.len())
            .tuple_combinations()
            .map(|(i, j)| (self.positions.column(i) - self.positions.column(j)).norm())
            .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |m| m.min(d))))
    }

    /// Mask with all positions free and all species fixed
    pub fn separation_mask(&self) -> SeparationMask {
        SeparationMask::fixed_numbers(self.len())
    }
}

/// Matrix of column vectors, also for zero columns
pub fn from_columns(columns: &[Vector3]) -> Matrix3N {
    Matrix3N::from_iterator(columns.len(), columns.iter().flat_map(|c| c.iter().copied()))
}

/// Per-atom flags marking which properties stay fixed during optimisation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeparationMask {
    pub positions: Vec<bool>,
    pub numbers: Vec<bool>,
}

impl SeparationMask {
    /// Nothing fixed
    pub fn free(n: usize) -> SeparationMask {
        SeparationMask {positions: vec![false; n], numbers: vec![false; n]}
    }

    pub fn fixed_numbers(n: usize) -> SeparationMask {
        SeparationMask {positions: vec![false; n], numbers: vec![true; n]}
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn is_consistent_with(&self, atoms: &AtomCollection) -> bool {
        self.positions.len() == atoms.len() && self.numbers.len() == atoms.len()
    }
}

/// Random atoms uniformly distributed within a ball
///
/// With `centre`, the ball is centred at the origin, otherwise at
/// `(radius, radius, radius)` so that all coordinates are non-negative.
pub fn random_atoms_in_sphere<R: Rng + ?Sized>(rng: &mut R, count: usize, radius: f64, centre: bool, number: f64) -> AtomCollection {
    let offset = if centre { Vector3::zeros() } else { Vector3::repeat(radius) };
    let unit = Uniform::new_inclusive(-1.0, 1.0);

    let columns: Vec<Vector3> = (0..count)
        .map(|_| {
            loop {
                let v = Vector3::new(unit.sample(rng), unit.sample(rng), unit.sample(rng));
                if v.norm_squared() <= 1.0 {
                    break radius * v + offset;
                }
            }
        })
        .collect();

    AtomCollection::uniform(from_columns(&columns), number)
}

#[cfg(test)]
mod tests {
    use crate::atoms::*;
    use rand::SeedableRng;

    fn triangle() -> AtomCollection {
        let positions = Matrix3N::from_column_slice(&[
            0.0, 0.0, 0.0,
            3.0, 0.0, 0.0,
            0.0, 4.0, 0.0,
        ]);
        AtomCollection::new(positions, vec![1.0, 6.0, 8.0]).unwrap()
    }

    #[test]
    fn construction() {
        let positions = Matrix3N::zeros(2);
        assert_eq!(
            AtomCollection::new(positions, vec![1.0]),
            Err(AtomsError::LengthMismatch {positions: 2, numbers: 1})
        );

        let mut atoms = triangle();
        assert_eq!(atoms.len(), 3);
        assert!(atoms.set_numbers(vec![1.0]).is_err());
        atoms.fill_numbers(1.0);
        assert_eq!(atoms.numbers(), &[1.0, 1.0, 1.0]);
        assert!(AtomCollection::empty().is_empty());
    }

    #[test]
    fn separations() {
        approx::assert_relative_eq!(triangle().min_separation().unwrap(), 3.0);
        assert_eq!(AtomCollection::empty().min_separation(), None);
        assert_eq!(AtomCollection::uniform(Matrix3N::zeros(1), 1.0).min_separation(), None);
    }

    #[test]
    fn centring_and_rigid_motion() {
        let atoms = triangle();
        let centred = atoms.centred();
        approx::assert_relative_eq!(centred.centroid().unwrap(), Vector3::zeros(), epsilon = 1e-12);

        let rotation = na::Rotation3::from_scaled_axis(Vector3::new(0.3, -1.2, 0.7));
        let rotated = atoms.rotated(&rotation);
        approx::assert_relative_eq!(rotated.min_separation().unwrap(), 3.0, epsilon = 1e-12);

        let shifted = atoms.translated(&Vector3::new(1.0, 2.0, 3.0));
        approx::assert_relative_eq!(shifted.position(0), Vector3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn permutation() {
        let atoms = triangle();
        let permuted = atoms.permuted(&[2, 0, 1]).unwrap();
        assert_eq!(permuted.numbers(), &[8.0, 1.0, 6.0]);
        approx::assert_relative_eq!(permuted.position(0), atoms.position(2));
        assert!(atoms.permuted(&[0, 0, 1]).is_none());
        assert!(atoms.permuted(&[0, 1]).is_none());
    }

    #[test]
    fn random_sphere_points() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let atoms = random_atoms_in_sphere(&mut rng, 50, 2.0, true, 1.0);
        assert_eq!(atoms.len(), 50);
        assert!(atoms.positions().column_iter().all(|c| c.norm() <= 2.0));
        assert!(atoms.numbers().iter().all(|&n| n == 1.0));

        let shifted = random_atoms_in_sphere(&mut rng, 50, 2.0, false, 1.0);
        assert!(shifted.positions().iter().all(|&x| x >= 0.0));
        assert!(shifted.positions().column_iter().all(|c| (c - Vector3::repeat(2.0)).norm() <= 2.0 + 1e-12));
    }
}
