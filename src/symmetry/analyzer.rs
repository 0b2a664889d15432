use std::f64::consts::PI;
use indexmap::IndexMap;
use itertools::Itertools;
extern crate nalgebra as na;

use crate::atoms::Vector3;
use crate::symmetry::{Molecule, PointGroupAnalyzer, PointGroupLabel};
use crate::symmetry::inertia::{Axes, Top, inertia_tensor, moments_axes};

type Operation = na::Matrix3<f64>;

fn rotation(axis: &Vector3, angle: f64) -> Operation {
    na::Rotation3::from_axis_angle(&na::Unit::new_normalize(*axis), angle).into_inner()
}

fn reflection(normal: &Vector3) -> Operation {
    let n = normal.normalize();
    Operation::identity() - 2.0 * n * n.transpose()
}

fn rotoreflection(axis: &Vector3, angle: f64) -> Operation {
    reflection(axis) * rotation(axis, angle)
}

fn inversion() -> Operation {
    -Operation::identity()
}

/// Kind of mirror plane found relative to a rotation axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mirror {
    /// Perpendicular to the axis
    Horizontal,
    /// Containing the axis and a secondary rotation axis
    Vertical,
    /// Containing the axis, bisecting secondary rotation axes
    Diagonal,
}

/// Schoenflies point group detection from principal axes of inertia
///
/// Symmetry operations are tested by matching every transformed atom to
/// exactly one atom of the same species within `tolerance` in each
/// coordinate. Principal moments are normalized to sum to two and compared
/// with `eigen_tolerance` to tell linear, symmetric, spherical and
/// asymmetric tops apart.
#[derive(Clone, Debug, PartialEq)]
pub struct SchoenfliesAnalyzer {
    pub tolerance: f64,
    pub eigen_tolerance: f64,
}

impl SchoenfliesAnalyzer {
    pub fn new(tolerance: f64, eigen_tolerance: f64) -> SchoenfliesAnalyzer {
        SchoenfliesAnalyzer {tolerance, eigen_tolerance}
    }
}

impl Default for SchoenfliesAnalyzer {
    fn default() -> SchoenfliesAnalyzer {
        SchoenfliesAnalyzer::new(0.3, 0.01)
    }
}

impl PointGroupAnalyzer for SchoenfliesAnalyzer {
    fn analyze(&self, molecule: &Molecule) -> PointGroupLabel {
        if molecule.len() == 1 {
            return PointGroupLabel::from("Kh");
        }

        let tensor = match inertia_tensor(molecule) {
            Some(tensor) => tensor,
            None => {
                log::debug!("All atoms coincide with the origin.");
                return PointGroupLabel::from("Kh");
            }
        };

        let (moments, axes) = moments_axes(tensor);
        let top = Top::classify(&moments, self.eigen_tolerance);
        log::debug!("Principal moments {:?} make a {:?} top.", moments.0.as_slice(), top);

        let mut analysis = Analysis {
            molecule,
            tolerance: self.tolerance,
            axes,
            rotations: Vec::new(),
        };

        let label = match top {
            Top::Linear => analysis.linear(),
            Top::Asymmetric => analysis.asymmetric_top(),
            Top::Spherical => analysis.spherical_top(),
            Top::Prolate | Top::Oblate => analysis.symmetric_top(top.unique_axis().unwrap_or(2)),
        };

        PointGroupLabel(label)
    }
}

/// Proper rotation axis (unit vector) and its order
type RotationAxis = (Vector3, u32);

struct Analysis<'a> {
    molecule: &'a Molecule,
    tolerance: f64,
    axes: Axes,
    rotations: Vec<RotationAxis>,
}

impl<'a> Analysis<'a> {
    fn position(&self, index: usize) -> Vector3 {
        self.molecule.positions.column(index).into_owned()
    }

    fn principal_axis(&self, index: usize) -> Vector3 {
        self.axes.0.column(index).into_owned()
    }

    fn is_valid(&self, operation: &Operation) -> bool {
        let positions = &self.molecule.positions;
        let numbers = &self.molecule.numbers;

        positions.column_iter().zip(numbers.iter()).all(|(col, &number)| {
            let image = operation * col;
            let mut matches = positions.column_iter()
                .enumerate()
                .filter(|(_, other)| (other - &image).amax() < self.tolerance)
                .map(|(j, _)| j);

            match (matches.next(), matches.next()) {
                (Some(j), None) => numbers[j] == number,
                _ => false
            }
        })
    }

    fn add_rotation(&mut self, axis: Vector3, order: u32) {
        log::debug!("Located a C{} axis along {:?}.", order, axis.as_slice());
        self.rotations.push((axis.normalize(), order));
    }

    /// First of the highest order rotations
    fn main_rotation(&self) -> Option<RotationAxis> {
        let order = self.rotations.iter().map(|&(_, n)| n).max()?;
        self.rotations.iter().find(|&&(_, n)| n == order).copied()
    }

    /// Groups atoms by species and distance from the origin
    ///
    /// Radii are clustered by single linkage: sorted radii separated by no more
    /// than the tolerance share a cluster. Clusters whose mean radius is below
    /// the tolerance sit at the origin and are left out. Clusters are ordered
    /// by their first member.
    fn clusters(&self) -> Vec<Vec<usize>> {
        let radii: Vec<f64> = self.molecule.positions.column_iter().map(|col| col.norm()).collect();
        let order: Vec<usize> = (0..radii.len())
            .sorted_by(|&a, &b| radii[a].total_cmp(&radii[b]))
            .collect();

        let mut shell = vec![0; radii.len()];
        let mut shell_members: Vec<Vec<usize>> = Vec::new();
        for (k, &i) in order.iter().enumerate() {
            if k == 0 || radii[i] - radii[order[k - 1]] > self.tolerance {
                shell_members.push(Vec::new());
            }
            shell[i] = shell_members.len() - 1;
            if let Some(members) = shell_members.last_mut() {
                members.push(i);
            }
        }

        let mean_radii: Vec<f64> = shell_members.iter()
            .map(|members| members.iter().map(|&i| radii[i]).sum::<f64>() / members.len() as f64)
            .collect();

        let mut clusters: IndexMap<(usize, u32), Vec<usize>> = IndexMap::new();
        for (i, &number) in self.molecule.numbers.iter().enumerate() {
            if mean_radii[shell[i]] < self.tolerance {
                continue;
            }
            clusters.entry((shell[i], number)).or_default().push(i);
        }

        clusters.into_values().collect()
    }

    fn smallest_set_off_axis(&self, axis: &Vector3) -> Option<Vec<usize>> {
        let unit = axis.normalize();
        self.clusters().into_iter()
            .map(|cluster| cluster.into_iter()
                .filter(|&i| self.position(i).cross(&unit).norm() > self.tolerance)
                .collect::<Vec<usize>>()
            )
            .filter(|set| !set.is_empty())
            .min_by_key(|set| set.len())
    }

    fn linear(&mut self) -> String {
        if self.is_valid(&inversion()) {
            log::debug!("Located an inversion centre.");
            "D*h".to_string()
        } else {
            "C*v".to_string()
        }
    }

    fn asymmetric_top(&mut self) -> String {
        for index in 0..3 {
            let axis = self.principal_axis(index);
            if self.is_valid(&rotation(&axis, PI)) {
                self.add_rotation(axis, 2);
            }
        }

        match self.rotations.len() {
            0 => self.no_rotation(),
            3 => self.dihedral(),
            _ => self.cyclic()
        }
    }

    fn symmetric_top(&mut self, unique: usize) -> String {
        let axis = self.principal_axis(unique);
        self.check_rotation(&axis);
        if !self.rotations.is_empty() {
            self.check_perpendicular_twofold(&axis);
        }

        match self.rotations.len() {
            0 => self.no_rotation(),
            1 => self.cyclic(),
            _ => self.dihedral()
        }
    }

    fn spherical_top(&mut self) -> String {
        self.find_spherical_axes();

        let (axis, order) = match self.main_rotation() {
            Some((axis, order)) if order >= 3 => (axis, order),
            _ => {
                log::debug!("Accidental spherical top.");
                return self.symmetric_top(2);
            }
        };

        let inverting = self.is_valid(&inversion());
        let label = match order {
            3 => match (self.find_mirror(&axis), inverting) {
                (Some(_), true) => "Th",
                (Some(_), false) => "Td",
                (None, _) => "T"
            },
            4 => if inverting { "Oh" } else { "O" },
            _ => if inverting { "Ih" } else { "I" }
        };

        label.to_string()
    }

    fn no_rotation(&mut self) -> String {
        if self.is_valid(&inversion()) {
            log::debug!("Located an inversion centre.");
            return "Ci".to_string();
        }

        let mirrored = (0..3).any(|index| {
            let axis = self.principal_axis(index);
            self.find_mirror(&axis).is_some()
        });

        match mirrored {
            true => "Cs".to_string(),
            false => "C1".to_string()
        }
    }

    fn cyclic(&mut self) -> String {
        let Some((axis, order)) = self.main_rotation() else {
            return self.no_rotation();
        };

        match self.find_mirror(&axis) {
            Some(Mirror::Horizontal) => format!("C{}h", order),
            Some(Mirror::Vertical) => format!("C{}v", order),
            Some(Mirror::Diagonal) => format!("C{}", order),
            None => {
                if self.is_valid(&rotoreflection(&axis, PI / order as f64)) {
                    format!("S{}", 2 * order)
                } else {
                    format!("C{}", order)
                }
            }
        }
    }

    fn dihedral(&mut self) -> String {
        let Some((axis, order)) = self.main_rotation() else {
            return self.no_rotation();
        };

        match self.find_mirror(&axis) {
            Some(Mirror::Horizontal) => format!("D{}h", order),
            Some(_) => format!("D{}d", order),
            None => format!("D{}", order)
        }
    }

    /// Highest order rotation about an axis compatible with the smallest off-axis cluster
    fn check_rotation(&mut self, axis: &Vector3) {
        let Some(set) = self.smallest_set_off_axis(axis) else {
            return;
        };

        let size = set.len() as u32;
        for order in (2..=size).rev().filter(|order| size % order == 0) {
            if self.is_valid(&rotation(axis, 2.0 * PI / order as f64)) {
                self.add_rotation(*axis, order);
                return;
            }
        }
    }

    /// Finds a twofold axis perpendicular to `axis` relating two atoms of the smallest cluster
    fn check_perpendicular_twofold(&mut self, axis: &Vector3) {
        let Some(set) = self.smallest_set_off_axis(axis) else {
            return;
        };
        let unit = axis.normalize();

        for (a, b) in set.iter().tuple_combinations() {
            let (p, q) = (self.position(*a), self.position(*b));
            let sum = p + q;
            let candidates = [
                (p - q).cross(&unit),
                sum - unit * sum.dot(&unit),
            ];

            for candidate in candidates {
                if candidate.norm() > self.tolerance && self.is_valid(&rotation(&candidate, PI)) {
                    self.add_rotation(candidate, 2);
                    return;
                }
            }
        }
    }

    /// Searches twofold axes through pair midpoints and higher order axes
    /// normal to triangles of the smallest cluster
    fn find_spherical_axes(&mut self) {
        let clusters = self.clusters();
        let Some(set) = clusters.iter().min_by_key(|cluster| cluster.len()) else {
            return;
        };

        let mut present = [false; 6];
        for (a, b, c) in set.iter().tuple_combinations() {
            let corners = [self.position(*a), self.position(*b), self.position(*c)];

            for (u, v) in corners.iter().tuple_combinations() {
                let candidate = u + v;
                if !present[2] && candidate.norm() > self.tolerance && self.is_valid(&rotation(&candidate, PI)) {
                    present[2] = true;
                    self.add_rotation(candidate, 2);
                }
            }

            let normal = (corners[1] - corners[0]).cross(&(corners[2] - corners[0]));
            if normal.norm() > self.tolerance {
                for order in 3..=5 {
                    if !present[order] && self.is_valid(&rotation(&normal, 2.0 * PI / order as f64)) {
                        present[order] = true;
                        self.add_rotation(normal, order as u32);
                        break;
                    }
                }
            }

            if present[2] && present[3] && (present[4] || present[5]) {
                break;
            }
        }
    }

    /// Mirror planes perpendicular to `axis` or bisecting a pair of like atoms
    fn find_mirror(&self, axis: &Vector3) -> Option<Mirror> {
        let unit = axis.normalize();
        if self.is_valid(&reflection(&unit)) {
            log::debug!("Located a horizontal mirror plane.");
            return Some(Mirror::Horizontal);
        }

        let numbers = &self.molecule.numbers;
        for (i, j) in (0..self.molecule.len()).tuple_combinations() {
            if numbers[i] != numbers[j] {
                continue;
            }

            let normal = self.position(i) - self.position(j);
            if normal.dot(&unit).abs() >= self.tolerance || !self.is_valid(&reflection(&normal)) {
                continue;
            }

            if self.rotations.len() <= 1 {
                log::debug!("Located a vertical mirror plane.");
                return Some(Mirror::Vertical);
            }

            let contains_secondary = self.rotations.iter()
                .filter(|(other, _)| (other - unit).norm() >= self.tolerance)
                .any(|(other, _)| other.dot(&normal).abs() < self.tolerance);

            return match contains_secondary {
                true => Some(Mirror::Vertical),
                false => Some(Mirror::Diagonal)
            };
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use crate::symmetry::analyzer::*;
    use crate::atoms::Matrix3N;
    extern crate nalgebra as na;

    fn molecule(coordinates: &[f64], numbers: &[u32]) -> Molecule {
        Molecule {
            positions: Matrix3N::from_column_slice(coordinates),
            numbers: numbers.to_vec(),
            masses: numbers.iter().map(|&z| crate::symmetry::atomic_mass(z)).collect(),
        }
    }

    fn analyze(coordinates: &[f64], numbers: &[u32]) -> String {
        SchoenfliesAnalyzer::default().analyze(&molecule(coordinates, numbers)).to_string()
    }

    #[test]
    fn operations() {
        let z = Vector3::z();
        let x = Vector3::x();
        approx::assert_relative_eq!(rotation(&z, PI / 2.0) * x, Vector3::y(), epsilon = 1e-12);
        approx::assert_relative_eq!(reflection(&(2.0 * z)) * Vector3::new(1.0, 2.0, 3.0), Vector3::new(1.0, 2.0, -3.0), epsilon = 1e-12);
        approx::assert_relative_eq!(rotoreflection(&z, PI), inversion(), epsilon = 1e-12);
    }

    #[test]
    fn clusters_by_species_and_radius() {
        let m = molecule(&[
            0.0, 0.0, 0.05,
            1.0, 0.0, 0.0,
            0.0, 1.1, 0.0,
            0.0, 0.0, 1.0,
            2.0, 0.0, 0.0,
        ], &[6, 1, 1, 8, 1]);
        let analysis = Analysis {
            molecule: &m,
            tolerance: 0.3,
            axes: Axes(na::Matrix3::identity()),
            rotations: Vec::new()
        };
        assert_eq!(analysis.clusters(), vec![vec![1, 2], vec![3], vec![4]]);
        assert_eq!(analysis.smallest_set_off_axis(&Vector3::z()), Some(vec![4]));
        assert_eq!(analysis.smallest_set_off_axis(&Vector3::x()), Some(vec![2]));
    }

    #[test]
    fn cyclic_groups() {
        // Planar trans arrangement with a C2 axis along z and a horizontal mirror
        let c2h = [
            0.7, 0.0, 0.0,
            -0.7, 0.0, 0.0,
            1.2, 0.9, 0.0,
            -1.2, -0.9, 0.0,
        ];
        assert_eq!(analyze(&c2h, &[6, 6, 1, 1]), "C2h");

        // Skewed pair of atoms without any mirror plane
        let c2 = [
            1.0, 0.0, 0.5,
            -1.0, 0.0, 0.5,
            1.3, 0.8, -0.4,
            -1.3, -0.8, -0.4,
        ];
        assert_eq!(analyze(&c2, &[6, 6, 1, 1]), "C2");
    }

    #[test]
    fn staggered_dihedral() {
        // Two staggered equilateral triangles above and below the origin
        let mut coordinates = Vec::new();
        for (height, offset) in [(0.8, 0.0), (-0.8, PI / 3.0)] {
            for k in 0..3 {
                let angle = 2.0 * PI / 3.0 * k as f64 + offset;
                coordinates.extend([1.2 * angle.cos(), 1.2 * angle.sin(), height]);
            }
        }
        assert_eq!(analyze(&coordinates, &[1; 6]), "D3d");
    }

    #[test]
    fn coincident_atoms() {
        assert_eq!(analyze(&[0.0; 6], &[1, 1]), "Kh");
    }
}
