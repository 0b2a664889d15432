use itertools::Itertools;
extern crate nalgebra as na;

use crate::symmetry::Molecule;

/// Principal moments of inertia in ascending order
#[derive(Clone, Debug, PartialEq)]
pub struct Moments(pub na::Vector3<f64>);
/// Principal axes as columns, ordered like the moments
#[derive(Clone, Debug, PartialEq)]
pub struct Axes(pub na::Matrix3<f64>);

/// Mass-weighted inertia tensor about the origin, normalized by the total inertia
///
/// The normalization makes the eigenvalues sum to two independently of the
/// size of the molecule. Returns `None` if all mass sits at the origin.
pub fn inertia_tensor(molecule: &Molecule) -> Option<na::Matrix3<f64>> {
    let mut inertial_mat = na::Matrix3::<f64>::zeros();
    let mut total_inertia = 0.0;

    for (col, &mass) in molecule.positions.column_iter().zip(molecule.masses.iter()) {
        inertial_mat[(0, 0)] += mass * (col.y.powi(2) + col.z.powi(2));
        inertial_mat[(1, 1)] += mass * (col.x.powi(2) + col.z.powi(2));
        inertial_mat[(2, 2)] += mass * (col.x.powi(2) + col.y.powi(2));

        let xy = mass * col.x * col.y;
        inertial_mat[(1, 0)] -= xy;
        inertial_mat[(0, 1)] -= xy;

        let xz = mass * col.x * col.z;
        inertial_mat[(2, 0)] -= xz;
        inertial_mat[(0, 2)] -= xz;

        let yz = mass * col.y * col.z;
        inertial_mat[(2, 1)] -= yz;
        inertial_mat[(1, 2)] -= yz;

        total_inertia += mass * col.norm_squared();
    }

    (total_inertia > 1e-12).then(|| inertial_mat / total_inertia)
}

pub fn moments_axes(tensor: na::Matrix3<f64>) -> (Moments, Axes) {
    let decomposition = na::SymmetricEigen::new(tensor);
    let ordering: Vec<usize> = (0..3)
        .sorted_by(|&a, &b| decomposition.eigenvalues[a].total_cmp(&decomposition.eigenvalues[b]))
        .collect();

    let moments = na::Vector3::from_iterator(ordering.iter().map(|&i| decomposition.eigenvalues[i]));
    let columns: Vec<na::Vector3<f64>> = ordering.iter()
        .map(|&i| decomposition.eigenvectors.column(i).into_owned())
        .collect();

    (Moments(moments), Axes(na::Matrix3::from_columns(&columns)))
}

/// Shape of spinning collection of particles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Top {
    /// Line: 0 ≃ I_a << I_b = I_c
    Linear,
    /// Asymmetric: I_a < I_b < I_c
    Asymmetric,
    /// Prolate (think rugby football): I_a < I_b = I_c
    Prolate,
    /// Oblate (think disc): I_a = I_b < I_c
    Oblate,
    /// Spherical: I_a = I_b = I_c
    Spherical
}

impl Top {
    /// Classify normalized principal moments with an absolute tolerance
    pub fn classify(moments: &Moments, tolerance: f64) -> Top {
        let [a, b, c] = [moments.0.x, moments.0.y, moments.0.z];

        if (a * b * c).abs() < tolerance {
            return Top::Linear;
        }

        if (a - c).abs() < tolerance {
            return Top::Spherical;
        }

        match ((a - b).abs() < tolerance, (b - c).abs() < tolerance) {
            (true, _) => Top::Oblate,
            (false, true) => Top::Prolate,
            (false, false) => Top::Asymmetric,
        }
    }

    /// Index of the principal axis unique in its moment, if there is one
    pub fn unique_axis(&self) -> Option<usize> {
        match self {
            Top::Oblate => Some(2),
            Top::Prolate => Some(0),
            _ => None
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::symmetry::inertia::*;
    use crate::atoms::Matrix3N;
    extern crate nalgebra as na;

    const EPSILON: f64 = 1e-6;

    fn molecule(coordinates: &[f64]) -> Molecule {
        let positions = Matrix3N::from_column_slice(coordinates);
        let n = positions.ncols();
        Molecule {positions, numbers: vec![1; n], masses: vec![1.0; n]}
    }

    #[test]
    fn normalized_moments() {
        let line = molecule(&[0.0, 0.0, 1.0, 0.0, 0.0, -1.0]);
        let (moments, axes) = moments_axes(inertia_tensor(&line).unwrap());
        approx::assert_relative_eq!(moments.0, na::Vector3::new(0.0, 1.0, 1.0), epsilon = EPSILON);
        approx::assert_relative_eq!(axes.0.column(0).z.abs(), 1.0, epsilon = EPSILON);
        assert_eq!(Top::classify(&moments, 0.01), Top::Linear);

        assert!(inertia_tensor(&molecule(&[0.0, 0.0, 0.0])).is_none());
    }

    #[test]
    fn top_identification() {
        let a = 1.0 / 3f64.sqrt();
        let tetrahedron = molecule(&[a, a, a, -a, -a, a, -a, a, -a, a, -a, -a]);
        let square = molecule(&[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, -1.0, 0.0, 0.0, 0.0, -1.0, 0.0]);
        let bipyramid = molecule(&[
            1.0, 0.0, 0.0,
            -0.5, 0.866, 0.0,
            -0.5, -0.866, 0.0,
            0.0, 0.0, 2.0,
            0.0, 0.0, -2.0,
        ]);
        let bent = molecule(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.3, 0.9, 0.0]);

        let classify = |m: &Molecule| {
            let (moments, _) = moments_axes(inertia_tensor(m).unwrap());
            Top::classify(&moments, 0.01)
        };

        assert_eq!(classify(&tetrahedron), Top::Spherical);
        assert_eq!(classify(&square), Top::Oblate);
        assert_eq!(classify(&bipyramid), Top::Prolate);
        assert_eq!(classify(&bent), Top::Asymmetric);
        assert_eq!(Top::Oblate.unique_axis(), Some(2));
        assert_eq!(Top::Asymmetric.unique_axis(), None);
    }
}
