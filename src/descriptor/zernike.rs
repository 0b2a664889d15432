use std::f64::consts::PI;
use memoize::memoize;
use statrs::function::factorial::binomial;
extern crate nalgebra as na;

use crate::descriptor::{DescriptorError, Invariants, Transform};
use crate::descriptor::stages::WeightedPoints;

/// Expansion indices `(n, l)` with `l <= n` and `n - l` even, ordered by `n` then `l`
pub fn invariant_indices(max_order: usize) -> Vec<(usize, usize)> {
    (0..=max_order)
        .flat_map(|n| (n % 2..=n).step_by(2).map(move |l| (n, l)))
        .collect()
}

/// Coefficients of the radial polynomial `R_nl(r) = Σ_v q_v r^(2v + l)`
///
/// Normalized so that `∫₀¹ R_nl R_n'l r² dr = δ_nn' / 3`.
#[memoize]
pub fn radial_coefficients(n: usize, l: usize) -> Vec<f64> {
    debug_assert!(l <= n && (n - l) % 2 == 0);
    let k = (n - l) / 2;
    let (k64, l64) = (k as u64, l as u64);

    let sign_k = if k % 2 == 0 { 1.0 } else { -1.0 };
    let prefactor = sign_k / 4f64.powi(k as i32)
        * ((2 * l + 4 * k + 3) as f64 / 3.0).sqrt()
        * binomial(2 * k64, k64);

    (0..=k64)
        .map(|v| {
            let sign_v = if v % 2 == 0 { 1.0 } else { -1.0 };
            prefactor * sign_v * binomial(k64, v)
                * binomial(2 * (k64 + l64 + v) + 1, 2 * k64)
                / binomial(k64 + l64 + v, k64)
        })
        .collect()
}

pub fn radial(n: usize, l: usize, r: f64) -> f64 {
    radial_coefficients(n, l).iter()
        .enumerate()
        .map(|(v, q)| q * r.powi((2 * v + l) as i32))
        .sum()
}

/// Legendre polynomials `P_0(x)` through `P_max(x)`
pub fn legendre(max: usize, x: f64) -> Vec<f64> {
    let mut values = Vec::with_capacity(max + 1);
    values.push(1.0);
    if max > 0 {
        values.push(x);
    }
    for k in 1..max {
        let kf = k as f64;
        let next = ((2.0 * kf + 1.0) * x * values[k] - kf * values[k - 1]) / (kf + 1.0);
        values.push(next);
    }
    values
}

/// Rotationally invariant power spectrum of 3D Zernike moments
///
/// For every `(n, l)`, sums `|Ω_nlm|²` over `m` for the moments of weighted
/// point masses in the unit ball. The sum over `m` is evaluated via the
/// spherical harmonic addition theorem, so only radii and pairwise angles
/// enter. Points outside the unit ball do not contribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZernikeInvariants {
    pub max_order: usize,
}

impl ZernikeInvariants {
    pub fn new(max_order: usize) -> ZernikeInvariants {
        ZernikeInvariants {max_order}
    }

    pub fn len(&self) -> usize {
        invariant_indices(self.max_order).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Contributor {
    weight: f64,
    direction: Option<na::Vector3<f64>>,
    /// Radial polynomial values in invariant index order
    radials: Vec<f64>,
}

impl Transform<WeightedPoints> for ZernikeInvariants {
    type Output = Invariants;

    fn apply(&self, points: WeightedPoints) -> Result<Invariants, DescriptorError> {
        let indices = invariant_indices(self.max_order);

        let contributors: Vec<Contributor> = points.positions.column_iter()
            .zip(points.weights.iter())
            .filter_map(|(position, &weight)| {
                let r = position.norm();
                if r > 1.0 || weight == 0.0 {
                    return None;
                }

                let direction = (r > 1e-12).then(|| position / r);
                let radials = indices.iter().map(|&(n, l)| radial(n, l, r)).collect();
                Some(Contributor {weight, direction, radials})
            })
            .collect();

        let normalization = (3.0 / (4.0 * PI)).powi(2);
        let mut values = na::DVector::<f64>::zeros(indices.len());
        for a in contributors.iter() {
            for b in contributors.iter() {
                let cos_angle = match (&a.direction, &b.direction) {
                    (Some(u), Some(v)) => u.dot(v).clamp(-1.0, 1.0),
                    _ => 1.0
                };
                let legendres = legendre(self.max_order, cos_angle);
                let weight = a.weight * b.weight;

                for (k, &(_, l)) in indices.iter().enumerate() {
                    let harmonic_sum = (2 * l + 1) as f64 / (4.0 * PI) * legendres[l];
                    values[k] += weight * a.radials[k] * b.radials[k] * harmonic_sum;
                }
            }
        }

        Ok(Invariants {values: values * normalization, indices})
    }
}
