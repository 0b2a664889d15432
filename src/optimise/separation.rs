use std::fmt;
use std::time::Duration;
use itertools::Itertools;
use rand::Rng;
use rand::seq::SliceRandom;
use thiserror::Error;
extern crate nalgebra as na;

use crate::atoms::{AtomCollection, AtomsError, SeparationMask, random_atoms_in_sphere};
use crate::config::{ConfigurationError, SeparationSettings};
use crate::optimise::{DIMENSIONS, ErrorFunction, LeastSquaresOptimiser, OptimiseError};

type Vector3 = na::Vector3<f64>;
type DVector = na::DVector<f64>;
type DMatrix = na::DMatrix<f64>;
type VectorView3<'a> = na::Matrix<f64, na::Const<3>, na::Const<1>, na::ViewStorage<'a, f64, na::Const<3>, na::Const<1>, na::Const<1>, na::Dyn>>;
type VectorViewMut3<'a> = na::Matrix<f64, na::Const<3>, na::Const<1>, na::ViewStorageMut<'a, f64, na::Const<3>, na::Const<1>, na::Const<1>, na::Dyn>>;

fn three(line: &DVector, index: usize) -> VectorView3 {
    line.fixed_view::<3, 1>(DIMENSIONS * index, 0)
}

fn three_mut(line: &mut DVector, index: usize) -> VectorViewMut3 {
    line.fixed_view_mut::<3, 1>(DIMENSIONS * index, 0)
}

/// Softened inverse-power repulsion acting only below a cutoff distance
///
/// The residual of a pair at distance `d` is `((s + ε) / (d + ε))^p - 1` for
/// `d < s` and zero beyond, so it vanishes continuously at the cutoff `s`.
#[derive(Clone, Debug, PartialEq)]
pub struct SeparationForce {
    pub epsilon: f64,
    pub cutoff: f64,
    pub power: i32,
}

impl SeparationForce {
    pub fn residual(&self, distance: f64) -> f64 {
        if distance >= self.cutoff {
            return 0.0;
        }

        ((self.cutoff + self.epsilon) / (distance + self.epsilon)).powi(self.power) - 1.0
    }

    /// Derivative of the residual with respect to the distance
    pub fn residual_derivative(&self, distance: f64) -> f64 {
        if distance >= self.cutoff {
            return 0.0;
        }

        let softened = distance + self.epsilon;
        -(self.power as f64) / softened * ((self.cutoff + self.epsilon) / softened).powi(self.power)
    }
}

#[derive(PartialEq, Debug)]
struct PairGradient(Vector3);

impl PairGradient {
    fn incorporate_into(self, gradient: &mut DVector, indices: (usize, usize)) {
        {
            let mut part = three_mut(gradient, indices.0);
            part += self.0;
        }
        {
            let mut part = three_mut(gradient, indices.1);
            part -= self.0;
        }
    }
}

/// Sum of squared separation residuals over all atom pairs
pub struct SeparationProblem {
    force: SeparationForce,
}

impl SeparationProblem {
    pub fn new(force: SeparationForce) -> SeparationProblem {
        SeparationProblem {force}
    }

    fn pair_error(&self, params: &DVector, (i, j): (usize, usize)) -> f64 {
        let distance = (three(params, i) - three(params, j)).norm();
        self.force.residual(distance).powi(2)
    }

    /// Unit vector from j to i and the distance, `None` beyond the cutoff
    ///
    /// Coincident atoms are pushed apart along the x axis.
    fn pair_direction(&self, params: &DVector, (i, j): (usize, usize)) -> Option<(Vector3, f64)> {
        let diff = three(params, i) - three(params, j);
        let distance = diff.norm();
        if distance >= self.force.cutoff {
            return None;
        }

        if distance < f64::EPSILON {
            return Some((Vector3::x(), distance));
        }

        Some((diff / distance, distance))
    }

    fn pair_gradient(&self, params: &DVector, pair: (usize, usize)) -> Option<PairGradient> {
        let (direction, distance) = self.pair_direction(params, pair)?;
        let residual = self.force.residual(distance);
        let factor = 2.0 * residual * self.force.residual_derivative(distance);
        Some(PairGradient(factor * direction))
    }
}

fn pairs(params: &DVector) -> impl Iterator<Item = (usize, usize)> {
    (0..params.len() / DIMENSIONS).tuple_combinations::<(usize, usize)>()
}

impl ErrorFunction for SeparationProblem {
    fn error(&self, params: &DVector) -> f64 {
        pairs(params)
            .map(|pair| self.pair_error(params, pair))
            .sum()
    }

    fn gradient(&self, params: &DVector) -> DVector {
        let mut gradient = DVector::zeros(params.len());

        for pair in pairs(params) {
            if let Some(contribution) = self.pair_gradient(params, pair) {
                contribution.incorporate_into(&mut gradient, pair);
            }
        }

        gradient
    }

    fn hessian(&self, params: &DVector) -> DMatrix {
        let mut hessian = DMatrix::zeros(params.len(), params.len());

        for pair in pairs(params) {
            if let Some((direction, distance)) = self.pair_direction(params, pair) {
                let derivative = self.force.residual_derivative(distance);
                let block = (2.0 * derivative.powi(2)) * direction * direction.transpose();
                let (i, j) = pair;
                for (a, b, sign) in [(i, i, 1.0), (j, j, 1.0), (i, j, -1.0), (j, i, -1.0)] {
                    let mut part = hessian.fixed_view_mut::<3, 3>(DIMENSIONS * a, DIMENSIONS * b);
                    part += sign * block;
                }
            }
        }

        hessian
    }
}

/// Flatten atoms into `[x, y, z, species]` per atom
pub fn pack(atoms: &AtomCollection) -> DVector {
    let mut params = DVector::zeros(DIMENSIONS * atoms.len());
    for (i, (position, &number)) in atoms.positions().column_iter().zip(atoms.numbers()).enumerate() {
        three_mut(&mut params, i).copy_from(&position);
        params[DIMENSIONS * i + 3] = number;
    }
    params
}

pub fn unpack(params: DVector) -> Result<AtomCollection, AtomsError> {
    let n = params.len() / DIMENSIONS;
    let matrix = params.reshape_generic(na::Const::<DIMENSIONS>, na::Dyn(n));
    let numbers = matrix.row(DIMENSIONS - 1).iter().copied().collect();
    let positions = matrix.remove_row(DIMENSIONS - 1);
    AtomCollection::new(positions, numbers)
}

fn fixed_entries(mask: &SeparationMask) -> Vec<bool> {
    mask.positions.iter()
        .zip(mask.numbers.iter())
        .flat_map(|(&position, &number)| [position, position, position, number])
        .collect()
}

/// Reason a separation result is not a converged optimisation
#[derive(Clone, Debug, PartialEq)]
pub enum ConvergenceWarning {
    /// Iteration or time budget exhausted before the separation was reached
    NotConverged {iterations: u64, cost: f64},
    /// The optimiser made things worse, so the input geometry is returned
    Reverted {reason: String},
}

impl fmt::Display for ConvergenceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvergenceWarning::NotConverged {iterations, cost} => {
                write!(f, "separation not reached after {} iterations, residual cost {:e}", iterations, cost)
            },
            ConvergenceWarning::Reverted {reason} => {
                write!(f, "returning initial geometry: {}", reason)
            }
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum SeparationError {
    #[error("Mask covers {mask} atoms, collection has {atoms}")]
    MaskMismatch {atoms: usize, mask: usize},
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Optimise(#[from] OptimiseError),
    #[error(transparent)]
    Atoms(#[from] AtomsError),
}

/// Outcome of a separation optimisation
#[derive(Clone, Debug)]
pub struct Separation {
    pub atoms: AtomCollection,
    pub iterations: u64,
    /// Residual least-squares cost of `atoms`
    pub cost: f64,
    pub initial_min_separation: Option<f64>,
    pub min_separation: Option<f64>,
    pub warning: Option<ConvergenceWarning>,
}

impl Separation {
    pub fn converged(&self) -> bool {
        self.warning.is_none()
    }

    fn reverted(initial: &AtomCollection, cost: f64, iterations: u64, reason: String) -> Separation {
        let warning = ConvergenceWarning::Reverted {reason};
        log::warn!("{}", warning);
        let min_separation = initial.min_separation();
        Separation {
            atoms: initial.clone(),
            iterations,
            cost,
            initial_min_separation: min_separation,
            min_separation,
            warning: Some(warning),
        }
    }
}

/// Why an optimised geometry is worse than its input, if it is
fn rejection(initial: &AtomCollection, optimised: &AtomCollection) -> Option<String> {
    if !optimised.positions().iter().all(|x| x.is_finite()) {
        return Some("non-finite positions".into());
    }

    match (initial.min_separation(), optimised.min_separation()) {
        (Some(before), Some(after)) if after < before => {
            Some(format!("minimum separation shrank from {:.4} to {:.4}", before, after))
        },
        _ => None
    }
}

/// Spreads atoms apart until no pair is closer than a minimum separation
#[derive(Clone, Debug)]
pub struct SeparationOptimiser {
    force: SeparationForce,
    minimiser: LeastSquaresOptimiser,
}

impl SeparationOptimiser {
    pub fn new(settings: &SeparationSettings) -> Result<SeparationOptimiser, ConfigurationError> {
        settings.validate()?;

        let force = SeparationForce {
            epsilon: settings.epsilon,
            cutoff: settings.min_separation,
            power: settings.power,
        };
        let minimiser = LeastSquaresOptimiser {
            max_iters: settings.max_iters,
            target_cost: settings.target_cost,
            tolerance_grad: settings.tolerance_grad,
            timeout: settings.timeout_seconds.map(Duration::from_secs_f64),
            ..Default::default()
        };

        Ok(SeparationOptimiser {force, minimiser})
    }

    pub fn force(&self) -> &SeparationForce {
        &self.force
    }

    /// Optimise a copy of `initial`, moving only what `mask` leaves free
    ///
    /// Failure to converge is reported through the result's warning, never as
    /// an error. The result never has a smaller minimum separation than the input.
    pub fn optimise(&self, initial: &AtomCollection, mask: &SeparationMask) -> Result<Separation, SeparationError> {
        if !mask.is_consistent_with(initial) {
            return Err(SeparationError::MaskMismatch {atoms: initial.len(), mask: mask.len()});
        }

        let problem = SeparationProblem::new(self.force.clone());
        let initial_min_separation = initial.min_separation();
        let params = pack(initial);
        let initial_cost = problem.error(&params);

        let minimum = match self.minimiser.minimize(&problem, params, &fixed_entries(mask)) {
            Ok(minimum) => minimum,
            Err(OptimiseError::Solver(reason)) => {
                return Ok(Separation::reverted(initial, initial_cost, 0, reason));
            },
            Err(e) => return Err(e.into())
        };

        let atoms = unpack(minimum.params)?;
        if let Some(reason) = rejection(initial, &atoms) {
            return Ok(Separation::reverted(initial, initial_cost, minimum.iterations, reason));
        }

        let min_separation = atoms.min_separation();

        let warning = (!minimum.converged).then(|| {
            let warning = ConvergenceWarning::NotConverged {iterations: minimum.iterations, cost: minimum.cost};
            log::warn!("{}", warning);
            warning
        });

        log::debug!(
            "Separated {} atoms in {} iterations, minimum separation {:?} -> {:?}",
            atoms.len(), minimum.iterations, initial_min_separation, min_separation
        );

        Ok(Separation {
            atoms,
            iterations: minimum.iterations,
            cost: minimum.cost,
            initial_min_separation,
            min_separation,
            warning,
        })
    }
}

/// Separate atoms with otherwise default solver settings
pub fn optimise(initial: &AtomCollection, min_separation: f64, epsilon: f64, power: i32, mask: &SeparationMask) -> Result<Separation, SeparationError> {
    let settings = SeparationSettings {min_separation, epsilon, power, ..Default::default()};
    SeparationOptimiser::new(&settings)?.optimise(initial, mask)
}

/// Random starting geometry of `num_atoms` hydrogen-like atoms spread to the minimum separation
///
/// Atoms start uniformly within a centred ball of `max_radius`. If `species`
/// is given, each atom's species is afterwards drawn from it with replacement.
pub fn create_initial_atoms<R: Rng + ?Sized>(
    rng: &mut R,
    num_atoms: usize,
    max_radius: f64,
    settings: &SeparationSettings,
    species: Option<&[u32]>
) -> Result<Separation, SeparationError> {
    let optimiser = SeparationOptimiser::new(settings)?;
    let initial = random_atoms_in_sphere(rng, num_atoms, max_radius, true, 1.0);
    let mut separation = optimiser.optimise(&initial, &initial.separation_mask())?;

    if let Some(species) = species {
        if species.is_empty() {
            return Err(ConfigurationError::EmptySpeciesMap.into());
        }

        let numbers = (0..num_atoms)
            .filter_map(|_| species.choose(rng).map(|&z| z as f64))
            .collect();
        separation.atoms.set_numbers(numbers)?;
    }

    Ok(separation)
}
