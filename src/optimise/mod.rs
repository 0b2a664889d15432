use std::time::{Duration, Instant};
use thiserror::Error;
extern crate nalgebra as na;

use argmin::core::{Executor, IterState, TerminationReason, TerminationStatus};
use argmin::solver::trustregion::{Steihaug, TrustRegion};

pub mod separation;

/// Parameters per atom: three cartesian coordinates and the species value
pub const DIMENSIONS: usize = 4;

type DVector = na::DVector<f64>;
type DMatrix = na::DMatrix<f64>;

/// Sum-of-squares objective with analytic derivatives
pub trait ErrorFunction {
    fn error(&self, params: &DVector) -> f64;
    fn gradient(&self, params: &DVector) -> DVector;
    /// Gauss-Newton approximation `2 JᵀJ` of the Hessian
    fn hessian(&self, params: &DVector) -> DMatrix;
}

/// Split of a parameter vector into fixed and free entries
struct Masking {
    template: DVector,
    free: Vec<usize>,
}

impl Masking {
    fn new(template: DVector, fixed: &[bool]) -> Masking {
        let free = fixed.iter()
            .enumerate()
            .filter_map(|(i, &is_fixed)| (!is_fixed).then_some(i))
            .collect();
        Masking {template, free}
    }

    fn reduce(&self, full: &DVector) -> DVector {
        DVector::from_iterator(self.free.len(), self.free.iter().map(|&i| full[i]))
    }

    fn reduce_matrix(&self, full: &DMatrix) -> DMatrix {
        let k = self.free.len();
        DMatrix::from_fn(k, k, |a, b| full[(self.free[a], self.free[b])])
    }

    fn expand(&self, reduced: &DVector) -> DVector {
        let mut full = self.template.clone();
        for (&i, &v) in self.free.iter().zip(reduced.iter()) {
            full[i] = v;
        }
        full
    }
}

/// Error function restricted to the free parameters
struct MaskedProblem<'a> {
    function: &'a dyn ErrorFunction,
    masking: &'a Masking,
}

impl argmin::core::CostFunction for MaskedProblem<'_> {
    type Param = DVector;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        Ok(self.function.error(&self.masking.expand(param)))
    }
}

impl argmin::core::Gradient for MaskedProblem<'_> {
    type Param = DVector;
    type Gradient = DVector;

    fn gradient(&self, param: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
        let full_gradient = self.function.gradient(&self.masking.expand(param));
        Ok(self.masking.reduce(&full_gradient))
    }
}

impl argmin::core::Hessian for MaskedProblem<'_> {
    type Param = DVector;
    type Hessian = DMatrix;

    fn hessian(&self, param: &Self::Param) -> Result<Self::Hessian, argmin::core::Error> {
        let full_hessian = self.function.hessian(&self.masking.expand(param));
        Ok(self.masking.reduce_matrix(&full_hessian))
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum OptimiseError {
    #[error("{params} parameters but {mask} mask entries")]
    MaskLength {params: usize, mask: usize},
    #[error("Error function is not finite at the initial parameters")]
    NonFiniteCost,
    #[error("Solver failure: {0}")]
    Solver(String),
}

/// Best parameters found by a minimisation
#[derive(Clone, Debug)]
pub struct Minimum {
    pub params: DVector,
    pub cost: f64,
    /// Whether the target cost or the gradient tolerance was reached
    pub converged: bool,
    pub iterations: u64,
}

fn converged_state<P, G, J, H, F>(state: &IterState<P, G, J, H, F>) -> bool {
    matches!(
        &state.termination_status,
        TerminationStatus::Terminated(TerminationReason::TargetCostReached | TerminationReason::SolverConverged)
    )
}

/// Solver iterations between deadline checks
const TIMED_CHUNK_ITERS: u64 = 20;

/// Trust-region minimiser of sum-of-squares error functions with fixed entries
///
/// Steps are bounded by the trust radius, so a cost that is flat beyond the
/// solution is approached without overshooting far into the flat region.
#[derive(Clone, Debug, PartialEq)]
pub struct LeastSquaresOptimiser {
    pub max_iters: u64,
    pub target_cost: f64,
    pub tolerance_grad: f64,
    pub timeout: Option<Duration>,
}

impl Default for LeastSquaresOptimiser {
    fn default() -> LeastSquaresOptimiser {
        LeastSquaresOptimiser {
            max_iters: 1000,
            target_cost: 1e-12,
            tolerance_grad: 1e-10,
            timeout: None,
        }
    }
}

impl LeastSquaresOptimiser {
    /// Minimise `function` starting from `initial`, leaving entries flagged in `fixed` untouched
    ///
    /// Running out of iterations or time is not an error: the best parameters
    /// found are returned with `converged` unset.
    pub fn minimize(&self, function: &dyn ErrorFunction, initial: DVector, fixed: &[bool]) -> Result<Minimum, OptimiseError> {
        let start = Instant::now();
        if fixed.len() != initial.len() {
            return Err(OptimiseError::MaskLength {params: initial.len(), mask: fixed.len()});
        }

        let initial_cost = function.error(&initial);
        if !initial_cost.is_finite() {
            return Err(OptimiseError::NonFiniteCost);
        }

        let masking = Masking::new(initial.clone(), fixed);
        if initial_cost <= self.target_cost || masking.free.is_empty() {
            return Ok(Minimum {
                params: initial,
                cost: initial_cost,
                converged: initial_cost <= self.target_cost,
                iterations: 0
            });
        }

        // With a deadline the solver runs in chunks, checking the clock in between
        let chunk = match self.timeout {
            Some(_) => TIMED_CHUNK_ITERS,
            None => self.max_iters
        };
        let out_of_time = || self.timeout.map_or(false, |timeout| start.elapsed() >= timeout);

        let mut reduced = masking.reduce(&initial);
        let mut iterations = 0;
        let mut converged = false;
        while iterations < self.max_iters && !converged {
            if out_of_time() {
                log::debug!("Minimisation out of time after {} iterations", iterations);
                break;
            }

            let budget = chunk.min(self.max_iters - iterations);
            let hessian = masking.reduce_matrix(&function.hessian(&masking.expand(&reduced)));
            let problem = MaskedProblem {function, masking: &masking};
            let solver = TrustRegion::new(Steihaug::<DVector, f64>::new());

            let mut result = Executor::new(problem, solver)
                .configure(|state| state
                    .param(reduced.clone())
                    .hessian(hessian)
                    .max_iters(budget)
                    .target_cost(self.target_cost)
                )
                .run()
                .map_err(|e| OptimiseError::Solver(e.to_string()))?;

            let chunk_iters = result.state.iter;
            iterations += chunk_iters;
            converged = converged_state(&result.state);
            if let Some(best) = result.state.take_best_param() {
                reduced = best;
            }

            // Stopped early for a reason other than the budget
            if chunk_iters < budget {
                break;
            }
        }

        let params = masking.expand(&reduced);
        let cost = function.error(&params);
        // The trust region method has no gradient criterion of its own
        if !converged {
            converged = cost <= self.target_cost
                || masking.reduce(&function.gradient(&params)).norm() <= self.tolerance_grad;
        }
        log::debug!("Minimisation stopped after {} iterations at cost {:e}", iterations, cost);

        Ok(Minimum {params, cost, converged, iterations})
    }
}
