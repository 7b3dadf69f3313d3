extern crate nalgebra as na;

use argmin::core::{CostFunction, Error, Executor, Gradient, State, TerminationReason};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use tracing::debug;

use super::{AffineBlock, LmiProblem, LmiSolver, Solution, SolveStatus};

/// Tuning of the built-in margin backend.
#[derive(Debug, Clone, PartialEq)]
pub struct MarginSettings {
    /// Soft-minimum sharpness of each stage, relative to the scale of the
    /// constraint data. Every stage starts from the previous stage's minimizer.
    pub sharpness: Vec<f64>,
    /// L-BFGS iterations allowed per stage.
    pub max_iterations: u64,
    /// Number of correction pairs kept by L-BFGS.
    pub memory: usize,
    /// Smallest eigenvalue, relative to the data scale, accepted as strictly
    /// positive.
    pub feasibility_tolerance: f64,
    /// Bound on the magnitude of every scalar decision variable.
    pub variable_bound: f64,
}

impl Default for MarginSettings {
    fn default() -> Self {
        Self {
            sharpness: vec![1e1, 1e2, 1e3, 1e4, 1e5],
            max_iterations: 500,
            memory: 7,
            feasibility_tolerance: 1e-9,
            variable_bound: 1e4,
        }
    }
}

/// Finds a strictly feasible point by maximizing the smallest eigenvalue of
/// the homogenized system
///
/// ```text
/// tau*G0 + sum_k x_k*G_k >= 0   for every constraint
/// tau*R - x_k >= 0,  tau*R + x_k >= 0,  tau >= 0
/// ```
///
/// over `z = (tau, x)`. The smallest eigenvalue is replaced by a log-sum-exp
/// soft minimum and regularized with `|z|^2 / 2`, which makes the objective
/// smooth and strictly convex; argmin's L-BFGS minimizes it for a rising
/// sharpness. A positive margin at the end certifies `x / tau` as strictly
/// feasible with `|x_k / tau| < R`.
#[derive(Debug, Clone, Default)]
pub struct MarginSolver {
    settings: MarginSettings,
}

impl MarginSolver {
    pub fn new(settings: MarginSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &MarginSettings {
        &self.settings
    }
}

impl LmiSolver for MarginSolver {
    fn solve(&self, problem: &LmiProblem) -> Solution {
        let bound = self.settings.variable_bound;
        let blocks = problem.affine_blocks();
        let finite = blocks.iter().all(|block| {
            block.constant.iter().all(|v| v.is_finite())
                && block.coefficients.iter().flatten().all(|v| v.is_finite())
        });
        if !finite || !(bound.is_finite() && bound > 0.0) {
            debug!(bound, "LMI data is not finite");
            return Solution::failed(SolveStatus::Error);
        }

        let scale = match blocks
            .iter()
            .flat_map(|block| &block.coefficients)
            .map(|coefficient| coefficient.norm_squared())
            .sum::<f64>()
        {
            s if s > 0.0 => s,
            _ => 1.0,
        };

        let mut z = vec![0.0; problem.scalar_count() + 1];
        let mut exhausted = false;
        for &sharpness in &self.settings.sharpness {
            let cost = Margin {
                blocks: &blocks,
                bound,
                beta: sharpness / scale,
            };
            let solver: LBFGS<_, Vec<f64>, Vec<f64>, f64> =
                LBFGS::new(MoreThuenteLineSearch::new(), self.settings.memory);
            let start = z.clone();
            let max_iterations = self.settings.max_iterations;
            let mut result = match Executor::new(cost, solver)
                .configure(|state| state.param(start).max_iters(max_iterations))
                .run()
            {
                Ok(result) => result,
                Err(err) => {
                    debug!(sharpness, %err, "margin stage stopped early");
                    break;
                }
            };
            exhausted = matches!(
                result.state.get_termination_reason(),
                Some(TerminationReason::MaxItersReached)
            );
            debug!(
                sharpness,
                iterations = result.state.get_iter(),
                cost = result.state.get_best_cost(),
                exhausted,
                "margin stage finished"
            );
            if let Some(best) = result.state.take_best_param() {
                z = best;
            }
        }

        let margin = Margin {
            blocks: &blocks,
            bound,
            beta: 1.0,
        }
        .smallest_eigenvalue(&z);
        debug!(margin, scale, "LMI margin");

        if margin > self.settings.feasibility_tolerance * scale {
            let tau = z[0];
            let x: Vec<f64> = z[1..].iter().map(|v| v / tau).collect();
            match problem.assemble(&x) {
                Ok(values) => Solution::feasible(values),
                Err(_) => Solution::failed(SolveStatus::Error),
            }
        } else if exhausted {
            Solution::failed(SolveStatus::Inaccurate)
        } else {
            Solution::failed(SolveStatus::Infeasible)
        }
    }
}

/// Regularized soft-min objective over `z = (tau, x)`.
struct Margin<'a> {
    blocks: &'a [AffineBlock],
    bound: f64,
    beta: f64,
}

impl Margin<'_> {
    fn decompose(&self, z: &[f64]) -> Vec<na::SymmetricEigen<f64, na::Dyn>> {
        self.blocks
            .iter()
            .map(|block| block.homogeneous(z[0], &z[1..]).symmetric_eigen())
            .collect()
    }

    /// Eigenvalues of the constraint blocks followed by `tau` and the bound
    /// pairs `tau*R - x_k`, `tau*R + x_k`.
    fn eigenvalues(&self, z: &[f64], eigens: &[na::SymmetricEigen<f64, na::Dyn>]) -> Vec<f64> {
        let tau = z[0];
        let mut values: Vec<f64> = eigens
            .iter()
            .flat_map(|eigen| eigen.eigenvalues.iter().copied())
            .collect();
        values.push(tau);
        for &x in &z[1..] {
            values.push(self.bound * tau - x);
            values.push(self.bound * tau + x);
        }
        values
    }

    fn smallest_eigenvalue(&self, z: &[f64]) -> f64 {
        let eigens = self.decompose(z);
        self.eigenvalues(z, &eigens)
            .into_iter()
            .fold(f64::INFINITY, f64::min)
    }

    /// Soft-min weights `exp(-beta*(l_i - l_min))` normalized to sum one,
    /// together with `l_min` and the unnormalized sum.
    fn weights(&self, values: &[f64]) -> (Vec<f64>, f64, f64) {
        let smallest = values.iter().copied().fold(f64::INFINITY, f64::min);
        let mut weights: Vec<f64> = values
            .iter()
            .map(|v| (-self.beta * (v - smallest)).exp())
            .collect();
        let total: f64 = weights.iter().sum();
        weights.iter_mut().for_each(|w| *w /= total);
        (weights, smallest, total)
    }
}

impl CostFunction for Margin<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, z: &Vec<f64>) -> Result<f64, Error> {
        let eigens = self.decompose(z);
        let values = self.eigenvalues(z, &eigens);
        let (_, smallest, total) = self.weights(&values);
        let regularization = 0.5 * z.iter().map(|v| v * v).sum::<f64>();
        Ok(-smallest + total.ln() / self.beta + regularization)
    }
}

impl Gradient for Margin<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, z: &Vec<f64>) -> Result<Vec<f64>, Error> {
        let eigens = self.decompose(z);
        let values = self.eigenvalues(z, &eigens);
        let (weights, _, _) = self.weights(&values);
        let mut weights = weights.into_iter();
        let mut gradient = z.clone();

        // d(lambda_i)/dz_k = v_i^T * dG/dz_k * v_i
        for (block, eigen) in self.blocks.iter().zip(&eigens) {
            for (i, w) in weights.by_ref().take(eigen.eigenvalues.len()).enumerate() {
                let v = eigen.eigenvectors.column(i).into_owned();
                gradient[0] -= w * v.dot(&(&block.constant * &v));
                for (k, coefficient) in block.coefficients.iter().enumerate() {
                    gradient[k + 1] -= w * v.dot(&(coefficient * &v));
                }
            }
        }
        if let Some(w) = weights.next() {
            gradient[0] -= w;
        }
        for k in 1..z.len() {
            let (upper, lower) = (weights.next().unwrap_or(0.0), weights.next().unwrap_or(0.0));
            gradient[0] -= (upper + lower) * self.bound;
            gradient[k] += upper - lower;
        }
        Ok(gradient)
    }
}
