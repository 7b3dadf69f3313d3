//! Observer gain synthesis as an LMI feasibility problem.
//!
//! The closed-loop decrease condition
//!
//! ```text
//! (A - L*C)^T * P * (A - L*C) - P <= -gamma*I
//! ```
//!
//! is bilinear in `P` and `L`. With the substitution `Y = P*L` and a Schur
//! complement it becomes the affine inequality
//!
//! ```text
//! [ P - gamma*I     (P*A - Y*C)^T ]
//! [ P*A - Y*C       P - gamma*I   ]  >= 0
//! ```
//!
//! which implies the condition above, so `A - L*C` is Schur-stable with
//! Lyapunov certificate `P`. The gain is recovered as `L = P^-1 * Y`; note
//! that `Y * P^-1` is only defined when there are as many outputs as states.

extern crate nalgebra as na;

use tracing::{debug, warn};

use crate::error::{DimensionError, SynthesisError};
use crate::linsystheory::spectral_radius;
use crate::lmi::{LmiConstraint, LmiProblem, LmiSolver, LmiTerm, MarginSolver, SolveStatus, VariableId};

/// Default margin on the certificate and on the Lyapunov decrease.
pub const DEFAULT_GAMMA: f64 = 1e-3;

/// Result of a successful synthesis.
#[derive(Debug, Clone, PartialEq)]
pub struct ObserverGain {
    /// L (n x p), such that A - L*C is Schur-stable.
    pub gain: na::DMatrix<f64>,
    /// Lyapunov certificate P (n x n), symmetric with P >= gamma*I.
    pub certificate: na::DMatrix<f64>,
}

#[derive(Debug, Clone)]
pub struct GainSynthesizer<S = MarginSolver> {
    solver: S,
    gamma: f64,
}

impl Default for GainSynthesizer<MarginSolver> {
    fn default() -> Self {
        Self::new(MarginSolver::default())
    }
}

impl<S: LmiSolver> GainSynthesizer<S> {
    pub fn new(solver: S) -> Self {
        Self {
            solver,
            gamma: DEFAULT_GAMMA,
        }
    }

    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn synthesize(
        &self,
        a_matrix: &na::DMatrix<f64>,
        c_matrix: &na::DMatrix<f64>,
    ) -> Result<ObserverGain, SynthesisError> {
        let (problem, p_var, y_var) = self.formulate(a_matrix, c_matrix)?;

        let solution = self.solver.solve(&problem);
        let status = solution.status();
        if status != SolveStatus::Optimal {
            warn!(?status, gamma = self.gamma, "observer gain LMI not solved");
            return Err(SynthesisError::Convergence { status });
        }

        let (Some(certificate), Some(y_value)) = (solution.value(p_var), solution.value(y_var))
        else {
            warn!("solver reported success without variable values");
            return Err(SynthesisError::Convergence {
                status: SolveStatus::Error,
            });
        };

        let gain = certificate
            .clone()
            .cholesky()
            .map(|cholesky| cholesky.solve(y_value))
            .ok_or(SynthesisError::Convergence {
                status: SolveStatus::Inaccurate,
            })?;

        if tracing::enabled!(tracing::Level::DEBUG) {
            let radius = spectral_radius(&(a_matrix - &gain * c_matrix))?;
            debug!(spectral_radius = radius, %gain, "observer gain synthesized");
        }

        Ok(ObserverGain {
            gain,
            certificate: certificate.clone(),
        })
    }

    /// Builds the feasibility problem; returns it with the ids of P and Y.
    fn formulate(
        &self,
        a_matrix: &na::DMatrix<f64>,
        c_matrix: &na::DMatrix<f64>,
    ) -> Result<(LmiProblem, VariableId, VariableId), SynthesisError> {
        let n = a_matrix.nrows();
        let p = c_matrix.nrows();
        DimensionError::check("A", (n, n), a_matrix.shape())?;
        DimensionError::check("C", (p, n), c_matrix.shape())?;
        if !(self.gamma.is_finite() && self.gamma > 0.0) {
            return Err(SynthesisError::InvalidTolerance(self.gamma));
        }

        let mut problem = LmiProblem::new();
        let p_var = problem.add_symmetric(n);
        let y_var = problem.add_full(n, p);

        let eye = na::DMatrix::<f64>::identity(n, n);
        problem.add_constraint(
            LmiConstraint::psd(-&eye * self.gamma)
                .with_term(LmiTerm::new(eye.clone(), p_var, eye.clone())),
        )?;

        // Embeddings of the two block rows/columns.
        let mut upper = na::DMatrix::<f64>::zeros(2 * n, n);
        upper.view_mut((0, 0), (n, n)).copy_from(&eye);
        let mut lower = na::DMatrix::<f64>::zeros(2 * n, n);
        lower.view_mut((n, 0), (n, n)).copy_from(&eye);

        let decrease = LmiConstraint::psd(na::DMatrix::<f64>::identity(2 * n, 2 * n) * -self.gamma)
            .with_term(LmiTerm::new(upper.clone(), p_var, upper.transpose()))
            .with_term(LmiTerm::new(lower.clone(), p_var, lower.transpose()))
            // P*A - Y*C below the diagonal
            .with_term(LmiTerm::new(lower.clone(), p_var, a_matrix * upper.transpose()))
            .with_term(LmiTerm::new(-&lower, y_var, c_matrix * upper.transpose()))
            // and its transpose above
            .with_term(LmiTerm::new(&upper * a_matrix.transpose(), p_var, lower.transpose()))
            .with_term(LmiTerm::transposed(
                -&upper * c_matrix.transpose(),
                y_var,
                lower.transpose(),
            ));
        problem.add_constraint(decrease)?;

        Ok((problem, p_var, y_var))
    }
}

/// Synthesizes L for the pair (A, C) with the built-in solver.
pub fn synthesize_observer_gain(
    a_matrix: &na::DMatrix<f64>,
    c_matrix: &na::DMatrix<f64>,
    gamma: f64,
) -> Result<na::DMatrix<f64>, SynthesisError> {
    GainSynthesizer::<MarginSolver>::default()
        .with_gamma(gamma)
        .synthesize(a_matrix, c_matrix)
        .map(|result| result.gain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linsystheory::is_stable;
    use crate::lmi::{MarginSettings, Solution};
    use std::cell::Cell;

    fn double_integrator() -> (na::DMatrix<f64>, na::DMatrix<f64>) {
        (
            na::DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 0.0, 1.0]),
            na::DMatrix::from_row_slice(1, 2, &[1.0, 0.0]),
        )
    }

    /// Returns a canned answer and counts calls.
    struct MockSolver {
        status: SolveStatus,
        values: Vec<na::DMatrix<f64>>,
        calls: Cell<usize>,
    }

    impl MockSolver {
        fn failing(status: SolveStatus) -> Self {
            Self {
                status,
                values: Vec::new(),
                calls: Cell::new(0),
            }
        }
    }

    impl LmiSolver for MockSolver {
        fn solve(&self, problem: &LmiProblem) -> Solution {
            self.calls.set(self.calls.get() + 1);
            assert_eq!(problem.constraints().len(), 2);
            match self.status {
                SolveStatus::Optimal => Solution::feasible(self.values.clone()),
                status => Solution::failed(status),
            }
        }
    }

    #[test]
    fn double_integrator_gain_is_stabilizing() {
        let (a, c) = double_integrator();
        let result = GainSynthesizer::<MarginSolver>::default().synthesize(&a, &c).unwrap();

        assert_eq!(result.gain.shape(), (2, 1));
        assert_eq!(is_stable(&(&a - &result.gain * &c)), Ok(true));
        assert!(spectral_radius(&(&a - &result.gain * &c)).unwrap() < 1.0);
    }

    #[test]
    fn certificate_satisfies_both_inequalities() {
        let (a, c) = double_integrator();
        let gamma = DEFAULT_GAMMA;
        let result = GainSynthesizer::<MarginSolver>::default()
            .with_gamma(gamma)
            .synthesize(&a, &c)
            .unwrap();
        let p = &result.certificate;

        approx::assert_relative_eq!(p.clone(), p.transpose(), epsilon = 1e-12);
        let eye = na::DMatrix::<f64>::identity(2, 2);
        let margin = (p - &eye * gamma).symmetric_eigenvalues().min();
        assert!(margin >= -1e-9, "P - gamma*I has eigenvalue {margin}");

        let a_cl = &a - &result.gain * &c;
        let decrease = a_cl.transpose() * p * &a_cl - p + &eye * gamma;
        let worst = decrease.symmetric_eigenvalues().max();
        let tolerance = 1e-9 * p.norm().max(1.0);
        assert!(worst <= tolerance, "Lyapunov decrease violated by {worst}");
    }

    #[test]
    fn full_state_measurement() {
        let a = na::DMatrix::from_row_slice(3, 3, &[1.1, 0.2, 0.0, 0.0, 0.9, 0.5, 0.3, 0.0, 1.4]);
        let c = na::DMatrix::<f64>::identity(3, 3);
        let gain = synthesize_observer_gain(&a, &c, DEFAULT_GAMMA).unwrap();
        assert_eq!(is_stable(&(&a - &gain * &c)), Ok(true));
    }

    #[test]
    fn undetectable_pair_fails_to_converge() {
        let a = na::DMatrix::from_row_slice(2, 2, &[1.2, 0.0, 0.0, 1.2]);
        let c = na::DMatrix::from_row_slice(1, 2, &[0.0, 1.0]);
        let err = synthesize_observer_gain(&a, &c, DEFAULT_GAMMA).unwrap_err();
        assert!(matches!(err, SynthesisError::Convergence { .. }), "{err}");
    }

    #[test]
    fn oversized_gamma_fails_to_converge() {
        let (a, c) = double_integrator();
        let err = synthesize_observer_gain(&a, &c, 1.0e6).unwrap_err();
        assert_eq!(
            err,
            SynthesisError::Convergence {
                status: SolveStatus::Infeasible
            }
        );
    }

    #[test]
    fn rejects_invalid_input() {
        let (a, _) = double_integrator();
        let c = na::DMatrix::from_row_slice(1, 3, &[1.0, 0.0, 0.0]);
        assert!(matches!(
            synthesize_observer_gain(&a, &c, DEFAULT_GAMMA),
            Err(SynthesisError::Dimension(_))
        ));

        let (a, c) = double_integrator();
        for gamma in [0.0, -1.0, f64::NAN] {
            assert!(matches!(
                synthesize_observer_gain(&a, &c, gamma),
                Err(SynthesisError::InvalidTolerance(_))
            ));
        }
    }

    #[test]
    fn non_optimal_status_is_an_error() {
        let (a, c) = double_integrator();
        for status in [
            SolveStatus::Infeasible,
            SolveStatus::Inaccurate,
            SolveStatus::Error,
        ] {
            let synthesizer = GainSynthesizer::new(MockSolver::failing(status));
            assert_eq!(
                synthesizer.synthesize(&a, &c),
                Err(SynthesisError::Convergence { status })
            );
            assert_eq!(synthesizer.solver().calls.get(), 1);
        }
    }

    #[test]
    fn gain_is_recovered_from_certificate() {
        let (a, c) = double_integrator();
        let p = na::DMatrix::from_row_slice(2, 2, &[2.0, 0.5, 0.5, 1.0]);
        let y = na::DMatrix::from_column_slice(2, 1, &[3.0, 1.0]);
        let solver = MockSolver {
            status: SolveStatus::Optimal,
            values: vec![p.clone(), y.clone()],
            calls: Cell::new(0),
        };

        let result = GainSynthesizer::new(solver).synthesize(&a, &c).unwrap();
        approx::assert_relative_eq!(&p * &result.gain, y, epsilon = 1e-12);
        assert_eq!(result.certificate, p);
    }

    #[test]
    fn singular_certificate_is_rejected() {
        let (a, c) = double_integrator();
        let solver = MockSolver {
            status: SolveStatus::Optimal,
            values: vec![na::DMatrix::zeros(2, 2), na::DMatrix::zeros(2, 1)],
            calls: Cell::new(0),
        };
        assert_eq!(
            GainSynthesizer::new(solver).synthesize(&a, &c),
            Err(SynthesisError::Convergence {
                status: SolveStatus::Inaccurate
            })
        );
    }

    #[test]
    fn iteration_cap_reports_inaccurate() {
        let (a, c) = double_integrator();
        let solver = MarginSolver::new(MarginSettings {
            sharpness: vec![10.0],
            max_iterations: 1,
            ..MarginSettings::default()
        });
        assert_eq!(
            GainSynthesizer::new(solver).synthesize(&a, &c),
            Err(SynthesisError::Convergence {
                status: SolveStatus::Inaccurate
            })
        );
    }

    #[test]
    fn non_finite_plant_reports_solver_error() {
        let (mut a, c) = double_integrator();
        a[(0, 1)] = f64::NAN;
        assert_eq!(
            synthesize_observer_gain(&a, &c, DEFAULT_GAMMA),
            Err(SynthesisError::Convergence {
                status: SolveStatus::Error
            })
        );

        let (mut a, c) = double_integrator();
        a[(1, 1)] = f64::INFINITY;
        assert_eq!(
            synthesize_observer_gain(&a, &c, DEFAULT_GAMMA),
            Err(SynthesisError::Convergence {
                status: SolveStatus::Error
            })
        );
    }

    #[test]
    fn repeated_calls_are_independent() {
        let (a, c) = double_integrator();
        let synthesizer = GainSynthesizer::<MarginSolver>::default();
        let first = synthesizer.synthesize(&a, &c).unwrap();
        let second = synthesizer.synthesize(&a, &c).unwrap();
        assert_eq!(first, second);
    }
}
