//! Solver-agnostic description of linear matrix inequality (LMI) feasibility
//! problems.
//!
//! A problem owns a list of matrix decision variables (symmetric or full) and
//! a list of constraints of the form
//!
//! ```text
//! F0 + sum_i L_i * V_i * R_i   >= 0   (or <= 0)
//! ```
//!
//! where every `V_i` may appear transposed. Backends implement [`LmiSolver`];
//! the built-in [`MarginSolver`] runs argmin's L-BFGS on the flattened form.

extern crate nalgebra as na;

mod margin;

pub use margin::{MarginSettings, MarginSolver};

use crate::error::{DimensionError, LmiError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariableId(usize);

impl VariableId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableShape {
    Symmetric(usize),
    Full(usize, usize),
}

impl VariableShape {
    pub fn shape(&self) -> (usize, usize) {
        match *self {
            VariableShape::Symmetric(n) => (n, n),
            VariableShape::Full(rows, cols) => (rows, cols),
        }
    }

    /// Number of free scalars in the variable.
    pub fn scalar_count(&self) -> usize {
        match *self {
            VariableShape::Symmetric(n) => n * (n + 1) / 2,
            VariableShape::Full(rows, cols) => rows * cols,
        }
    }

    /// Unit matrices spanning the variable, one per free scalar.
    fn basis(&self) -> Vec<na::DMatrix<f64>> {
        let (rows, cols) = self.shape();
        let mut basis = Vec::with_capacity(self.scalar_count());
        match *self {
            VariableShape::Symmetric(n) => {
                for j in 0..n {
                    for i in 0..=j {
                        let mut e = na::DMatrix::zeros(n, n);
                        e[(i, j)] = 1.0;
                        e[(j, i)] = 1.0;
                        basis.push(e);
                    }
                }
            }
            VariableShape::Full(..) => {
                for j in 0..cols {
                    for i in 0..rows {
                        let mut e = na::DMatrix::zeros(rows, cols);
                        e[(i, j)] = 1.0;
                        basis.push(e);
                    }
                }
            }
        }
        basis
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    PositiveSemidefinite,
    NegativeSemidefinite,
}

/// `left * V * right`, or `left * V^T * right` when `transposed` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct LmiTerm {
    pub left: na::DMatrix<f64>,
    pub variable: VariableId,
    pub transposed: bool,
    pub right: na::DMatrix<f64>,
}

impl LmiTerm {
    pub fn new(left: na::DMatrix<f64>, variable: VariableId, right: na::DMatrix<f64>) -> Self {
        Self {
            left,
            variable,
            transposed: false,
            right,
        }
    }

    pub fn transposed(
        left: na::DMatrix<f64>,
        variable: VariableId,
        right: na::DMatrix<f64>,
    ) -> Self {
        Self {
            left,
            variable,
            transposed: true,
            right,
        }
    }

    /// Shape the variable must have for this term, after any transpose.
    fn operand_shape(&self) -> (usize, usize) {
        (self.left.ncols(), self.right.nrows())
    }

    fn apply(&self, value: &na::DMatrix<f64>) -> na::DMatrix<f64> {
        if self.transposed {
            &self.left * value.transpose() * &self.right
        } else {
            &self.left * value * &self.right
        }
    }
}

/// One matrix inequality. The caller is responsible for supplying terms whose
/// sum is symmetric (e.g. adding both `X` and `X^T` for off-diagonal blocks).
#[derive(Debug, Clone, PartialEq)]
pub struct LmiConstraint {
    constant: na::DMatrix<f64>,
    terms: Vec<LmiTerm>,
    sense: Sense,
}

impl LmiConstraint {
    pub fn psd(constant: na::DMatrix<f64>) -> Self {
        Self {
            constant,
            terms: Vec::new(),
            sense: Sense::PositiveSemidefinite,
        }
    }

    pub fn nsd(constant: na::DMatrix<f64>) -> Self {
        Self {
            constant,
            terms: Vec::new(),
            sense: Sense::NegativeSemidefinite,
        }
    }

    pub fn with_term(mut self, term: LmiTerm) -> Self {
        self.terms.push(term);
        self
    }

    pub fn dim(&self) -> usize {
        self.constant.nrows()
    }

    pub fn sense(&self) -> Sense {
        self.sense
    }

    pub fn terms(&self) -> &[LmiTerm] {
        &self.terms
    }

    /// Value of the constraint matrix for the given variable values, indexed
    /// by [`VariableId::index`].
    pub fn evaluate(&self, values: &[na::DMatrix<f64>]) -> Result<na::DMatrix<f64>, LmiError> {
        let mut total = self.constant.clone();
        for (index, term) in self.terms.iter().enumerate() {
            let value = values
                .get(term.variable.0)
                .ok_or(LmiError::UnknownVariable(term.variable.0))?;
            let found = if term.transposed {
                (value.ncols(), value.nrows())
            } else {
                value.shape()
            };
            DimensionError::check("variable value", term.operand_shape(), found)
                .map_err(|source| LmiError::TermShape { index, source })?;
            let product = term.apply(value);
            DimensionError::check("term", total.shape(), product.shape())
                .map_err(|source| LmiError::TermShape { index, source })?;
            total += product;
        }
        Ok(total)
    }
}

/// Affine symmetric matrix function `G0 + sum_k x_k G_k`, oriented so that the
/// constraint reads `G(x) >= 0`. There is one coefficient per problem scalar.
#[derive(Debug, Clone)]
pub(crate) struct AffineBlock {
    pub(crate) constant: na::DMatrix<f64>,
    pub(crate) coefficients: Vec<na::DMatrix<f64>>,
}

impl AffineBlock {
    /// `tau*G0 + sum_k x_k G_k`; `x` holds one value per coefficient.
    pub(crate) fn homogeneous(&self, tau: f64, x: &[f64]) -> na::DMatrix<f64> {
        debug_assert_eq!(x.len(), self.coefficients.len());
        let mut total = &self.constant * tau;
        for (coefficient, &value) in self.coefficients.iter().zip(x) {
            if value != 0.0 {
                total += coefficient * value;
            }
        }
        total
    }
}

#[derive(Debug, Clone, Default)]
pub struct LmiProblem {
    variables: Vec<VariableShape>,
    constraints: Vec<LmiConstraint>,
}

impl LmiProblem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_symmetric(&mut self, n: usize) -> VariableId {
        self.variables.push(VariableShape::Symmetric(n));
        VariableId(self.variables.len() - 1)
    }

    pub fn add_full(&mut self, rows: usize, cols: usize) -> VariableId {
        self.variables.push(VariableShape::Full(rows, cols));
        VariableId(self.variables.len() - 1)
    }

    /// Adds a constraint after checking every term fits the constant's shape.
    pub fn add_constraint(&mut self, constraint: LmiConstraint) -> Result<(), LmiError> {
        let (rows, cols) = constraint.constant.shape();
        if rows != cols {
            return Err(LmiError::NonSquareConstraint { rows, cols });
        }
        for (index, term) in constraint.terms.iter().enumerate() {
            let shape = self
                .variables
                .get(term.variable.0)
                .ok_or(LmiError::UnknownVariable(term.variable.0))?
                .shape();
            let (var_rows, var_cols) = if term.transposed {
                (shape.1, shape.0)
            } else {
                shape
            };
            let term_shape = |source| LmiError::TermShape { index, source };
            DimensionError::check("term left factor", (rows, var_rows), term.left.shape())
                .map_err(term_shape)?;
            DimensionError::check("term right factor", (var_cols, rows), term.right.shape())
                .map_err(term_shape)?;
        }
        self.constraints.push(constraint);
        Ok(())
    }

    pub fn variables(&self) -> &[VariableShape] {
        &self.variables
    }

    pub fn constraints(&self) -> &[LmiConstraint] {
        &self.constraints
    }

    /// Total number of free scalars over all variables.
    pub fn scalar_count(&self) -> usize {
        self.variables.iter().map(VariableShape::scalar_count).sum()
    }

    /// Rebuilds the variable matrices from a flat scalar vector laid out in
    /// the same order as [`LmiProblem::affine_blocks`].
    pub(crate) fn assemble(&self, x: &[f64]) -> Result<Vec<na::DMatrix<f64>>, LmiError> {
        let expected = self.scalar_count();
        if x.len() != expected {
            return Err(LmiError::ScalarCount {
                expected,
                found: x.len(),
            });
        }
        let mut scalars = x.iter();
        Ok(self
            .variables
            .iter()
            .map(|variable| {
                let (rows, cols) = variable.shape();
                let mut value = na::DMatrix::zeros(rows, cols);
                for (unit, &scalar) in variable.basis().into_iter().zip(scalars.by_ref()) {
                    value += unit * scalar;
                }
                value
            })
            .collect())
    }

    /// Flattens every constraint into an affine function of the scalar
    /// decision vector. Only the symmetric part of each matrix is kept.
    pub(crate) fn affine_blocks(&self) -> Vec<AffineBlock> {
        let bases: Vec<_> = self.variables.iter().map(VariableShape::basis).collect();
        self.constraints
            .iter()
            .map(|constraint| {
                let sign = match constraint.sense {
                    Sense::PositiveSemidefinite => 1.0,
                    Sense::NegativeSemidefinite => -1.0,
                };
                let dim = constraint.dim();
                let mut coefficients = Vec::with_capacity(self.scalar_count());
                for (var_index, basis) in bases.iter().enumerate() {
                    for unit in basis {
                        let mut coefficient = na::DMatrix::zeros(dim, dim);
                        for term in constraint.terms.iter().filter(|t| t.variable.0 == var_index) {
                            coefficient += term.apply(unit);
                        }
                        coefficients.push(symmetric_part(&coefficient) * sign);
                    }
                }
                AffineBlock {
                    constant: symmetric_part(&constraint.constant) * sign,
                    coefficients,
                }
            })
            .collect()
    }
}

fn symmetric_part(m: &na::DMatrix<f64>) -> na::DMatrix<f64> {
    (m + m.transpose()) * 0.5
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// A feasible point was found.
    Optimal,
    Infeasible,
    /// The solver stopped without a conclusive answer.
    Inaccurate,
    Error,
}

#[derive(Debug, Clone)]
pub struct Solution {
    status: SolveStatus,
    values: Vec<na::DMatrix<f64>>,
}

impl Solution {
    pub fn feasible(values: Vec<na::DMatrix<f64>>) -> Self {
        Self {
            status: SolveStatus::Optimal,
            values,
        }
    }

    pub fn failed(status: SolveStatus) -> Self {
        Self {
            status,
            values: Vec::new(),
        }
    }

    pub fn status(&self) -> SolveStatus {
        self.status
    }

    pub fn value(&self, variable: VariableId) -> Option<&na::DMatrix<f64>> {
        self.values.get(variable.0)
    }
}

/// Capability needed from a semidefinite programming backend.
pub trait LmiSolver {
    fn solve(&self, problem: &LmiProblem) -> Solution;
}

impl<S: LmiSolver + ?Sized> LmiSolver for &S {
    fn solve(&self, problem: &LmiProblem) -> Solution {
        (**self).solve(problem)
    }
}

impl<S: LmiSolver + ?Sized> LmiSolver for Box<S> {
    fn solve(&self, problem: &LmiProblem) -> Solution {
        (**self).solve(problem)
    }
}
