extern crate nalgebra as na;

use crate::error::{DimensionError, ObserverError};

use super::observer::Observer;

/// Default robustness gain of the discontinuous correction.
pub const DEFAULT_RHO: f64 = 0.01;

/// Discrete-time sliding-mode observer
/// x_hat(k+1) = A*x_hat + B*u + L*s + rho*E*sign(s),  s = y - C*x_hat
///
/// `E` spreads the switching term over the state: a column of ones for a
/// single output, the identity when there is one output per state.
#[derive(Debug, Clone, PartialEq)]
pub struct SlidingModeObserver {
    a_matrix: na::DMatrix<f64>,
    b_matrix: na::DMatrix<f64>,
    c_matrix: na::DMatrix<f64>,
    l_matrix: na::DMatrix<f64>,
    switching: na::DMatrix<f64>,
    rho: f64,
    x_hat: na::DVector<f64>,
}

impl SlidingModeObserver {
    pub fn new(
        a_matrix: na::DMatrix<f64>,
        b_matrix: na::DMatrix<f64>,
        c_matrix: na::DMatrix<f64>,
        l_matrix: na::DMatrix<f64>,
        rho: f64,
    ) -> Result<Self, ObserverError> {
        let nx = a_matrix.nrows();
        let nu = b_matrix.ncols();
        let ny = c_matrix.nrows();
        DimensionError::check("A", (nx, nx), a_matrix.shape())?;
        DimensionError::check("B", (nx, nu), b_matrix.shape())?;
        DimensionError::check("C", (ny, nx), c_matrix.shape())?;
        DimensionError::check("L", (nx, ny), l_matrix.shape())?;
        if !(rho.is_finite() && rho > 0.0) {
            return Err(ObserverError::InvalidRobustnessGain(rho));
        }

        let switching = if ny == nx {
            na::DMatrix::identity(nx, nx)
        } else if ny == 1 {
            na::DMatrix::from_element(nx, 1, 1.0)
        } else {
            return Err(ObserverError::SwitchingDimension {
                outputs: ny,
                states: nx,
            });
        };

        Ok(Self {
            a_matrix,
            b_matrix,
            c_matrix,
            l_matrix,
            switching,
            rho,
            x_hat: na::DVector::zeros(nx),
        })
    }

    /// Starts from `x_hat` instead of the origin. `reset` still returns to zero.
    pub fn with_initial_estimate(mut self, x_hat: na::DVector<f64>) -> Result<Self, ObserverError> {
        DimensionError::check("initial estimate", self.x_hat.shape(), x_hat.shape())?;
        self.x_hat = x_hat;
        Ok(self)
    }

    pub fn gain(&self) -> &na::DMatrix<f64> {
        &self.l_matrix
    }

    pub fn robustness_gain(&self) -> f64 {
        self.rho
    }

    pub fn estimate(&self) -> &na::DVector<f64> {
        &self.x_hat
    }

    /// Innovation y - C*x_hat for the current estimate.
    pub fn residual(&self, y: &na::DVector<f64>) -> Result<na::DVector<f64>, ObserverError> {
        DimensionError::check("output", (self.c_matrix.nrows(), 1), y.shape())?;
        Ok(y - &self.c_matrix * &self.x_hat)
    }

    /// One observer step from `x_hat`, without touching the observer state.
    pub fn update_pure(
        &self,
        x_hat: &na::DVector<f64>,
        y: &na::DVector<f64>,
        u: &na::DVector<f64>,
    ) -> Result<na::DVector<f64>, ObserverError> {
        DimensionError::check("estimate", (self.a_matrix.nrows(), 1), x_hat.shape())?;
        DimensionError::check("output", (self.c_matrix.nrows(), 1), y.shape())?;
        DimensionError::check("input", (self.b_matrix.ncols(), 1), u.shape())?;

        let y_pred = &self.c_matrix * x_hat;
        let s = y - y_pred;
        let correction = &self.l_matrix * &s + &self.switching * s.map(sign) * self.rho;

        Ok(&self.a_matrix * x_hat + &self.b_matrix * u + correction)
    }
}

impl Observer for SlidingModeObserver {
    fn update(
        &mut self,
        y: &na::DVector<f64>,
        u: &na::DVector<f64>,
    ) -> Result<na::DVector<f64>, ObserverError> {
        let x_hat = self.update_pure(&self.x_hat, y, u)?;
        self.x_hat.copy_from(&x_hat);
        Ok(x_hat)
    }

    fn get_estimate(&self) -> na::DVector<f64> {
        self.x_hat.clone()
    }

    fn reset(&mut self) {
        self.x_hat.fill(0.0);
    }
}

/// Elementwise sign with sign(0) = 0. `f64::signum` maps 0.0 to 1.0.
fn sign(value: f64) -> f64 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }
}
