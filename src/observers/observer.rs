extern crate nalgebra as na;

use crate::error::ObserverError;

/// A recursive state estimator driven by measured outputs and applied inputs.
pub trait Observer {
    /// Advances the estimate by one step and returns it.
    fn update(
        &mut self,
        y: &na::DVector<f64>,
        u: &na::DVector<f64>,
    ) -> Result<na::DVector<f64>, ObserverError>;

    fn get_estimate(&self) -> na::DVector<f64>;

    fn reset(&mut self);
}
