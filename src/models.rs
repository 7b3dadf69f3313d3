extern crate nalgebra as na;

use crate::error::DimensionError;

/// Linear Time-Invariant System
/// x(k+1) = A*x(k) + B*u(k)
/// y(k) = C*x(k) + D*u(k)
/// No noise is considered; disturbances are injected by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearSystem {
    a_matrix: na::DMatrix<f64>,
    b_matrix: na::DMatrix<f64>,
    c_matrix: na::DMatrix<f64>,
    d_matrix: na::DMatrix<f64>,
}

impl LinearSystem {
    pub fn new(
        a_matrix: na::DMatrix<f64>,
        b_matrix: na::DMatrix<f64>,
        c_matrix: na::DMatrix<f64>,
        d_matrix: na::DMatrix<f64>,
    ) -> Result<Self, DimensionError> {
        let nx = a_matrix.nrows();
        let nu = b_matrix.ncols();
        let ny = c_matrix.nrows();
        DimensionError::check("A", (nx, nx), a_matrix.shape())?;
        DimensionError::check("B", (nx, nu), b_matrix.shape())?;
        DimensionError::check("C", (ny, nx), c_matrix.shape())?;
        DimensionError::check("D", (ny, nu), d_matrix.shape())?;
        Ok(Self {
            a_matrix,
            b_matrix,
            c_matrix,
            d_matrix,
        })
    }

    /// System without direct feedthrough (D = 0).
    pub fn strictly_proper(
        a_matrix: na::DMatrix<f64>,
        b_matrix: na::DMatrix<f64>,
        c_matrix: na::DMatrix<f64>,
    ) -> Result<Self, DimensionError> {
        let d_matrix = na::DMatrix::zeros(c_matrix.nrows(), b_matrix.ncols());
        Self::new(a_matrix, b_matrix, c_matrix, d_matrix)
    }

    pub fn a(&self) -> &na::DMatrix<f64> {
        &self.a_matrix
    }
    pub fn b(&self) -> &na::DMatrix<f64> {
        &self.b_matrix
    }
    pub fn c(&self) -> &na::DMatrix<f64> {
        &self.c_matrix
    }
    pub fn d(&self) -> &na::DMatrix<f64> {
        &self.d_matrix
    }

    pub fn nx(&self) -> usize {
        self.a_matrix.nrows()
    }
    pub fn nu(&self) -> usize {
        self.b_matrix.ncols()
    }
    pub fn ny(&self) -> usize {
        self.c_matrix.nrows()
    }

    /// Returns (x(k+1), y(k)).
    pub fn simulate_step(
        &self,
        x: &na::DVector<f64>,
        u: &na::DVector<f64>,
    ) -> Result<(na::DVector<f64>, na::DVector<f64>), DimensionError> {
        DimensionError::check("state", (self.nx(), 1), x.shape())?;
        DimensionError::check("input", (self.nu(), 1), u.shape())?;
        let x_next = &self.a_matrix * x + &self.b_matrix * u;
        let y = &self.c_matrix * x + &self.d_matrix * u;
        Ok((x_next, y))
    }

    /// Simulates from x0 over the input series.
    /// x_series[k] and y_series[k] are x(k) and y(k), so x_series[0] == x0.
    pub fn simulate(
        &self,
        x0: &na::DVector<f64>,
        u_series: &[na::DVector<f64>],
    ) -> Result<(Vec<na::DVector<f64>>, Vec<na::DVector<f64>>), DimensionError> {
        let num_steps = u_series.len();
        let mut x_series = Vec::with_capacity(num_steps);
        let mut y_series = Vec::with_capacity(num_steps);

        let mut x_k = x0.clone();
        for u_k in u_series {
            let (x_k_next, y_k) = self.simulate_step(&x_k, u_k)?;
            x_series.push(x_k);
            y_series.push(y_k);
            x_k = x_k_next;
        }

        Ok((x_series, y_series))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn random_matrix(rng: &mut StdRng, rows: usize, cols: usize) -> na::DMatrix<f64> {
        na::DMatrix::from_fn(rows, cols, |_, _| rng.gen_range(-1.0..1.0))
    }

    fn double_integrator() -> LinearSystem {
        LinearSystem::strictly_proper(
            na::DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 0.0, 1.0]),
            na::DMatrix::from_row_slice(2, 1, &[0.0, 1.0]),
            na::DMatrix::from_row_slice(1, 2, &[1.0, 0.0]),
        )
        .unwrap()
    }

    #[test]
    fn simulate_linear() {
        const NX: usize = 2;
        const NY: usize = 2;
        const NU: usize = 1;

        let mut rng = StdRng::seed_from_u64(7);
        let a_matrix = random_matrix(&mut rng, NX, NX);
        let b_matrix = random_matrix(&mut rng, NX, NU);
        let c_matrix = random_matrix(&mut rng, NY, NX);
        let d_matrix = random_matrix(&mut rng, NY, NU);

        let system = LinearSystem::new(a_matrix, b_matrix, c_matrix, d_matrix).unwrap();

        let x_init = na::DVector::from_fn(NX, |_, _| rng.gen_range(-1.0..1.0));
        let u = vec![na::DVector::from_fn(NU, |_, _| rng.gen_range(-1.0..1.0)); 100];

        let (x_series, y_series) = system.simulate(&x_init, &u).unwrap();

        assert_eq!(x_series.len(), u.len());
        assert_eq!(y_series.len(), u.len());
        assert_eq!(
            x_series[0], x_init,
            "Initial state is the first element of x_series"
        );

        let (x_next, y) = system.simulate_step(&x_init, &u[0]).unwrap();
        assert_eq!(x_series[1], x_next, "x(1) is located at x_series[1]");
        assert_eq!(y_series[0], y, "y(0) is located at y_series[0]");
    }

    #[test]
    fn double_integrator_accumulates_input() {
        let system = double_integrator();
        let u = vec![na::DVector::from_element(1, 1.0); 3];
        let (x_series, y_series) = system
            .simulate(&na::DVector::zeros(2), &u)
            .unwrap();

        assert_eq!(x_series[2], na::DVector::from_column_slice(&[1.0, 2.0]));
        assert_eq!(y_series[2][0], 1.0);
    }

    #[test]
    fn rejects_inconsistent_matrices() {
        let err = LinearSystem::strictly_proper(
            na::DMatrix::identity(2, 2),
            na::DMatrix::zeros(3, 1),
            na::DMatrix::zeros(1, 2),
        )
        .unwrap_err();
        assert_eq!(err.what, "B");
        assert_eq!(err.expected, (2, 1));
        assert_eq!(err.found, (3, 1));

        let system = double_integrator();
        assert!(system
            .simulate_step(&na::DVector::zeros(3), &na::DVector::zeros(1))
            .is_err());
    }
}
