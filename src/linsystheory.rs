extern crate nalgebra as na;

use na::ComplexField;

use crate::error::DimensionError;

/// Largest eigenvalue magnitude of a square matrix.
pub fn spectral_radius(matrix: &na::DMatrix<f64>) -> Result<f64, DimensionError> {
    let n = matrix.nrows();
    DimensionError::check("matrix", (n, n), matrix.shape())?;
    if n == 0 {
        return Ok(0.0);
    }
    Ok(matrix
        .complex_eigenvalues()
        .iter()
        .map(|eigenvalue| eigenvalue.abs())
        .fold(0.0, f64::max))
}

/// Whether a discrete-time system matrix is Schur-stable, i.e. every
/// eigenvalue lies strictly inside the unit circle.
pub fn is_stable(a_clp: &na::DMatrix<f64>) -> Result<bool, DimensionError> {
    Ok(spectral_radius(a_clp)? < 1.0)
}

/// Whether the pair `(A, C)` is detectable in discrete time.
///
/// Every eigenvalue `z` with `|z| >= 1` must pass the Popov-Belevitch-Hautus
/// test: `[A - z*I; C]` has full column rank.
pub fn is_detectable(
    a_matrix: &na::DMatrix<f64>,
    c_matrix: &na::DMatrix<f64>,
) -> Result<bool, DimensionError> {
    let n = a_matrix.nrows();
    DimensionError::check("A", (n, n), a_matrix.shape())?;
    DimensionError::check("C", (c_matrix.nrows(), n), c_matrix.shape())?;

    let a_complex = a_matrix.map(|x| na::Complex::new(x, 0.0));
    let c_complex = c_matrix.map(|x| na::Complex::new(x, 0.0));
    let p = c_matrix.nrows();

    for eigenvalue in a_matrix.complex_eigenvalues().iter() {
        if eigenvalue.abs() < 1.0 {
            continue;
        }
        // rank [A - eigenvalue*I; C] must be n
        let phb_matrix = na::DMatrix::from_fn(n + p, n, |i, j| {
            if i < n {
                let shift = if i == j { *eigenvalue } else { na::Complex::new(0.0, 0.0) };
                a_complex[(i, j)] - shift
            } else {
                c_complex[(i - n, j)]
            }
        });
        if phb_matrix.rank(PHB_RANK_TOLERANCE) != n {
            return Ok(false);
        }
    }
    Ok(true)
}

const PHB_RANK_TOLERANCE: f64 = 1.0e-8;
