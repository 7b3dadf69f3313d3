use thiserror::Error;

use crate::lmi::SolveStatus;

/// Shape of a matrix or vector that did not fit the system it was given to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{what} has shape {found:?}, expected {expected:?}")]
pub struct DimensionError {
    pub what: &'static str,
    pub expected: (usize, usize),
    pub found: (usize, usize),
}

impl DimensionError {
    pub fn check(
        what: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    ) -> Result<(), Self> {
        if expected == found {
            Ok(())
        } else {
            Err(Self {
                what,
                expected,
                found,
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SynthesisError {
    #[error("LMI feasibility search did not converge (solver status: {status:?})")]
    Convergence { status: SolveStatus },
    #[error(transparent)]
    Dimension(#[from] DimensionError),
    #[error("tolerance gamma must be finite and positive, got {0}")]
    InvalidTolerance(f64),
    #[error(transparent)]
    Problem(#[from] LmiError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ObserverError {
    #[error(transparent)]
    Dimension(#[from] DimensionError),
    #[error("robustness gain rho must be finite and positive, got {0}")]
    InvalidRobustnessGain(f64),
    #[error("switching term needs one output or one output per state, got {outputs} outputs for {states} states")]
    SwitchingDimension { outputs: usize, states: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LmiError {
    #[error("unknown variable id {0}")]
    UnknownVariable(usize),
    #[error("constraint constant must be square, got {rows}x{cols}")]
    NonSquareConstraint { rows: usize, cols: usize },
    #[error("expected {expected} scalars, got {found}")]
    ScalarCount { expected: usize, found: usize },
    #[error("term {index} does not fit its constraint: {source}")]
    TermShape {
        index: usize,
        #[source]
        source: DimensionError,
    },
}
