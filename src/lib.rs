//! Observer gain synthesis by LMI feasibility and a discrete-time
//! sliding-mode observer that uses the gain.
//!
//! ```no_run
//! use nalgebra as na;
//! use lmi_observers::{synthesize_observer_gain, Observer, SlidingModeObserver, DEFAULT_GAMMA, DEFAULT_RHO};
//!
//! let a = na::DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 0.0, 1.0]);
//! let b = na::DMatrix::from_row_slice(2, 1, &[0.0, 1.0]);
//! let c = na::DMatrix::from_row_slice(1, 2, &[1.0, 0.0]);
//!
//! let l = synthesize_observer_gain(&a, &c, DEFAULT_GAMMA)?;
//! let mut observer = SlidingModeObserver::new(a, b, c, l, DEFAULT_RHO)?;
//! let x_hat = observer.update(&na::DVector::from_element(1, 0.3), &na::DVector::zeros(1))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

extern crate nalgebra as na;

pub mod error;
pub mod linsystheory;
pub mod lmi;
pub mod models;
pub mod observers;
pub mod synthesis;

pub use error::{DimensionError, LmiError, ObserverError, SynthesisError};
pub use models::LinearSystem;
pub use observers::{Observer, SlidingModeObserver, DEFAULT_RHO};
pub use synthesis::{synthesize_observer_gain, GainSynthesizer, ObserverGain, DEFAULT_GAMMA};
