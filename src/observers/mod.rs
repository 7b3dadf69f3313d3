pub mod observer;
pub mod sliding_mode;

pub use observer::Observer;
pub use sliding_mode::{SlidingModeObserver, DEFAULT_RHO};
