//! Cross-process coordination: worker slot registration and clock-skew
//! checks.

mod registry;
mod skew;

pub use registry::*;
pub use skew::*;
