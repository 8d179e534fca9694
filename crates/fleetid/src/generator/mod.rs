mod config;
mod guard;
mod handle;

pub use config::*;
pub use guard::*;
pub use handle::*;
