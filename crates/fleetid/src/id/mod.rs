mod fleet_id;
mod layout;
mod slot;

pub use fleet_id::*;
pub use layout::*;
pub use slot::*;
