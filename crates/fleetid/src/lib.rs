#![doc = include_str!("../README.md")]

mod backend;
mod coordination;
mod error;
mod generator;
mod id;
mod status;
#[cfg(test)]
mod testing;
mod time;

pub use crate::backend::*;
pub use crate::coordination::*;
pub use crate::error::*;
pub use crate::generator::*;
pub use crate::id::*;
pub use crate::status::*;
pub use crate::time::*;
