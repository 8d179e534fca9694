//! Shared protocol bindings and error definitions for the key/value
//! coordination service.
//!
//! - [`error`] - Service error type and its mapping onto gRPC status codes.
//! - [`proto`] - Generated messages, client and server for
//!   `fleetid.kv.v1.KeyValue`.

pub mod error;
pub use error::*;

pub mod proto {
    tonic::include_proto!("fleetid.kv.v1");
}
