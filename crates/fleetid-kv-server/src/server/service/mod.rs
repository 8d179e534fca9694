//! gRPC service implementation.
//!
//! - [`handler`] - `KeyValue` service entry point (`KvService`).

pub mod handler;
