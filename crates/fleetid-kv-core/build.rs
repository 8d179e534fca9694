/// Builds the gRPC client and server code for `proto/kv.proto` using
/// `tonic-prost-build`.
///
/// Generated code is emitted into `OUT_DIR` and included via:
///
/// ```rust,ignore
/// pub mod proto {
///     tonic::include_proto!("fleetid.kv.v1");
/// }
/// ```
///
/// # Panics
///
/// Panics if code generation fails.
fn main() {
    let config = tonic_prost_build::Config::new();

    tonic_prost_build::configure()
        .compile_with_config(config, &["proto/kv.proto"], &["proto"])
        .unwrap();
}
