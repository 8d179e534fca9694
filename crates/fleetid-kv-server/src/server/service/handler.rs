//! gRPC service implementation for lease-based coordination.
//!
//! [`KvService`] serves the `KeyValue` service defined in the protobuf schema
//! from a [`MemoryBackend`]. Generators use it to claim worker slots under TTL
//! leases and to exchange wall-clock samples.

use core::time::Duration;
use std::sync::Arc;

use fleetid::{BackendError, CoordinationBackend, MemoryBackend};
use fleetid_kv_core::{
    Error,
    proto::{
        GetPrefixRequest, GetPrefixResponse, GetRequest, GetResponse, GrantLeaseRequest,
        GrantLeaseResponse, KeepAliveRequest, KeepAliveResponse, KeyValuePair, PutRequest,
        PutResponse, ServerTimeRequest, ServerTimeResponse, key_value_server::KeyValue,
    },
};
use portable_atomic::{AtomicBool, Ordering};
use tonic::{Request, Response, Status};
use tracing::{debug, info};

use crate::server::config::ServerConfig;

/// Key/value service over a shared in-memory store.
#[derive(Clone)]
pub struct KvService {
    config: ServerConfig,
    backend: MemoryBackend,
    shutting_down: Arc<AtomicBool>,
}

impl KvService {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_backend(config, MemoryBackend::new())
    }

    /// Serves an existing store.
    pub fn with_backend(config: ServerConfig, backend: MemoryBackend) -> Self {
        Self {
            config,
            backend,
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Rejects every further request with `UNAVAILABLE`.
    ///
    /// Leases are not revoked; they expire on their own once clients stop
    /// renewing them.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        info!(entries = self.backend.len(), "key/value service stopped accepting requests");
    }

    fn ensure_serving(&self) -> Result<(), Status> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(Error::ServiceShutdown.into());
        }
        Ok(())
    }
}

fn require_key(field: &str, key: &str) -> Result<(), Status> {
    if key.is_empty() {
        return Err(Error::InvalidRequest {
            reason: format!("{field} must not be empty"),
        }
        .into());
    }
    Ok(())
}

fn to_status(err: BackendError) -> Status {
    match err {
        BackendError::LeaseNotFound(lease_id) => Error::LeaseNotFound { lease_id }.into(),
        BackendError::InvalidRequest(reason) => Error::InvalidRequest { reason }.into(),
        other => Status::internal(other.to_string()),
    }
}

#[tonic::async_trait]
impl KeyValue for KvService {
    async fn get(&self, req: Request<GetRequest>) -> Result<Response<GetResponse>, Status> {
        self.ensure_serving()?;
        let GetRequest { key } = req.into_inner();
        require_key("key", &key)?;

        let value = self.backend.get(&key).await.map_err(to_status)?;
        Ok(Response::new(GetResponse { value }))
    }

    async fn get_prefix(
        &self,
        req: Request<GetPrefixRequest>,
    ) -> Result<Response<GetPrefixResponse>, Status> {
        self.ensure_serving()?;
        let GetPrefixRequest { prefix } = req.into_inner();
        require_key("prefix", &prefix)?;

        let kvs = self
            .backend
            .get_prefix(&prefix)
            .await
            .map_err(to_status)?
            .into_iter()
            .map(|kv| KeyValuePair {
                key: kv.key,
                value: kv.value,
            })
            .collect();
        Ok(Response::new(GetPrefixResponse { kvs }))
    }

    async fn put(&self, req: Request<PutRequest>) -> Result<Response<PutResponse>, Status> {
        self.ensure_serving()?;
        let PutRequest {
            key,
            value,
            lease_id,
        } = req.into_inner();
        require_key("key", &key)?;

        self.backend
            .put(&key, &value, lease_id)
            .await
            .map_err(to_status)?;
        debug!(%key, ?lease_id, "put");
        Ok(Response::new(PutResponse {}))
    }

    async fn grant_lease(
        &self,
        req: Request<GrantLeaseRequest>,
    ) -> Result<Response<GrantLeaseResponse>, Status> {
        self.ensure_serving()?;
        let ttl = Duration::from_millis(req.get_ref().ttl_millis);
        if ttl > self.config.max_lease_ttl {
            return Err(Error::InvalidRequest {
                reason: format!(
                    "lease ttl {ttl:?} exceeds maximum allowed ({:?})",
                    self.config.max_lease_ttl
                ),
            }
            .into());
        }

        let lease_id = self.backend.grant_lease(ttl).await.map_err(to_status)?;
        debug!(lease_id, ?ttl, "granted lease");
        Ok(Response::new(GrantLeaseResponse { lease_id }))
    }

    async fn keep_alive(
        &self,
        req: Request<KeepAliveRequest>,
    ) -> Result<Response<KeepAliveResponse>, Status> {
        self.ensure_serving()?;
        let lease_id = req.get_ref().lease_id;
        let ttl = self
            .backend
            .keep_alive(lease_id)
            .await
            .map_err(to_status)?;
        Ok(Response::new(KeepAliveResponse {
            ttl_millis: ttl.as_millis() as u64,
        }))
    }

    async fn server_time(
        &self,
        _req: Request<ServerTimeRequest>,
    ) -> Result<Response<ServerTimeResponse>, Status> {
        self.ensure_serving()?;
        let unix_millis = self.backend.server_time().await.map_err(to_status)?;
        Ok(Response::new(ServerTimeResponse { unix_millis }))
    }
}
