use core::time::Duration;

use fleetid_kv_core::proto::{
    GetPrefixRequest, GetRequest, GrantLeaseRequest, KeepAliveRequest, PutRequest,
    ServerTimeRequest, key_value_client::KeyValueClient,
};
use futures::{FutureExt, future::BoxFuture};
use tonic::{
    Status,
    transport::{Channel, Endpoint},
};

use crate::backend::{BackendError, BackendResult, CoordinationBackend, KeyValue, LeaseId};

/// gRPC client of `fleetid-kv-server`.
///
/// The underlying channel is cheap to clone and multiplexes concurrent calls,
/// so every call works on its own clone of the client.
#[derive(Clone, Debug)]
pub struct KvBackend {
    client: KeyValueClient<Channel>,
}

impl KvBackend {
    /// Connects to the server at `endpoint` (e.g. `http://127.0.0.1:2379`).
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::InvalidRequest`] for a malformed endpoint and
    /// [`BackendError::Transport`] if no connection is established within
    /// `connect_timeout`.
    pub async fn connect(
        endpoint: impl Into<String>,
        connect_timeout: Duration,
    ) -> BackendResult<Self> {
        let endpoint = Endpoint::from_shared(endpoint.into())
            .map_err(|e| BackendError::InvalidRequest(e.to_string()))?
            .connect_timeout(connect_timeout);
        let channel = endpoint
            .connect()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(Self::from_channel(channel))
    }

    /// Wraps an already established channel.
    pub fn from_channel(channel: Channel) -> Self {
        Self {
            client: KeyValueClient::new(channel),
        }
    }
}

fn from_status(status: Status, lease: Option<LeaseId>) -> BackendError {
    use fleetid_kv_core::Error;

    match Error::from_status(&status, lease) {
        Some(Error::LeaseNotFound { lease_id }) => BackendError::LeaseNotFound(lease_id),
        Some(Error::InvalidRequest { reason }) => BackendError::InvalidRequest(reason),
        Some(Error::ServiceShutdown) | None => BackendError::Transport(status.to_string()),
    }
}

impl CoordinationBackend for KvBackend {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, BackendResult<Option<String>>> {
        let mut client = self.client.clone();
        let request = GetRequest { key: key.to_owned() };
        async move {
            let response = client
                .get(request)
                .await
                .map_err(|s| from_status(s, None))?;
            Ok(response.into_inner().value)
        }
        .boxed()
    }

    fn get_prefix<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, BackendResult<Vec<KeyValue>>> {
        let mut client = self.client.clone();
        let request = GetPrefixRequest {
            prefix: prefix.to_owned(),
        };
        async move {
            let response = client
                .get_prefix(request)
                .await
                .map_err(|s| from_status(s, None))?;
            Ok(response
                .into_inner()
                .kvs
                .into_iter()
                .map(|kv| KeyValue {
                    key: kv.key,
                    value: kv.value,
                })
                .collect())
        }
        .boxed()
    }

    fn put<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        lease: Option<LeaseId>,
    ) -> BoxFuture<'a, BackendResult<()>> {
        let mut client = self.client.clone();
        let request = PutRequest {
            key: key.to_owned(),
            value: value.to_owned(),
            lease_id: lease,
        };
        async move {
            client
                .put(request)
                .await
                .map_err(|s| from_status(s, lease))?;
            Ok(())
        }
        .boxed()
    }

    fn grant_lease(&self, ttl: Duration) -> BoxFuture<'_, BackendResult<LeaseId>> {
        let mut client = self.client.clone();
        async move {
            let ttl_millis = u64::try_from(ttl.as_millis()).map_err(|_| {
                BackendError::InvalidRequest(format!("lease ttl {ttl:?} is out of range"))
            })?;
            let request = GrantLeaseRequest { ttl_millis };
            let response = client
                .grant_lease(request)
                .await
                .map_err(|s| from_status(s, None))?;
            Ok(response.into_inner().lease_id)
        }
        .boxed()
    }

    fn keep_alive(&self, lease: LeaseId) -> BoxFuture<'_, BackendResult<Duration>> {
        let mut client = self.client.clone();
        async move {
            let response = client
                .keep_alive(KeepAliveRequest { lease_id: lease })
                .await
                .map_err(|s| from_status(s, Some(lease)))?;
            Ok(Duration::from_millis(response.into_inner().ttl_millis))
        }
        .boxed()
    }

    fn server_time(&self) -> BoxFuture<'_, BackendResult<u64>> {
        let mut client = self.client.clone();
        async move {
            let response = client
                .server_time(ServerTimeRequest {})
                .await
                .map_err(|s| from_status(s, None))?;
            Ok(response.into_inner().unix_millis)
        }
        .boxed()
    }
}
