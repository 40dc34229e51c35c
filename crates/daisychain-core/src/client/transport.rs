//! Connection-per-call transport.

use super::proxy::RemoteProxy;
use crate::config::ClientConfig;
use crate::wire::{frame, CallTarget, Request, Response, WireValue};
use crate::{DaisyError, Result};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::debug;

/// Client for a DaisyChain host.
///
/// Cheap to clone; every proxy holds one. Each call opens a fresh TCP
/// connection, performs one request/response exchange and closes it.
#[derive(Clone)]
pub struct RpcClient {
    config: Arc<ClientConfig>,
    proxy_types: Arc<HashSet<String>>,
}

impl RpcClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config: Arc::new(config),
            proxy_types: Arc::new(HashSet::new()),
        }
    }

    /// Client with default settings for the host at `addr`.
    pub fn connect_to(addr: SocketAddr) -> Self {
        Self::new(ClientConfig::new(addr))
    }

    /// Reference types that come back wrapped as [`RemoteProxy`].
    ///
    /// References of any other type are returned raw.
    pub fn with_proxy_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut proxy_types = (*self.proxy_types).clone();
        proxy_types.extend(types.into_iter().map(Into::into));
        self.proxy_types = Arc::new(proxy_types);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn addr(&self) -> SocketAddr {
        self.config.addr
    }

    pub fn is_proxy_type(&self, type_name: &str) -> bool {
        self.proxy_types.contains(type_name)
    }

    /// Send one request and wait for its response.
    pub async fn request(&self, request: &Request) -> Result<Response> {
        let addr = self.config.addr;
        let framing = self.config.framing;
        let payload = request.to_vec()?;

        let mut stream = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| DaisyError::Timeout {
                addr,
                after: self.config.connect_timeout,
            })?
            .map_err(|e| DaisyError::Connection {
                addr,
                message: e.to_string(),
            })?;

        debug!("Calling '{}' on {}", request.method, addr);

        let exchange = async {
            frame::write_message(&mut stream, framing, &payload).await?;
            frame::read_message(
                &mut stream,
                framing,
                self.config.read_buffer_size,
                self.config.max_message_size,
            )
            .await
        };

        let bytes = tokio::time::timeout(self.config.response_timeout, exchange)
            .await
            .map_err(|_| DaisyError::Timeout {
                addr,
                after: self.config.response_timeout,
            })??
            .ok_or_else(|| DaisyError::Connection {
                addr,
                message: "host closed the connection without responding".to_string(),
            })?;

        Response::from_slice(&bytes).map_err(|e| DaisyError::Json {
            message: format!("Failed to parse response from {}: {}", addr, e),
            source: None,
        })
    }

    /// Call `method` on `target`, turning an error response into
    /// [`DaisyError::Rpc`].
    pub async fn call(
        &self,
        target: &CallTarget,
        method: &str,
        args: Vec<WireValue>,
        kwgs: BTreeMap<String, WireValue>,
    ) -> Result<WireValue> {
        let request = Request::new(target.clone(), method)
            .with_args(args)
            .with_kwgs(kwgs);
        self.request(&request).await?.into_result()
    }

    /// Obtain a proxy for the host's anchor object.
    pub async fn bootstrap(&self) -> Result<RemoteProxy> {
        RemoteProxy::root(self.clone()).bootstrap().await
    }
}

impl fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcClient")
            .field("addr", &self.config.addr)
            .field("framing", &self.config.framing)
            .finish_non_exhaustive()
    }
}
