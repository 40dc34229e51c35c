//! Client-side stand-ins for remote objects.

use super::transport::RpcClient;
use crate::config::HostDefaults;
use crate::reference::RemoteReference;
use crate::wire::{CallTarget, WireValue};
use crate::{DaisyError, Result};
use serde_json::Number;
use std::collections::BTreeMap;
use std::fmt;

/// Handle for one remote object.
///
/// Holds nothing but the reference; every call is a round trip to the host.
#[derive(Clone)]
pub struct RemoteProxy {
    client: RpcClient,
    target: CallTarget,
}

impl RemoteProxy {
    /// Proxy with an empty root, usable only for bootstrapping.
    pub fn root(client: RpcClient) -> Self {
        Self {
            client,
            target: CallTarget::Unbound,
        }
    }

    pub fn new(client: RpcClient, reference: RemoteReference) -> Self {
        Self {
            client,
            target: CallTarget::Object(reference),
        }
    }

    pub fn reference(&self) -> Option<&RemoteReference> {
        self.target.reference()
    }

    pub fn type_name(&self) -> Option<&str> {
        self.reference().map(|r| r.type_name.as_str())
    }

    pub fn client(&self) -> &RpcClient {
        &self.client
    }

    /// Ask the host for its anchor object.
    pub async fn bootstrap(&self) -> Result<RemoteProxy> {
        let value = self
            .client
            .call(
                &self.target,
                HostDefaults::BOOTSTRAP_COMMAND,
                Vec::new(),
                BTreeMap::new(),
            )
            .await?;
        match value {
            WireValue::Reference(reference) => Ok(RemoteProxy::new(self.client.clone(), reference)),
            other => Err(DaisyError::Rpc {
                message: format!("bootstrap returned {:?} instead of a reference", other),
            }),
        }
    }

    /// Call a method with positional arguments only.
    pub async fn call(&self, method: &str, args: Vec<WireValue>) -> Result<ProxyValue> {
        self.call_with(method, args, BTreeMap::new()).await
    }

    /// Call a method with positional and keyword arguments.
    pub async fn call_with(
        &self,
        method: &str,
        args: Vec<WireValue>,
        kwgs: BTreeMap<String, WireValue>,
    ) -> Result<ProxyValue> {
        let value = self.client.call(&self.target, method, args, kwgs).await?;
        Ok(ProxyValue::from_wire(&self.client, value))
    }
}

impl fmt::Debug for RemoteProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            CallTarget::Unbound => write!(f, "RemoteProxy(<unbound> @ {})", self.client.addr()),
            CallTarget::Object(reference) => {
                write!(f, "RemoteProxy({} @ {})", reference, self.client.addr())
            }
        }
    }
}

impl From<&RemoteProxy> for WireValue {
    fn from(proxy: &RemoteProxy) -> Self {
        match &proxy.target {
            CallTarget::Unbound => WireValue::Map(BTreeMap::new()),
            CallTarget::Object(reference) => WireValue::Reference(reference.clone()),
        }
    }
}

impl From<RemoteProxy> for WireValue {
    fn from(proxy: RemoteProxy) -> Self {
        WireValue::from(&proxy)
    }
}

/// A call result with known reference types wrapped as proxies.
#[derive(Debug, Clone)]
pub enum ProxyValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<ProxyValue>),
    Map(BTreeMap<String, ProxyValue>),
    Proxy(RemoteProxy),
    /// A reference whose type the client was not told to wrap.
    Reference(RemoteReference),
}

impl ProxyValue {
    fn from_wire(client: &RpcClient, value: WireValue) -> Self {
        match value {
            WireValue::Null => ProxyValue::Null,
            WireValue::Bool(b) => ProxyValue::Bool(b),
            WireValue::Number(n) => ProxyValue::Number(n),
            WireValue::String(s) => ProxyValue::String(s),
            WireValue::List(items) => ProxyValue::List(
                items
                    .into_iter()
                    .map(|item| Self::from_wire(client, item))
                    .collect(),
            ),
            WireValue::Map(map) => ProxyValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_wire(client, v)))
                    .collect(),
            ),
            WireValue::Reference(reference) if client.is_proxy_type(&reference.type_name) => {
                ProxyValue::Proxy(RemoteProxy::new(client.clone(), reference))
            }
            WireValue::Reference(reference) => ProxyValue::Reference(reference),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ProxyValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ProxyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ProxyValue::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ProxyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ProxyValue]> {
        match self {
            ProxyValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_proxy(&self) -> Option<&RemoteProxy> {
        match self {
            ProxyValue::Proxy(proxy) => Some(proxy),
            _ => None,
        }
    }

    pub fn into_proxy(self) -> Option<RemoteProxy> {
        match self {
            ProxyValue::Proxy(proxy) => Some(proxy),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&RemoteReference> {
        match self {
            ProxyValue::Proxy(proxy) => proxy.reference(),
            ProxyValue::Reference(reference) => Some(reference),
            _ => None,
        }
    }
}

impl From<&ProxyValue> for WireValue {
    fn from(value: &ProxyValue) -> Self {
        match value {
            ProxyValue::Null => WireValue::Null,
            ProxyValue::Bool(b) => WireValue::Bool(*b),
            ProxyValue::Number(n) => WireValue::Number(n.clone()),
            ProxyValue::String(s) => WireValue::String(s.clone()),
            ProxyValue::List(items) => WireValue::List(items.iter().map(WireValue::from).collect()),
            ProxyValue::Map(map) => WireValue::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), WireValue::from(v)))
                    .collect(),
            ),
            ProxyValue::Proxy(proxy) => WireValue::from(proxy),
            ProxyValue::Reference(reference) => WireValue::from(reference),
        }
    }
}
