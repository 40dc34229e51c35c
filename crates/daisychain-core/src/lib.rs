//! DaisyChain Core - generic remote-object bridge.
//!
//! A host process exposes a graph of native objects over a loopback TCP
//! socket. Clients start from one anchor object and walk the graph by calling
//! methods; every object crossing the wire is replaced by a stable
//! [`RemoteReference`] derived from its representation, and every reference
//! coming back is resolved to the original object.
//!
//! The host side never blocks the thread that drives it: a [`Multiplexer`]
//! is advanced one zero-timeout poll at a time by [`Multiplexer::tick`],
//! either from the host's own periodic callback or by a [`HostServer`]
//! thread.
//!
//! # Example
//!
//! ```rust,ignore
//! use daisychain_core::{Dispatcher, HostConfig, HostServer, RpcClient};
//!
//! let handle = HostServer::start(HostConfig::default(), Dispatcher::new(anchor)?)?;
//!
//! let client = RpcClient::connect_to(handle.addr()).with_proxy_types(["Project"]);
//! let root = client.bootstrap().await?;
//! let version = root.call("GetVersionString", vec![]).await?;
//! ```

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod object;
pub mod reference;
pub mod serializer;
pub mod value;
pub mod wire;

// Re-export commonly used types
pub use client::{ProxyValue, RemoteProxy, RpcClient};
pub use config::{ClientConfig, Framing, HostConfig, HostDefaults};
pub use dispatch::Dispatcher;
pub use error::{DaisyError, Result};
pub use host::{HostHandle, HostServer, Multiplexer, TickReport};
pub use object::{CallArgs, Exposed, MethodTable, ObjectHandle, RemoteObject};
pub use reference::{ReferenceCache, RemoteReference};
pub use value::Value;
pub use wire::{CallTarget, Request, Response, WireValue};
