//! Client side of the bridge.
//!
//! [`RpcClient`] owns the connection settings; [`RemoteProxy`] wraps one
//! remote object and turns method calls into request/response round trips.
//!
//! # Example
//!
//! ```no_run
//! use daisychain_core::{RpcClient, WireValue};
//!
//! # async fn demo() -> daisychain_core::Result<()> {
//! let client = RpcClient::connect_to(([127, 0, 0, 1], 65432).into())
//!     .with_proxy_types(["ProjectManager", "Project"]);
//! let root = client.bootstrap().await?;
//! let manager = root.call("GetProjectManager", vec![]).await?;
//! let project = manager
//!     .as_proxy()
//!     .expect("ProjectManager is a proxy type")
//!     .call("CreateProject", vec![WireValue::from("Reel 1")])
//!     .await?;
//! # let _ = project;
//! # Ok(())
//! # }
//! ```

mod proxy;
mod transport;

pub use proxy::{ProxyValue, RemoteProxy};
pub use transport::RpcClient;
