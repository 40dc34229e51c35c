//! Host side of the bridge.
//!
//! The host exposes an object graph over TCP without ever blocking the thread
//! that drives it:
//!
//! - [`Multiplexer`] - listening socket, connections and dispatcher, advanced
//!   by calling [`Multiplexer::tick`] from the host's own periodic callback
//! - [`HostServer`] - ticks a multiplexer on a dedicated thread when the host
//!   has no such callback
//!
//! # Example
//!
//! ```no_run
//! use daisychain_core::{Dispatcher, HostConfig, HostServer, ObjectHandle};
//! # fn anchor() -> ObjectHandle { unimplemented!() }
//!
//! let dispatcher = Dispatcher::new(anchor())?;
//! let handle = HostServer::start(HostConfig::default(), dispatcher)?;
//! println!("listening on {}", handle.addr());
//! # Ok::<(), daisychain_core::DaisyError>(())
//! ```

mod connection;
mod multiplexer;
mod server;

pub use multiplexer::{Multiplexer, TickReport};
pub use server::{HostHandle, HostServer};
