//! Background driver for a [`Multiplexer`].
//!
//! Hosts without a periodic callback of their own can hand the multiplexer to
//! a dedicated thread that ticks it at the configured interval.

use super::multiplexer::Multiplexer;
use crate::config::HostConfig;
use crate::dispatch::Dispatcher;
use crate::{DaisyError, Result};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info};

#[derive(Debug, Default)]
struct HostControl {
    shutdown: AtomicBool,
    reset: AtomicBool,
}

/// Handle to a running host thread. Dropping shuts the host down.
pub struct HostHandle {
    addr: SocketAddr,
    control: Arc<HostControl>,
    thread: Option<JoinHandle<()>>,
}

impl HostHandle {
    /// Address the host is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Ask the host to clear its reference cache before the next tick.
    pub fn request_reset(&self) {
        self.control.reset.store(true, Ordering::Release);
    }

    /// Signal the host thread to stop after the current tick.
    pub fn shutdown(&self) {
        self.control.shutdown.store(true, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Shut down and wait for the host thread to exit.
    pub fn join(mut self) -> Result<()> {
        self.shutdown();
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| DaisyError::Other("host thread panicked".to_string())),
            None => Ok(()),
        }
    }
}

impl Drop for HostHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Runs a multiplexer on its own thread.
pub struct HostServer;

impl HostServer {
    /// Bind on the calling thread, then tick on a background thread.
    ///
    /// Bind errors surface here rather than on the background thread.
    pub fn start(config: HostConfig, dispatcher: Dispatcher) -> Result<HostHandle> {
        let tick_interval = config.tick_interval;
        let multiplexer = Multiplexer::bind(config, dispatcher)?;
        let addr = multiplexer.local_addr();
        let control = Arc::new(HostControl::default());

        let thread = std::thread::Builder::new()
            .name("daisychain-host".to_string())
            .spawn({
                let control = control.clone();
                move || Self::run(multiplexer, &control, tick_interval)
            })?;

        Ok(HostHandle {
            addr,
            control,
            thread: Some(thread),
        })
    }

    fn run(mut multiplexer: Multiplexer, control: &HostControl, tick_interval: Duration) {
        info!("Host thread started on {}", multiplexer.local_addr());

        while !control.shutdown.load(Ordering::Acquire) {
            if control.reset.swap(false, Ordering::AcqRel) {
                multiplexer.reset_references();
            }

            match multiplexer.tick() {
                Ok(report) if !report.is_idle() => debug!("Tick: {:?}", report),
                Ok(_) => {}
                Err(e) => error!("Host poll failed: {}", e),
            }

            std::thread::sleep(tick_interval);
        }

        info!(
            "Host thread on {} shutting down ({} open connections)",
            multiplexer.local_addr(),
            multiplexer.connection_count()
        );
    }
}
