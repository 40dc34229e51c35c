//! DaisyChain RPC - host and client for the remote-object bridge.
//!
//! `serve` exposes a demonstration object graph; `bootstrap` and `call` talk
//! to any running host.

mod catalog;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use daisychain_core::{
    CallTarget, ClientConfig, Dispatcher, Framing, HostConfig, HostDefaults, HostServer,
    RemoteReference, RpcClient, WireValue,
};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::io::BufRead;
use std::net::{IpAddr, SocketAddr};
use std::sync::mpsc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "daisychain-rpc")]
#[command(about = "Remote-object bridge host and client")]
struct Args {
    /// Host address to bind to or connect to
    #[arg(long, global = true, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Port (0 = auto-assign when serving)
    #[arg(short, long, global = true, default_value_t = HostDefaults::PORT)]
    port: u16,

    /// Message framing: raw or length-prefixed
    #[arg(long, global = true, default_value = "raw")]
    framing: Framing,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the demonstration object graph
    Serve {
        /// Milliseconds between host ticks
        #[arg(long, default_value_t = 25)]
        tick_ms: u64,

        /// Bytes read per socket read
        #[arg(long, default_value_t = HostDefaults::READ_BUFFER_SIZE)]
        read_buffer: usize,

        /// Seconds a connection may stay silent before it is closed
        #[arg(long, default_value_t = HostDefaults::IDLE_TIMEOUT.as_secs())]
        idle_secs: u64,
    },

    /// Print the root reference of a running host
    Bootstrap,

    /// Call one method and print its result as JSON
    Call {
        /// Method name
        method: String,

        /// Positional arguments, each a JSON value
        args: Vec<String>,

        /// Type of the target reference
        #[arg(long, requires = "root_id")]
        root_type: Option<String>,

        /// Id of the target reference (omit to call with an empty root)
        #[arg(long)]
        root_id: Option<String>,

        /// Keyword arguments as a JSON object
        #[arg(long)]
        kwgs: Option<String>,
    },
}

/// Operator input for a running host.
enum Control {
    Reset,
    Quit,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries RPC_PORT and call results
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let addr = SocketAddr::new(args.host, args.port);
    let framing = args.framing;
    match args.command {
        Command::Serve {
            tick_ms,
            read_buffer,
            idle_secs,
        } => serve(
            addr,
            framing,
            tick_ms,
            read_buffer,
            Duration::from_secs(idle_secs),
        ),
        Command::Bootstrap => run_client(async {
            let client = RpcClient::new(ClientConfig::new(addr).with_framing(framing));
            let value = client
                .call(
                    &CallTarget::Unbound,
                    HostDefaults::BOOTSTRAP_COMMAND,
                    Vec::new(),
                    BTreeMap::new(),
                )
                .await?;
            print_value(value)
        }),
        Command::Call {
            method,
            args: call_args,
            root_type,
            root_id,
            kwgs,
        } => run_client(async {
            let target = match root_id {
                Some(id) => CallTarget::Object(RemoteReference::new(root_type.unwrap_or_default(), id)),
                None => CallTarget::Unbound,
            };
            let positional = call_args
                .iter()
                .enumerate()
                .map(|(i, raw)| {
                    serde_json::from_str::<JsonValue>(raw)
                        .map(WireValue::from)
                        .with_context(|| format!("argument {} is not valid JSON: {}", i, raw))
                })
                .collect::<Result<Vec<_>>>()?;
            let kwgs = parse_kwgs(kwgs.as_deref())?;

            let client = RpcClient::new(ClientConfig::new(addr).with_framing(framing));
            let value = client.call(&target, &method, positional, kwgs).await?;
            print_value(value)
        }),
    }
}

fn serve(
    addr: SocketAddr,
    framing: Framing,
    tick_ms: u64,
    read_buffer: usize,
    idle_timeout: Duration,
) -> Result<()> {
    info!("Starting DaisyChain host");

    let config = HostConfig::default()
        .with_addr(addr)
        .with_framing(framing)
        .with_tick_interval(Duration::from_millis(tick_ms))
        .with_read_buffer_size(read_buffer)
        .with_idle_timeout(idle_timeout);
    let dispatcher = Dispatcher::new(catalog::root())?;
    let handle = HostServer::start(config, dispatcher)?;

    // Print port for the launching process to read (intentional stdout for IPC)
    println!("RPC_PORT={}", handle.port());
    info!("Host running on {} (type 'reset' or 'quit')", handle.addr());

    let (tx, rx) = mpsc::channel();
    {
        let tx = tx.clone();
        ctrlc::set_handler(move || {
            let _ = tx.send(Control::Quit);
        })
        .context("failed to install Ctrl-C handler")?;
    }
    std::thread::Builder::new()
        .name("daisychain-stdin".to_string())
        .spawn(move || read_operator_commands(tx))?;

    for control in rx {
        match control {
            Control::Reset => {
                info!("Reset requested");
                handle.request_reset();
            }
            Control::Quit => break,
        }
    }

    info!("Shutdown requested, exiting");
    handle.join()?;
    Ok(())
}

/// Forward `reset` / `quit` lines from stdin. A closed stdin leaves the host
/// running until Ctrl-C.
fn read_operator_commands(tx: mpsc::Sender<Control>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else {
            break;
        };
        let control = match line.trim() {
            "" => continue,
            "reset" => Control::Reset,
            "quit" | "exit" => Control::Quit,
            other => {
                warn!("Unknown command '{}' (expected 'reset' or 'quit')", other);
                continue;
            }
        };
        if tx.send(control).is_err() {
            break;
        }
    }
}

fn run_client(call: impl std::future::Future<Output = Result<()>>) -> Result<()> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(call)
}

fn parse_kwgs(raw: Option<&str>) -> Result<BTreeMap<String, WireValue>> {
    let Some(raw) = raw else {
        return Ok(BTreeMap::new());
    };
    match serde_json::from_str::<JsonValue>(raw).context("--kwgs is not valid JSON")? {
        JsonValue::Object(map) => Ok(map
            .into_iter()
            .map(|(k, v)| (k, WireValue::from(v)))
            .collect()),
        other => anyhow::bail!("--kwgs must be a JSON object, got {}", other),
    }
}

fn print_value(value: WireValue) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&JsonValue::from(value))?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kwgs() {
        assert!(parse_kwgs(None).unwrap().is_empty());

        let kwgs = parse_kwgs(Some(r#"{"name": "Reel", "count": 2}"#)).unwrap();
        assert_eq!(kwgs["name"].as_str(), Some("Reel"));
        assert_eq!(kwgs["count"].as_i64(), Some(2));

        assert!(parse_kwgs(Some("[1, 2]")).is_err());
        assert!(parse_kwgs(Some("{")).is_err());
    }

    #[test]
    fn test_cli_parses_call() {
        let args = Args::try_parse_from([
            "daisychain-rpc",
            "--framing",
            "length-prefixed",
            "call",
            "GetName",
            "--root-type",
            "Project",
            "--root-id",
            "abc",
        ])
        .unwrap();
        assert_eq!(args.framing, Framing::LengthPrefixed);
        match args.command {
            Command::Call {
                method, root_id, ..
            } => {
                assert_eq!(method, "GetName");
                assert_eq!(root_id.as_deref(), Some("abc"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
