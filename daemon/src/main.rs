// modemlinkd -- runs the modemlink bridge against real devices, or inspects
// the AT engine's tables from the command line.
//
// Usage:
//   modemlinkd run --raw-device /dev/ttyS1 --base-path /dev/ts0710mux
//   modemlinkd run --slots 2 --dual-sim --duration 60
//   modemlinkd timeout AT+COPS=?
//   modemlinkd classify "+CME ERROR: 10" --pending
//
// Logging is controlled with RUST_LOG (default `info`).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use modemlink_at::{TimeoutPolicy, classify};
use modemlink_bridge::{BridgeBuilder, DEFAULT_MANAGEMENT_SOCKET};
use modemlink_core::BridgeEvent;
use modemlink_transport::{FlowControl, SerialConfig, SerialDevices};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// modemlink daemon -- bridges the telephony framework to a multiplexed modem.
#[derive(Parser)]
#[command(name = "modemlinkd", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the bridge and log its events until Ctrl-C.
    Run(RunArgs),

    /// Print the timeout the policy table assigns to a command.
    Timeout {
        /// AT command text, e.g. AT+COPS=?
        command: String,
    },

    /// Classify one response line.
    Classify {
        /// Line text without terminator.
        line: String,

        /// Classify as if a command were pending on the channel.
        #[arg(long)]
        pending: bool,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Raw (pre-multiplex) modem device.
    #[arg(long, default_value = "/dev/ttyS1")]
    raw_device: String,

    /// Channel device prefix; channel N opens <base-path>N.
    #[arg(long, default_value = "/dev/ts0710mux")]
    base_path: String,

    /// Management endpoint socket.
    #[arg(long, default_value = DEFAULT_MANAGEMENT_SOCKET)]
    socket: PathBuf,

    /// Number of radio slots.
    #[arg(long, default_value_t = 1)]
    slots: u8,

    /// Logical channels per slot.
    #[arg(long, default_value_t = 4)]
    channels: usize,

    /// Run the modem in dual-SIM mode (needs --slots 2 or more).
    #[arg(long)]
    dual_sim: bool,

    /// Baud rate of the raw device.
    #[arg(long, default_value_t = 115200)]
    baud: u32,

    /// Use RTS/CTS flow control on the raw device.
    #[arg(long)]
    hw_flow: bool,

    /// Seconds between channel bring-up retries.
    #[arg(long, default_value_t = 1)]
    retry_secs: u64,

    /// Seconds between management reconnect attempts.
    #[arg(long, default_value_t = 2)]
    reconnect_secs: u64,

    /// Give up on a handshake command after this many seconds (0 = never).
    #[arg(long, default_value_t = 0)]
    handshake_deadline: u64,

    /// Stop after this many seconds (0 = run until Ctrl-C).
    #[arg(long, default_value_t = 0)]
    duration: u64,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_run(args: &RunArgs) -> Result<()> {
    let raw = SerialConfig {
        baud_rate: args.baud,
        flow_control: if args.hw_flow {
            FlowControl::Hardware
        } else {
            FlowControl::None
        },
        ..Default::default()
    };

    let mut builder = BridgeBuilder::new()
        .raw_device(&args.raw_device)
        .base_path(&args.base_path)
        .management_socket(&args.socket)
        .slots(args.slots)
        .channels_per_slot(args.channels)
        .dual_sim(args.dual_sim)
        .retry_interval(Duration::from_secs(args.retry_secs))
        .reconnect_interval(Duration::from_secs(args.reconnect_secs))
        .devices(Arc::new(SerialDevices::new(raw, SerialConfig::default())));
    if args.handshake_deadline > 0 {
        builder = builder.handshake_deadline(Duration::from_secs(args.handshake_deadline));
    }

    let bridge = builder.build().context("failed to start bridge")?;
    let mut events = bridge.subscribe();
    info!(raw = %args.raw_device, socket = %args.socket.display(), "modemlinkd running");

    let deadline = async {
        if args.duration > 0 {
            tokio::time::sleep(Duration::from_secs(args.duration)).await;
        } else {
            std::future::pending::<()>().await;
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for Ctrl-C")?;
                info!("interrupted");
                break;
            }
            _ = &mut deadline => {
                info!("run duration elapsed");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(n)) => warn!(missed = n, "event consumer lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    bridge.shutdown().await;
    Ok(())
}

fn log_event(event: &BridgeEvent) {
    match event {
        BridgeEvent::ModemStatusChanged(status) => {
            info!(kind = ?status.kind, raw = %status.raw.trim(), "modem status")
        }
        BridgeEvent::RadioStateChanged { slot, state } => {
            info!(slot = %slot, state = %state, "radio state")
        }
        BridgeEvent::SimStatusChanged { slot } => info!(slot = %slot, "sim status changed"),
        BridgeEvent::ChannelsReady { slot } => info!(slot = %slot, "channels ready"),
        BridgeEvent::Unsolicited {
            slot,
            channel,
            line,
        } => info!(slot = %slot, channel = %channel, line = %line, "unsolicited"),
    }
}

fn cmd_timeout(command: &str) {
    let timeout = TimeoutPolicy::default().lookup(command);
    println!("{command}: {}s", timeout.as_secs());
}

fn cmd_classify(line: &str, pending: bool) {
    println!("{:?}", classify(line, pending));
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Command::Run(args) => cmd_run(args).await,
        Command::Timeout { command } => {
            cmd_timeout(command);
            Ok(())
        }
        Command::Classify { line, pending } => {
            cmd_classify(line, *pending);
            Ok(())
        }
    }
}
