//! Main entry point for the slater host.
//!
//! Launches the `core` child once, prints its lifecycle events to stdout and
//! exits with the child's exit code. Ctrl-C tears the child down.

use std::ops::ControlFlow;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use slater_host::event::{pump, ErrorOrigin, EventHandler, SupervisorEvent};
use slater_host::process::HandshakePort;
use slater_host::utils::logger;
use slater_host::{Supervisor, SupervisorConfig};

// Conventional status for "terminated by Ctrl-C"
const INTERRUPTED_EXIT: u8 = 130;

#[derive(Parser, Debug)]
#[command(name = "slater-host", about = "Launch the core process and report its lifecycle")]
struct Cli {
    /// Working directory handed to the child; empty means the child's default
    #[arg(default_value = "")]
    working_dir: String,

    /// JSON supervisor config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory containing the `core` executable (defaults to this program's directory)
    #[arg(long)]
    exe_dir: Option<PathBuf>,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,
}

/// Prints every event and decides when the host is done and with which status.
struct Host {
    json: bool,
    exit_code: Option<u8>,
}

impl Host {
    fn new(json: bool) -> Self {
        Self {
            json,
            exit_code: None,
        }
    }

    fn print(&self, event: &SupervisorEvent) {
        if self.json {
            match serde_json::to_string(event) {
                Ok(line) => println!("{}", line),
                Err(e) => error!("Failed to encode event {:?}: {}", event, e),
            }
            return;
        }
        match event {
            SupervisorEvent::Started => println!("started"),
            SupervisorEvent::Ready { port } => {
                println!("ready port={}", HandshakePort::from_raw(*port))
            }
            SupervisorEvent::Ended { exit_code } => println!("ended exit_code={}", exit_code),
            SupervisorEvent::Error { origin, message } => {
                println!("error [{:?}] {}", origin, message.trim_end())
            }
        }
    }
}

impl EventHandler for Host {
    fn on_start(&mut self) -> ControlFlow<()> {
        self.print(&SupervisorEvent::Started);
        ControlFlow::Continue(())
    }

    fn on_ready(&mut self, port: HandshakePort) -> ControlFlow<()> {
        self.print(&SupervisorEvent::ready(port));
        ControlFlow::Continue(())
    }

    fn on_end(&mut self, exit_code: i32) -> ControlFlow<()> {
        self.print(&SupervisorEvent::Ended { exit_code });
        self.exit_code = Some(u8::try_from(exit_code).unwrap_or(1));
        ControlFlow::Break(())
    }

    fn on_error(&mut self, origin: ErrorOrigin, message: &str) -> ControlFlow<()> {
        self.print(&SupervisorEvent::error(origin, message));
        if origin == ErrorOrigin::Launch {
            // the process never started; no end will follow
            self.exit_code = Some(1);
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize logging before anything else
    let _log_guard = logger::init_logging();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SupervisorConfig::load(path)?,
        None => SupervisorConfig::default(),
    };
    if let Some(dir) = cli.exe_dir {
        config.executable_dir = Some(dir);
    }

    let (mut supervisor, mut events) =
        Supervisor::new(config).context("Failed to create supervisor")?;
    supervisor.launch(cli.working_dir);

    let mut host = Host::new(cli.json);
    let interrupted = tokio::select! {
        stopped = pump(&mut events, &mut host) => {
            if !stopped {
                warn!("event channel closed before the child finished");
            }
            false
        }
        res = tokio::signal::ctrl_c() => {
            res.context("Failed to listen for Ctrl-C")?;
            true
        }
    };
    if interrupted {
        info!("interrupted, shutting down child");
        supervisor.shutdown();
        host.exit_code = Some(INTERRUPTED_EXIT);
    }

    Ok(ExitCode::from(host.exit_code.unwrap_or(1)))
}
