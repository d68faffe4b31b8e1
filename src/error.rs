//! Error types for the supervisor.
//!
//! None of these are returned from `Supervisor::launch`: launch-time and
//! run-time failures are rendered with `Display` and delivered as
//! `SupervisorEvent::Error`. Only construction and config loading
//! return them directly.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`SupervisorError`].
pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Which child stream a read error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Stdout => f.write_str("stdout"),
            StreamKind::Stderr => f.write_str("stderr"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The OS refused to create the child process.
    #[error("Failed to start {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The directory of the running program could not be determined.
    #[error("Failed to locate child executable: {0}")]
    ExecutablePath(#[source] std::io::Error),

    /// Waiting for the child's exit status failed.
    #[error("Failed to wait for child process: {0}")]
    Wait(#[source] std::io::Error),

    /// Reading one of the child's output streams failed.
    #[error("Failed to read child {stream}: {source}")]
    Read {
        stream: StreamKind,
        #[source]
        source: std::io::Error,
    },

    /// A launch was requested while another child is live and the
    /// relaunch policy is `Reject`.
    #[error("A child process is already running (pid {pid:?}); launch rejected")]
    AlreadyRunning { pid: Option<u32> },

    /// `Supervisor::new` was called outside a tokio runtime.
    #[error("Supervisor must be created inside a tokio runtime: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    /// Invalid configuration file.
    #[error("Configuration error: {0}")]
    Config(String),
}
