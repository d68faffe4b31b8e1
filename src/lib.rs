//! slater-host - supervision of the slater `core` process
//!
//! This library launches the external `core` executable that sits next to
//! the running program, waits for it to announce its listening port on
//! stdout, forwards its stderr, and reports its exit. A presentation layer
//! drives it through one call and four notifications:
//! - `launch(working_dir)` on a [`Supervisor`]
//! - `Started`, `Ready { port }`, `Ended { exit_code }`, `Error { .. }` on
//!   the event channel returned alongside it
//!
//! # Example
//!
//! ```no_run
//! use slater_host::{Supervisor, SupervisorConfig, SupervisorEvent};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (mut supervisor, mut events) = Supervisor::new(SupervisorConfig::default())?;
//!     supervisor.launch("/home/user/.slater-alt");
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             SupervisorEvent::Ready { port } if port >= 0 => println!("core listening on {}", port),
//!             SupervisorEvent::Ended { exit_code } => {
//!                 println!("core exited with {}", exit_code);
//!                 break;
//!             }
//!             other => println!("{:?}", other),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod process;
pub mod utils;

// Re-export commonly used types
pub use config::{RelaunchPolicy, SupervisorConfig};
pub use error::SupervisorError;
pub use event::{init_event_source, ErrorOrigin, EventHandler, EventReceiver, SupervisorEvent};
pub use process::{HandshakePort, LifecycleState, Supervisor};
