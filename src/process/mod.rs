//! Child process supervision.
//!
//! This module starts the external child, watches its stdout, stderr and
//! exit concurrently, parses the port handshake and reports everything as
//! [`SupervisorEvent`](crate::event::SupervisorEvent)s.

mod handshake;
mod state;
mod supervisor;

pub use handshake::HandshakePort;
pub use state::LifecycleState;
pub use supervisor::Supervisor;
