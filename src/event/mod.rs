//! Lifecycle events emitted by the supervisor.
//!
//! The supervisor hands every notification about its child to a single
//! unbounded channel carrying [`SupervisorEvent`]. A collaborator either
//! matches on the events itself or implements [`EventHandler`] and lets
//! [`pump`] drive the four callbacks.
//!
//! # Ordering
//!
//! - Events from one source (stdout, stderr, exit) arrive in the order the
//!   child produced them.
//! - `Started` always precedes `Ready` and `Ended` of the same launch.
//! - `Error` may arrive at any point, including as the only event of a
//!   launch whose process never started.
//!
//! Unbounded is appropriate here because lifecycle events are low-frequency;
//! the only chatty source is stderr and each chunk is already one read.

use std::ops::ControlFlow;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::process::HandshakePort;

pub type EventSender = UnboundedSender<SupervisorEvent>;
pub type EventReceiver = UnboundedReceiver<SupervisorEvent>;

/// Where an `Error` event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorOrigin {
    /// The process could not be created, or the launch was rejected.
    Launch,
    /// Raw diagnostic text the child wrote to its standard error.
    Stderr,
    /// An I/O failure while monitoring a running child.
    Io,
}

/// One lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SupervisorEvent {
    /// The OS confirmed the child process is running.
    Started,

    /// The child wrote a chunk to stdout. `port` is the parsed chunk or -1.
    Ready { port: i32 },

    /// The child exited with this code.
    Ended { exit_code: i32 },

    /// Launch failure, stderr chunk, or monitoring error.
    Error { origin: ErrorOrigin, message: String },
}

impl SupervisorEvent {
    pub fn ready(port: HandshakePort) -> Self {
        SupervisorEvent::Ready { port: port.raw() }
    }

    pub fn error(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        SupervisorEvent::Error {
            origin,
            message: message.into(),
        }
    }

    /// True for the event after which no further events of this launch follow.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SupervisorEvent::Ended { .. }
                | SupervisorEvent::Error {
                    origin: ErrorOrigin::Launch,
                    ..
                }
        )
    }
}

/// Creates the channel pair the supervisor emits on.
pub fn init_event_source() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Explicit subscriptions to the four lifecycle notifications.
///
/// Every callback defaults to a no-op that keeps the pump running, so a
/// handler only overrides what it cares about. Returning
/// `ControlFlow::Break(())` stops [`pump`].
pub trait EventHandler {
    fn on_start(&mut self) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    fn on_ready(&mut self, _port: HandshakePort) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    fn on_end(&mut self, _exit_code: i32) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    fn on_error(&mut self, _origin: ErrorOrigin, _message: &str) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

/// Routes one event to the matching callback.
pub fn dispatch<H: EventHandler + ?Sized>(handler: &mut H, event: &SupervisorEvent) -> ControlFlow<()> {
    match event {
        SupervisorEvent::Started => handler.on_start(),
        SupervisorEvent::Ready { port } => handler.on_ready(HandshakePort::from_raw(*port)),
        SupervisorEvent::Ended { exit_code } => handler.on_end(*exit_code),
        SupervisorEvent::Error { origin, message } => handler.on_error(*origin, message),
    }
}

/// Feeds events to `handler` until it breaks or the supervisor is gone.
///
/// Returns `true` if the handler asked to stop, `false` if the channel closed.
pub async fn pump<H: EventHandler + ?Sized>(events: &mut EventReceiver, handler: &mut H) -> bool {
    while let Some(event) = events.recv().await {
        if dispatch(handler, &event).is_break() {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Vec<String>,
    }

    impl EventHandler for Recorder {
        fn on_start(&mut self) -> ControlFlow<()> {
            self.seen.push("start".to_string());
            ControlFlow::Continue(())
        }

        fn on_ready(&mut self, port: HandshakePort) -> ControlFlow<()> {
            self.seen.push(format!("ready:{}", port.raw()));
            ControlFlow::Continue(())
        }

        fn on_end(&mut self, exit_code: i32) -> ControlFlow<()> {
            self.seen.push(format!("end:{}", exit_code));
            ControlFlow::Break(())
        }

        fn on_error(&mut self, origin: ErrorOrigin, message: &str) -> ControlFlow<()> {
            self.seen.push(format!("error:{:?}:{}", origin, message));
            ControlFlow::Continue(())
        }
    }

    #[test]
    fn test_dispatch_routes_each_variant() {
        let mut rec = Recorder::default();
        let events = [
            SupervisorEvent::Started,
            SupervisorEvent::Ready { port: 8080 },
            SupervisorEvent::error(ErrorOrigin::Stderr, "boom"),
            SupervisorEvent::Ended { exit_code: 3 },
        ];
        for ev in &events {
            let _flow = dispatch(&mut rec, ev);
        }
        assert_eq!(rec.seen, vec!["start", "ready:8080", "error:Stderr:boom", "end:3"]);
    }

    #[test]
    fn test_default_handler_never_breaks() {
        struct Nothing;
        impl EventHandler for Nothing {}

        let mut h = Nothing;
        assert!(dispatch(&mut h, &SupervisorEvent::Ended { exit_code: 0 }).is_continue());
        assert!(dispatch(&mut h, &SupervisorEvent::Ready { port: -1 }).is_continue());
    }

    #[tokio::test]
    async fn test_pump_stops_on_break() {
        let (tx, mut rx) = init_event_source();
        tx.send(SupervisorEvent::Started).unwrap();
        tx.send(SupervisorEvent::Ready { port: -1 }).unwrap();
        tx.send(SupervisorEvent::Ended { exit_code: 0 }).unwrap();
        tx.send(SupervisorEvent::Started).unwrap();

        let mut rec = Recorder::default();
        assert!(pump(&mut rx, &mut rec).await);
        assert_eq!(rec.seen, vec!["start", "ready:-1", "end:0"]);
        // the event after the break is left in the channel
        assert_eq!(rx.try_recv().unwrap(), SupervisorEvent::Started);
    }

    #[tokio::test]
    async fn test_pump_returns_false_when_channel_closes() {
        let (tx, mut rx) = init_event_source();
        tx.send(SupervisorEvent::Started).unwrap();
        drop(tx);

        let mut rec = Recorder::default();
        assert!(!pump(&mut rx, &mut rec).await);
        assert_eq!(rec.seen, vec!["start"]);
    }

    #[test]
    fn test_terminal_events() {
        assert!(SupervisorEvent::Ended { exit_code: 1 }.is_terminal());
        assert!(SupervisorEvent::error(ErrorOrigin::Launch, "missing").is_terminal());
        assert!(!SupervisorEvent::error(ErrorOrigin::Stderr, "warn").is_terminal());
        assert!(!SupervisorEvent::Started.is_terminal());
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_string(&SupervisorEvent::Ready { port: 8080 }).unwrap();
        assert_eq!(json, r#"{"event":"ready","port":8080}"#);

        let json = serde_json::to_string(&SupervisorEvent::error(ErrorOrigin::Stderr, "x")).unwrap();
        assert_eq!(json, r#"{"event":"error","origin":"stderr","message":"x"}"#);
    }
}
