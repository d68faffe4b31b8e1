//! Lifecycle state machine of one supervised child.
//!
//! ```text
//! idle ──launch──► starting ──Started──► running ──Ended──► ended
//!   ▲                 │                                      │
//!   └──── shutdown ───┴──────────── launch ◄─────────────────┘
//! ```
//!
//! `Error` is a notification, not a state: it never moves the machine.

use serde::Serialize;

use crate::event::SupervisorEvent;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Nothing launched yet, or the last child was torn down.
    #[default]
    Idle,
    /// `launch` was called; the OS has not confirmed the start. A launch
    /// whose spawn failed stays here.
    Starting,
    /// The child is executing.
    Running,
    /// The child exited and was reaped.
    Ended,
}

impl LifecycleState {
    /// State after `event` is delivered.
    pub fn on_event(self, event: &SupervisorEvent) -> LifecycleState {
        match (self, event) {
            (LifecycleState::Starting, SupervisorEvent::Started) => LifecycleState::Running,
            (LifecycleState::Running, SupervisorEvent::Ended { .. }) => LifecycleState::Ended,
            (state, _) => state,
        }
    }
}

/// Bookkeeping shared between the supervisor and its monitor tasks.
///
/// `generation` increases on every launch and teardown. Monitor tasks carry
/// the generation they were started for and may only emit or touch the
/// state while it is still current.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub state: LifecycleState,
    pub generation: u64,
    /// A launch is in flight or its child has not been reaped yet.
    pub in_flight: bool,
    pub pid: Option<u32>,
}

impl Shared {
    /// Starts a new launch and returns its generation.
    pub fn begin_launch(&mut self) -> u64 {
        self.generation += 1;
        self.state = LifecycleState::Starting;
        self.in_flight = true;
        self.pid = None;
        self.generation
    }

    /// Detaches the current launch; its monitor goes silent.
    pub fn tear_down(&mut self) {
        self.generation += 1;
        self.state = LifecycleState::Idle;
        self.in_flight = false;
        self.pid = None;
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }
}
