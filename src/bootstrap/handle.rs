//! Shared runtime view of the embedded directory.

use std::sync::atomic::{AtomicU16, AtomicU8, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// Lifecycle state of the embedded directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ServerState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    ShuttingDown = 3,
}

impl From<u8> for ServerState {
    fn from(val: u8) -> Self {
        match val {
            1 => ServerState::Starting,
            2 => ServerState::Running,
            3 => ServerState::ShuttingDown,
            _ => ServerState::Stopped,
        }
    }
}

impl ServerState {
    /// Whether `self → next` is an allowed transition.
    pub fn can_transition_to(self, next: ServerState) -> bool {
        use ServerState::*;
        matches!(
            (self, next),
            (Stopped, Starting)
                | (Starting, Running)
                | (Starting, Stopped)
                | (Running, ShuttingDown)
                | (ShuttingDown, Stopped)
        )
    }
}

#[derive(Debug, Default)]
struct Inner {
    // 0 while no listener is bound
    port: AtomicU16,
    state: AtomicU8,
}

/// Cheap, cloneable view of the bound port and lifecycle state.
#[derive(Debug, Clone, Default)]
pub struct RuntimeHandle {
    inner: Arc<Inner>,
}

impl RuntimeHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bound port, present only between a successful start and stop.
    pub fn listening_port(&self) -> Option<u16> {
        match self.inner.port.load(Ordering::Acquire) {
            0 => None,
            port => Some(port),
        }
    }

    pub fn state(&self) -> ServerState {
        ServerState::from(self.inner.state.load(Ordering::Acquire))
    }

    /// Move from `from` to `to`. Fails when the current state is not `from`
    /// or the edge is not allowed.
    pub(crate) fn transition(&self, from: ServerState, to: ServerState) -> Result<(), ServerState> {
        if !from.can_transition_to(to) {
            return Err(self.state());
        }
        self.inner
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| {
                tracing::debug!(from = ?from, to = ?to, "Directory state changed");
            })
            .map_err(ServerState::from)
    }

    pub(crate) fn set_port(&self, port: u16) {
        self.inner.port.store(port, Ordering::Release);
    }

    pub(crate) fn clear_port(&self) {
        self.inner.port.store(0, Ordering::Release);
    }
}
