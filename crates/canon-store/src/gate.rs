//! One-shot initialization gate.
//!
//! Every public chain operation awaits [`InitGate::wait`] before touching the
//! stores. The gate starts closed, moves to open or failed exactly once, and
//! never closes again.

use tokio::sync::watch;

use canon_core::error::ChainError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateState {
    Closed,
    Open,
    Failed(String),
}

#[derive(Debug)]
pub struct InitGate {
    tx: watch::Sender<GateState>,
}

impl Default for InitGate {
    fn default() -> Self {
        Self::new()
    }
}

impl InitGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(GateState::Closed);
        Self { tx }
    }

    pub fn state(&self) -> GateState {
        self.tx.borrow().clone()
    }

    /// Open the gate. Has no effect unless the gate is still closed.
    pub fn open(&self) {
        self.settle(GateState::Open);
    }

    /// Fail the gate. Waiters receive [`ChainError::InitFailed`].
    pub fn fail(&self, reason: impl Into<String>) {
        self.settle(GateState::Failed(reason.into()));
    }

    fn settle(&self, next: GateState) {
        self.tx.send_if_modified(|state| {
            if *state == GateState::Closed {
                *state = next;
                true
            } else {
                false
            }
        });
    }

    /// Wait until the gate leaves the closed state.
    pub async fn wait(&self) -> Result<(), ChainError> {
        let mut rx = self.tx.subscribe();
        let state = rx
            .wait_for(|state| *state != GateState::Closed)
            .await
            .map_err(|_| ChainError::InitFailed("init gate dropped".into()))?
            .clone();
        match state {
            GateState::Open => Ok(()),
            GateState::Failed(reason) => Err(ChainError::InitFailed(reason)),
            GateState::Closed => unreachable!("wait_for returned a closed gate"),
        }
    }
}
