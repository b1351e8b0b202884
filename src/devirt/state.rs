//! Per-method devirtualization states.

use log::trace;

use crate::{metadata::Token, Result};

/// Stage of one method's recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum DevirtState {
    /// Nothing read yet
    Start,
    /// Header and exception table read, header types resolved
    HeaderRead,
    /// Instructions decoded
    InstructionDecode,
    /// Branch targets rewritten to instruction labels
    BranchFixup,
    /// Exception handlers rewritten to instruction labels
    ExceptionHandlerFixup,
    /// Fully recovered body written back
    Spliced,
    /// Degraded body recovered up to a placeholder
    PartiallyRecovered,
    /// Nothing usable recovered
    Unrecoverable,
}

impl DevirtState {
    /// Returns `true` for the three outcomes.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DevirtState::Spliced | DevirtState::PartiallyRecovered | DevirtState::Unrecoverable
        )
    }

    /// Returns `true` if `next` may follow `self`.
    ///
    /// Any non-terminal state may fail into [`DevirtState::Unrecoverable`];
    /// degraded methods skip handler fixup.
    #[must_use]
    pub fn can_advance(self, next: DevirtState) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (_, DevirtState::Unrecoverable)
                | (DevirtState::Start, DevirtState::HeaderRead)
                | (DevirtState::HeaderRead, DevirtState::InstructionDecode)
                | (DevirtState::InstructionDecode, DevirtState::BranchFixup)
                | (DevirtState::BranchFixup, DevirtState::ExceptionHandlerFixup)
                | (DevirtState::BranchFixup, DevirtState::PartiallyRecovered)
                | (DevirtState::ExceptionHandlerFixup, DevirtState::Spliced)
        )
    }
}

/// Tracks the state of one method and rejects out-of-order transitions.
#[derive(Debug, Clone)]
pub struct StateTracker {
    token: Token,
    state: DevirtState,
    history: Vec<DevirtState>,
}

impl StateTracker {
    /// Starts tracking `token` in [`DevirtState::Start`].
    #[must_use]
    pub fn new(token: Token) -> Self {
        StateTracker {
            token,
            state: DevirtState::Start,
            history: vec![DevirtState::Start],
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> DevirtState {
        self.state
    }

    /// Every state visited, in order.
    #[must_use]
    pub fn history(&self) -> &[DevirtState] {
        &self.history
    }

    /// Moves to `next`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a transition the state machine
    /// does not allow.
    pub fn advance(&mut self, next: DevirtState) -> Result<()> {
        if !self.state.can_advance(next) {
            return Err(malformed_error!(
                "Method {} cannot move from {} to {}",
                self.token,
                self.state,
                next
            ));
        }
        trace!("Method {}: {} -> {}", self.token, self.state, next);
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    /// Moves to [`DevirtState::Unrecoverable`] unless already terminal.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            trace!("Method {}: {} -> {}", self.token, self.state, DevirtState::Unrecoverable);
            self.state = DevirtState::Unrecoverable;
            self.history.push(DevirtState::Unrecoverable);
        }
    }
}
