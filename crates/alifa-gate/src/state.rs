//! Write actions and the states an attempt moves through.

use alifa_config::{RateLimits, RateRule};
use alifa_core::{GateResult, Rejection};
use std::fmt;

/// A rate-limited write. The name prefixes the rate-limit key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Comment,
    Post,
    PostEdit,
    Like,
    Profile,
    Avatar,
    Privacy,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Comment => "comment",
            Action::Post => "post",
            Action::PostEdit => "post_edit",
            Action::Like => "like",
            Action::Profile => "profile",
            Action::Avatar => "avatar",
            Action::Privacy => "privacy",
        }
    }

    pub fn rule(self, limits: &RateLimits) -> RateRule {
        match self {
            Action::Comment => limits.comment,
            Action::Post => limits.post,
            Action::PostEdit => limits.post_edit,
            Action::Like => limits.like,
            Action::Profile => limits.profile,
            Action::Avatar => limits.avatar,
            Action::Privacy => limits.privacy,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Idle,
    Authenticating,
    RateChecking,
    Validating,
    Sanitizing,
    FileChecking,
    Persisting,
    Succeeded,
    Rejected(&'static str),
}

impl GateState {
    pub fn is_terminal(self) -> bool {
        matches!(self, GateState::Succeeded | GateState::Rejected(_))
    }
}

/// One pass through the gate. Records every state it enters.
#[derive(Debug)]
pub(crate) struct Attempt {
    action: Action,
    trail: Vec<GateState>,
}

impl Attempt {
    pub(crate) fn start(action: Action) -> Self {
        Self {
            action,
            trail: vec![GateState::Idle],
        }
    }

    pub(crate) fn action(&self) -> Action {
        self.action
    }

    pub(crate) fn enter(&mut self, state: GateState) {
        tracing::debug!(action = %self.action, state = ?state, "write attempt");
        self.trail.push(state);
    }

    pub(crate) fn state(&self) -> GateState {
        self.trail.last().copied().unwrap_or(GateState::Idle)
    }

    /// Moves to the terminal state matching `result`.
    pub(crate) fn finish<T>(mut self, result: GateResult<T>) -> GateResult<T> {
        match &result {
            Ok(_) => self.enter(GateState::Succeeded),
            Err(rejection) => {
                let during = self.state();
                self.trail.push(GateState::Rejected(rejection.code()));
                log_rejection(self.action, during, rejection);
            }
        }
        result
    }

    #[cfg(test)]
    pub(crate) fn trail(&self) -> &[GateState] {
        &self.trail
    }
}

fn log_rejection(action: Action, during: GateState, rejection: &Rejection) {
    match rejection {
        Rejection::StorageFailure => {
            tracing::error!(action = %action, state = ?during, code = rejection.code(), "write rejected")
        }
        _ => tracing::warn!(action = %action, state = ?during, code = rejection.code(), "write rejected"),
    }
}
