//! Session lifecycle states.

use serde::{Deserialize, Serialize};

/// Where a generation session is in its lifecycle.
///
/// ```text
/// Created -> Planning -> Drafting -> Validating -> Complete
///     \          \           \            \
///      +----------+-----------+------------+--> Cancelled | Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Planning,
    Drafting,
    Validating,
    Complete,
    Cancelled,
    Failed,
}

impl SessionState {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Complete | SessionState::Cancelled | SessionState::Failed
        )
    }

    /// Check whether moving to `next` is allowed.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        match (*self, next) {
            (Created, Planning) | (Planning, Drafting) | (Drafting, Validating) | (Validating, Complete) => true,
            (from, Cancelled | Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Created => "created",
            SessionState::Planning => "planning",
            SessionState::Drafting => "drafting",
            SessionState::Validating => "validating",
            SessionState::Complete => "complete",
            SessionState::Cancelled => "cancelled",
            SessionState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    #[test]
    fn test_forward_path() {
        assert!(Created.can_transition_to(Planning));
        assert!(Planning.can_transition_to(Drafting));
        assert!(Drafting.can_transition_to(Validating));
        assert!(Validating.can_transition_to(Complete));
    }

    #[test]
    fn test_no_skipping_or_going_back() {
        assert!(!Created.can_transition_to(Drafting));
        assert!(!Drafting.can_transition_to(Planning));
        assert!(!Planning.can_transition_to(Complete));
        assert!(!Created.can_transition_to(Created));
    }

    #[test]
    fn test_cancel_and_fail_from_non_terminal_only() {
        for state in [Created, Planning, Drafting, Validating] {
            assert!(state.can_transition_to(Cancelled));
            assert!(state.can_transition_to(Failed));
        }
        for state in [Complete, Cancelled, Failed] {
            assert!(state.is_terminal());
            assert!(!state.can_transition_to(Cancelled));
            assert!(!state.can_transition_to(Failed));
            assert!(!state.can_transition_to(Planning));
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Validating.to_string(), "validating");
    }
}
