//! Pure match lifecycle state machine.
//!
//! Commands are idempotent: a command that has no defined transition from
//! the current state returns `None` (keep the current state) instead of
//! failing. This keeps "start match" safe to retry and makes repeated
//! commands observationally harmless.
//!
//! `expired -> archived` is reserved for an external retention process and
//! has no command here.

use crate::model::MatchStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchCommand {
    Start,
    End,
}

/// Explicit configuration for two deliberately loose rules, so neither is
/// an accidental policy.
#[derive(Debug, Clone, Copy)]
pub struct LifecyclePolicy {
    /// Permit "end match" while still in setup (skipping `live`).
    /// Disallowing it turns the command into a no-op rather than an
    /// error.
    pub allow_end_from_setup: bool,
    /// Enforce at most one designated goalkeeper per team on roster edits.
    /// When false, goalkeeper uniqueness is only a room-creation
    /// convention.
    pub enforce_goalkeeper_unique: bool,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            allow_end_from_setup: true,
            enforce_goalkeeper_unique: false,
        }
    }
}

/// Computes the next state for a command, or `None` when the command does
/// not move the machine (idempotent repeat, undefined transition, or a
/// transition the policy disables).
pub fn advance(
    status: MatchStatus,
    command: MatchCommand,
    policy: &LifecyclePolicy,
) -> Option<MatchStatus> {
    match (status, command) {
        (MatchStatus::Setup, MatchCommand::Start) => Some(MatchStatus::Live),
        (MatchStatus::Live, MatchCommand::End) => Some(MatchStatus::Expired),
        (MatchStatus::Setup, MatchCommand::End) if policy.allow_end_from_setup => {
            Some(MatchStatus::Expired)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_from_setup_goes_live() {
        let policy = LifecyclePolicy::default();
        assert_eq!(
            advance(MatchStatus::Setup, MatchCommand::Start, &policy),
            Some(MatchStatus::Live)
        );
    }

    #[test]
    fn test_start_is_idempotent() {
        let policy = LifecyclePolicy::default();
        assert_eq!(advance(MatchStatus::Live, MatchCommand::Start, &policy), None);
    }

    #[test]
    fn test_end_from_live_expires() {
        let policy = LifecyclePolicy::default();
        assert_eq!(
            advance(MatchStatus::Live, MatchCommand::End, &policy),
            Some(MatchStatus::Expired)
        );
    }

    #[test]
    fn test_end_from_setup_follows_policy() {
        let lenient = LifecyclePolicy::default();
        assert_eq!(
            advance(MatchStatus::Setup, MatchCommand::End, &lenient),
            Some(MatchStatus::Expired)
        );

        let strict = LifecyclePolicy {
            allow_end_from_setup: false,
            ..LifecyclePolicy::default()
        };
        assert_eq!(advance(MatchStatus::Setup, MatchCommand::End, &strict), None);
    }

    #[test]
    fn test_terminal_states_ignore_commands() {
        let policy = LifecyclePolicy::default();
        for status in [MatchStatus::Expired, MatchStatus::Archived] {
            assert_eq!(advance(status, MatchCommand::Start, &policy), None);
            assert_eq!(advance(status, MatchCommand::End, &policy), None);
        }
    }
}
