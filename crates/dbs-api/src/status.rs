use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The status of a migration request or migration block row.
///
/// Transitions are restricted to a fixed set (see [`MigrationStatus::transition`]);
/// nothing outside that function may move a row between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum MigrationStatus {
    Pending = 0,
    InProgress = 1,
    Completed = 2,
    Failed = 3,
    TermFailed = 9,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("illegal status transition {from:?} -> {to:?}")]
pub struct IllegalTransition {
    pub from: MigrationStatus,
    pub to: MigrationStatus,
}

impl MigrationStatus {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(Self::Pending),
            1 => Some(Self::InProgress),
            2 => Some(Self::Completed),
            3 => Some(Self::Failed),
            9 => Some(Self::TermFailed),
            _ => None,
        }
    }

    /// Canonical string form used in reports. Never the source's "TEERMINATED" typo.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::TermFailed => "TERM_FAILED",
        }
    }

    /// Attempt to move from `self` to `to`, validating against the allowed
    /// transition matrix: 0->1, 1->2, 1->3, 1->9, 3->1.
    pub fn transition(self, to: Self) -> Result<Self, IllegalTransition> {
        use MigrationStatus::*;
        let allowed = matches!(
            (self, to),
            (Pending, InProgress)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, TermFailed)
                | (Failed, InProgress)
        );
        if allowed {
            Ok(to)
        } else {
            Err(IllegalTransition { from: self, to })
        }
    }
}

impl std::fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use MigrationStatus::*;

    #[test]
    fn allows_documented_transitions() {
        assert_eq!(Pending.transition(InProgress), Ok(InProgress));
        assert_eq!(InProgress.transition(Completed), Ok(Completed));
        assert_eq!(InProgress.transition(Failed), Ok(Failed));
        assert_eq!(InProgress.transition(TermFailed), Ok(TermFailed));
        assert_eq!(Failed.transition(InProgress), Ok(InProgress));
    }

    #[test]
    fn rejects_everything_else() {
        assert!(Pending.transition(Completed).is_err());
        assert!(Completed.transition(InProgress).is_err());
        assert!(TermFailed.transition(InProgress).is_err());
        assert!(Pending.transition(Pending).is_err());
    }

    #[test]
    fn canonical_spelling_is_not_the_source_typo() {
        assert_eq!(TermFailed.as_str(), "TERM_FAILED");
    }
}
