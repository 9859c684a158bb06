// Assignment status filter applied to a user's memoized assignments at a point.

use crate::domain::entities::{ApprovalState, Submission};
use serde::Deserialize;

/// Boolean flags selecting assignments by the state of the user's submissions.
///
/// An assignment passes when any enabled flag matches:
/// - `open`: the user has no submission for it yet
/// - `pending`: some submission awaits review
/// - `accepted`: some submission was approved
/// - `rejected`: some submission was rejected
/// - `approved`: some submission carries any review state at all
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AssignmentFilter {
    pub open: bool,
    pub pending: bool,
    pub approved: bool,
    pub accepted: bool,
    pub rejected: bool,
}

impl AssignmentFilter {
    pub const OPEN: Self = Self {
        open: true,
        pending: false,
        approved: false,
        accepted: false,
        rejected: false,
    };

    pub const OPEN_OR_PENDING: Self = Self {
        open: true,
        pending: true,
        approved: false,
        accepted: false,
        rejected: false,
    };

    /// Returns `None` when the filter would let everything through.
    pub fn normalized(self) -> Option<Self> {
        let flags = [
            self.open,
            self.pending,
            self.approved,
            self.accepted,
            self.rejected,
        ];
        if flags.iter().all(|f| *f) || flags.iter().all(|f| !*f) {
            None
        } else {
            Some(self)
        }
    }

    /// Tests one assignment given every submission the user made for it.
    pub fn matches<'a, I>(&self, submissions: I) -> bool
    where
        I: IntoIterator<Item = &'a Submission>,
    {
        let mut any = false;
        let mut pending = false;
        let mut reviewed = false;
        let mut accepted = false;
        let mut rejected = false;

        for submission in submissions {
            any = true;
            match submission.approval {
                ApprovalState::None => {}
                ApprovalState::Pending => pending = true,
                ApprovalState::Approved => accepted = true,
                ApprovalState::Rejected => rejected = true,
            }
            reviewed |= submission.approval != ApprovalState::None;
        }

        (self.open && !any)
            || (self.pending && pending)
            || (self.approved && reviewed)
            || (self.accepted && accepted)
            || (self.rejected && rejected)
    }
}
