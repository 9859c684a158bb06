// Transient per-point memory: who was last seen in range, and which
// assignments are memoized per user. Nothing here is persisted.

use crate::domain::entities::{AssignmentId, UserId};
use std::collections::{HashMap, HashSet};

/// Radii deciding whether a user is in range of a point.
///
/// Entry requires `radius_m`; a user already remembered in range stays in range
/// until they move beyond `active_radius_m`. Equal radii disable hysteresis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangePolicy {
    pub radius_m: f64,
    pub active_radius_m: f64,
}

impl RangePolicy {
    pub fn new(radius_m: f64, active_radius_m: f64) -> Self {
        Self {
            radius_m,
            // A smaller active radius would make leaving easier than entering.
            active_radius_m: active_radius_m.max(radius_m),
        }
    }

    pub fn threshold_m(&self, currently_in_range: bool) -> f64 {
        if currently_in_range {
            self.active_radius_m
        } else {
            self.radius_m
        }
    }

    pub fn is_in_range(&self, distance_m: f64, currently_in_range: bool) -> bool {
        distance_m <= self.threshold_m(currently_in_range)
    }
}

#[derive(Debug, Default)]
pub struct PointMemory {
    in_range: HashSet<UserId>,
    assignments: HashMap<UserId, Vec<AssignmentId>>,
}

impl PointMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_range(&self, user: &UserId) -> bool {
        self.in_range.contains(user)
    }

    /// Stores the range flag; returns true only if it flipped.
    pub fn set_in_range(&mut self, user: &UserId, in_range: bool) -> bool {
        if in_range {
            self.in_range.insert(user.clone())
        } else {
            self.in_range.remove(user)
        }
    }

    pub fn assignments(&self, user: &UserId) -> Vec<AssignmentId> {
        self.assignments.get(user).cloned().unwrap_or_default()
    }

    pub fn has_assignments(&self, user: &UserId) -> bool {
        self.assignments.get(user).is_some_and(|ids| !ids.is_empty())
    }

    /// Replaces the user's list, keeping first occurrences in order.
    pub fn set_assignments(&mut self, user: &UserId, ids: Vec<AssignmentId>) {
        let mut seen = HashSet::with_capacity(ids.len());
        let deduped: Vec<AssignmentId> = ids.into_iter().filter(|id| seen.insert(id.clone())).collect();
        if deduped.is_empty() {
            self.assignments.remove(user);
        } else {
            self.assignments.insert(user.clone(), deduped);
        }
    }

    /// Drops the given ids from the user's list; returns how many were removed.
    pub fn remove_assignments(&mut self, user: &UserId, ids: &[AssignmentId]) -> usize {
        let Some(current) = self.assignments.get_mut(user) else {
            return 0;
        };
        let before = current.len();
        current.retain(|id| !ids.contains(id));
        let removed = before - current.len();
        if current.is_empty() {
            self.assignments.remove(user);
        }
        removed
    }
}
