// Runtime location state for one participant of a running game.

use crate::domain::entities::{GameRole, Location, UserId};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
struct StampedLocation {
    location: Location,
    at_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiveUser {
    pub id: UserId,
    last: Option<StampedLocation>,
}

impl LiveUser {
    pub fn new(id: UserId) -> Self {
        Self { id, last: None }
    }

    /// Overwrites the last known location. Bounds are validated upstream.
    pub fn set_location(&mut self, location: Location, now_ms: u64) {
        self.last = Some(StampedLocation {
            location,
            at_ms: now_ms,
        });
    }

    /// Last known location, however old.
    pub fn location(&self) -> Option<Location> {
        self.last.map(|l| l.location)
    }

    pub fn location_stamp_ms(&self) -> Option<u64> {
        self.last.map(|l| l.at_ms)
    }

    /// The location only while its age is below `decay`.
    pub fn recent_location(&self, now_ms: u64, decay: Duration) -> Option<Location> {
        let last = self.last?;
        let age = now_ms.saturating_sub(last.at_ms);
        (u128::from(age) < decay.as_millis()).then_some(last.location)
    }

    pub fn has_recent_location(&self, now_ms: u64, decay: Duration) -> bool {
        self.recent_location(now_ms, decay).is_some()
    }

    /// Whether `viewer` may see this user on the map.
    ///
    /// Spectators are always shown. Participants are shown to spectators, and to
    /// other participants only while their location is recent. Users with any
    /// other role (or no role) are never shown, nor is a user without a location.
    pub fn is_visible_to(
        &self,
        own_role: Option<GameRole>,
        viewer: &LiveUser,
        viewer_role: Option<GameRole>,
        now_ms: u64,
        decay: Duration,
    ) -> bool {
        if viewer.id == self.id || self.last.is_none() {
            return false;
        }

        match own_role {
            Some(GameRole::Spectator) => true,
            Some(GameRole::Participant) => {
                viewer_role == Some(GameRole::Spectator) || self.has_recent_location(now_ms, decay)
            }
            Some(GameRole::Requested) | None => false,
        }
    }
}
