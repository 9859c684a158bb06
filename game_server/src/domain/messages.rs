// Push notifications the live core emits through the push port.

use crate::domain::entities::{GameId, Location, PointId, UserId};

/// Point data as a given user should see it.
#[derive(Debug, Clone, PartialEq)]
pub struct PointView {
    pub name: String,
    pub in_range: bool,
    /// Only set when the game plays in teams.
    pub ally: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointSummary {
    pub point: PointId,
    pub view: PointView,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    PointData {
        point: PointId,
        game: GameId,
        data: PointView,
    },
    PointRange {
        point: PointId,
        name: String,
        in_range: bool,
    },
    GameData {
        game: GameId,
        points: Vec<PointSummary>,
    },
    UserLocation {
        game: GameId,
        user: UserId,
        location: Location,
    },
    PointRemoved {
        game: GameId,
        point: PointId,
    },
    VisiblePoints {
        game: GameId,
        points: Vec<PointId>,
    },
}
