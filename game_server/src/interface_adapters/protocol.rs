// Wire protocol DTOs and conversions for socket clients.

use crate::domain::{Location, Notification, PointSummary};
use serde::{Deserialize, Serialize};

/// Messages the server pushes to connected clients over the WebSocket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    // Fresh data of one point for one user.
    PointData(PointDataDto),
    // The user entered or left the range of a point.
    PointRange(PointRangeDto),
    // Every point the user can currently see.
    GameData(GameDataDto),
    // Another user's latest location.
    UserLocation(UserLocationDto),
    PointRemoved(PointRemovedDto),
    VisiblePoints(VisiblePointsDto),
    // Request-level failure reported back to the sender only.
    Error(ErrorDto),
}

/// Messages the client sends to the server over the WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    Location(LocationDto),
    RefreshAssignments,
    VisiblePoints,
    RemovePoint(RemovePointDto),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationDto {
    pub lat: f64,
    pub lon: f64,
}

impl LocationDto {
    /// Rejects coordinates outside the WGS84 bounds.
    pub fn validated(self) -> Option<Location> {
        let valid = self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon);
        valid.then(|| Location::new(self.lat, self.lon))
    }
}

impl From<Location> for LocationDto {
    fn from(location: Location) -> Self {
        Self {
            lat: location.lat,
            lon: location.lon,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemovePointDto {
    pub point: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PointViewDto {
    pub name: String,
    pub in_range: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ally: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PointDataDto {
    pub point: String,
    pub game: String,
    pub data: PointViewDto,
}

#[derive(Debug, Clone, Serialize)]
pub struct PointRangeDto {
    pub point: String,
    pub name: String,
    pub in_range: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PointSummaryDto {
    pub point: String,
    #[serde(flatten)]
    pub data: PointViewDto,
}

impl From<&PointSummary> for PointSummaryDto {
    fn from(summary: &PointSummary) -> Self {
        Self {
            point: summary.point.to_string(),
            data: PointViewDto {
                name: summary.view.name.clone(),
                in_range: summary.view.in_range,
                ally: summary.view.ally,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GameDataDto {
    pub game: String,
    pub points: Vec<PointSummaryDto>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserLocationDto {
    pub game: String,
    pub user: String,
    pub location: LocationDto,
}

#[derive(Debug, Clone, Serialize)]
pub struct PointRemovedDto {
    pub game: String,
    pub point: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VisiblePointsDto {
    pub game: String,
    pub points: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDto {
    pub message: String,
}

impl From<&Notification> for ServerMessage {
    fn from(notification: &Notification) -> Self {
        match notification {
            Notification::PointData { point, game, data } => {
                ServerMessage::PointData(PointDataDto {
                    point: point.to_string(),
                    game: game.to_string(),
                    data: PointViewDto {
                        name: data.name.clone(),
                        in_range: data.in_range,
                        ally: data.ally,
                    },
                })
            }
            Notification::PointRange {
                point,
                name,
                in_range,
            } => ServerMessage::PointRange(PointRangeDto {
                point: point.to_string(),
                name: name.clone(),
                in_range: *in_range,
            }),
            Notification::GameData { game, points } => ServerMessage::GameData(GameDataDto {
                game: game.to_string(),
                points: points.iter().map(PointSummaryDto::from).collect(),
            }),
            Notification::UserLocation {
                game,
                user,
                location,
            } => ServerMessage::UserLocation(UserLocationDto {
                game: game.to_string(),
                user: user.to_string(),
                location: (*location).into(),
            }),
            Notification::PointRemoved { game, point } => {
                ServerMessage::PointRemoved(PointRemovedDto {
                    game: game.to_string(),
                    point: point.to_string(),
                })
            }
            Notification::VisiblePoints { game, points } => {
                ServerMessage::VisiblePoints(VisiblePointsDto {
                    game: game.to_string(),
                    points: points.iter().map(ToString::to_string).collect(),
                })
            }
        }
    }
}
