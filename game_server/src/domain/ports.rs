use async_trait::async_trait;

use crate::domain::entities::{
    AssignmentId, ConnectionId, Game, GameId, GameRole, Point, PointId, Submission, TeamId, UserId,
};
use crate::domain::messages::Notification;

// Port for the persistent store backing games, points and submissions.
#[async_trait]
pub trait GameStore: Send + Sync {
    async fn game(&self, id: &GameId) -> Result<Option<Game>, String>;
    async fn point(&self, id: &PointId) -> Result<Option<Point>, String>;
    async fn points_for_game(&self, game: &GameId) -> Result<Vec<Point>, String>;
    /// Returns false when the record was already gone.
    async fn delete_point(&self, id: &PointId) -> Result<bool, String>;
    /// Assignments that can be completed at the point, in display order.
    async fn point_assignment_ids(&self, point: &PointId) -> Result<Vec<AssignmentId>, String>;
    /// Every submission `user` made for any of `assignments`, in one round-trip.
    async fn submissions_for(
        &self,
        user: &UserId,
        assignments: &[AssignmentId],
    ) -> Result<Vec<Submission>, String>;
    async fn user_team(&self, game: &GameId, user: &UserId) -> Result<Option<TeamId>, String>;
}

// Port for pushing messages to connected clients. Sends are fire-and-forget.
// User and broadcast sends only reach connections opened for `game`.
pub trait PushChannel: Send + Sync {
    fn send_to_user(&self, game: &GameId, user: &UserId, message: &Notification)
    -> Result<(), String>;
    fn send_to_connection(&self, connection: ConnectionId, message: &Notification)
    -> Result<(), String>;
    fn broadcast(&self, game: &GameId, message: &Notification) -> Result<(), String>;
}

// Port answering who may do what in a game.
#[async_trait]
pub trait Permissions: Send + Sync {
    async fn can_manage_game(&self, game: &GameId, user: &UserId) -> Result<bool, String>;
    async fn user_role(&self, game: &GameId, user: &UserId) -> Result<Option<GameRole>, String>;
}

// Port for retrieving the current time.
pub trait Clock: Send + Sync {
    fn now_epoch_millis(&self) -> u64;
}
