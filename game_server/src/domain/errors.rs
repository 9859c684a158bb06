use crate::domain::entities::{GameId, PointId};
use thiserror::Error;

// Domain-level errors for the live game core.
#[derive(Debug, Clone, Error)]
pub enum LiveError {
    #[error("invalid {kind} id: {value:?}")]
    InvalidId { kind: &'static str, value: String },

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("permission lookup failed: {0}")]
    Permission(String),

    #[error("user is not allowed to manage this game")]
    Forbidden,

    #[error("{operation} timed out")]
    Timeout { operation: &'static str },

    #[error("point {0} no longer exists")]
    PointMissing(PointId),

    #[error("game {0} does not exist")]
    GameMissing(GameId),

    #[error("point {point} does not belong to game {game}")]
    WrongGame { point: PointId, game: GameId },

    #[error("game {0} is not running")]
    GameNotRunning(GameId),

    #[error("game {0} is already running")]
    AlreadyRunning(GameId),

    #[error("game {0} is shutting down")]
    ShuttingDown(GameId),
}
