// Domain layer: records, ids, pure visibility/range rules and the ports.

pub mod entities;
pub mod errors;
pub mod filter;
pub mod geo;
pub mod live_point;
pub mod live_user;
pub mod messages;
pub mod ports;

pub use entities::{
    ApprovalState, Assignment, AssignmentId, ConnectionId, Game, GameId, GameRole, GameStage,
    Location, Point, PointId, Submission, SubmissionId, TeamId, UserId,
};
pub use errors::LiveError;
pub use filter::AssignmentFilter;
pub use live_point::{PointMemory, RangePolicy};
pub use live_user::LiveUser;
pub use messages::{Notification, PointSummary, PointView};
