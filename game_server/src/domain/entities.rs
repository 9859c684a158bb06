// Persistent records the live core reads through the store port, plus their ids.

use crate::domain::errors::LiveError;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! object_id {
    ($name:ident, $kind:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Parses a 24-character hexadecimal object id.
            pub fn parse(value: &str) -> Result<Self, LiveError> {
                if is_valid_object_id(value) {
                    Ok(Self(value.to_ascii_lowercase()))
                } else {
                    Err(LiveError::InvalidId {
                        kind: $kind,
                        value: value.to_string(),
                    })
                }
            }

            pub fn is_valid(value: &str) -> bool {
                is_valid_object_id(value)
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = LiveError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(&value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

object_id!(GameId, "game");
object_id!(PointId, "point");
object_id!(UserId, "user");
object_id!(AssignmentId, "assignment");
object_id!(SubmissionId, "submission");
object_id!(TeamId, "team");

fn is_valid_object_id(value: &str) -> bool {
    value.len() == 24 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Identifies one socket connection; a user may hold several.
pub type ConnectionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStage {
    Open,
    Running,
    Finished,
}

impl GameStage {
    /// Maps the stored numeric stage; anything past 2 counts as finished.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => GameStage::Open,
            1 => GameStage::Running,
            _ => GameStage::Finished,
        }
    }

    pub fn is_finished(self) -> bool {
        self >= GameStage::Finished
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameRole {
    Participant,
    Spectator,
    Requested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalState {
    #[default]
    None,
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub name: String,
    pub stage: GameStage,
    #[serde(default)]
    pub teams_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Point {
    pub id: PointId,
    pub name: String,
    pub game: GameId,
    pub creator: UserId,
    pub location: Location,
    // Game-specific counters; the visibility core never reads them.
    #[serde(default)]
    pub level: Option<i64>,
    #[serde(default)]
    pub defence: Option<i64>,
    #[serde(default)]
    pub in_count: Option<i64>,
    #[serde(default)]
    pub out_count: Option<i64>,
    #[serde(default)]
    pub team: Option<TeamId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub game: GameId,
    pub creator: UserId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub points: i64,
    #[serde(default)]
    pub accept_text: bool,
    #[serde(default)]
    pub accept_file: bool,
    #[serde(default)]
    pub retry: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub assignment: AssignmentId,
    pub user: UserId,
    #[serde(default)]
    pub approver: Option<UserId>,
    #[serde(default)]
    pub approval: ApprovalState,
    #[serde(default)]
    pub text_answer: Option<String>,
    #[serde(default)]
    pub file_answer: Option<String>,
}
