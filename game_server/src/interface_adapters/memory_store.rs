// In-memory persistence and permission backend seeded from a JSON fixture.

use crate::domain::ports::{GameStore, Permissions};
use crate::domain::{
    Assignment, AssignmentId, Game, GameId, GameRole, GameStage, Point, PointId, Submission,
    TeamId, UserId,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("failed to read fixture {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse fixture: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct PointAssignments {
    pub point: PointId,
    pub assignments: Vec<AssignmentId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Membership {
    pub game: GameId,
    pub user: UserId,
    pub role: GameRole,
    #[serde(default)]
    pub team: Option<TeamId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Manager {
    pub game: GameId,
    pub user: UserId,
}

/// Seed data for the in-memory backend.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Fixture {
    pub games: Vec<Game>,
    pub points: Vec<Point>,
    /// Optional; ids listed for a point but owned by another game are hidden.
    pub assignments: Vec<Assignment>,
    pub point_assignments: Vec<PointAssignments>,
    pub submissions: Vec<Submission>,
    pub members: Vec<Membership>,
    pub managers: Vec<Manager>,
}

impl Fixture {
    pub fn from_json(text: &str) -> Result<Self, FixtureError> {
        Ok(serde_json::from_str(text)?)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, FixtureError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| FixtureError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_json(&text)
    }
}

#[derive(Default)]
struct Tables {
    games: HashMap<GameId, Game>,
    points: HashMap<PointId, Point>,
    assignments: HashMap<AssignmentId, Assignment>,
    point_assignments: HashMap<PointId, Vec<AssignmentId>>,
    submissions: Vec<Submission>,
    members: HashMap<(GameId, UserId), Membership>,
    managers: HashSet<(GameId, UserId)>,
}

/// Process-local store; contents live as long as the server.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn from_fixture(fixture: Fixture) -> Self {
        let mut tables = Tables::default();
        for game in fixture.games {
            tables.games.insert(game.id.clone(), game);
        }
        for point in fixture.points {
            tables.points.insert(point.id.clone(), point);
        }
        for assignment in fixture.assignments {
            tables.assignments.insert(assignment.id.clone(), assignment);
        }
        for entry in fixture.point_assignments {
            tables.point_assignments.insert(entry.point, entry.assignments);
        }
        tables.submissions = fixture.submissions;
        for member in fixture.members {
            tables
                .members
                .insert((member.game.clone(), member.user.clone()), member);
        }
        for manager in fixture.managers {
            tables.managers.insert((manager.game, manager.user));
        }
        Self {
            tables: RwLock::new(tables),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Games that should get a live runtime at boot.
    pub fn running_game_ids(&self) -> Vec<GameId> {
        let mut ids: Vec<GameId> = self
            .read()
            .games
            .values()
            .filter(|game| game.stage == GameStage::Running)
            .map(|game| game.id.clone())
            .collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl GameStore for InMemoryStore {
    async fn game(&self, id: &GameId) -> Result<Option<Game>, String> {
        Ok(self.read().games.get(id).cloned())
    }

    async fn point(&self, id: &PointId) -> Result<Option<Point>, String> {
        Ok(self.read().points.get(id).cloned())
    }

    async fn points_for_game(&self, game: &GameId) -> Result<Vec<Point>, String> {
        let mut points: Vec<Point> = self
            .read()
            .points
            .values()
            .filter(|point| &point.game == game)
            .cloned()
            .collect();
        points.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(points)
    }

    async fn delete_point(&self, id: &PointId) -> Result<bool, String> {
        let mut tables = self.write();
        tables.point_assignments.remove(id);
        Ok(tables.points.remove(id).is_some())
    }

    async fn point_assignment_ids(&self, point: &PointId) -> Result<Vec<AssignmentId>, String> {
        let tables = self.read();
        let Some(ids) = tables.point_assignments.get(point) else {
            return Ok(Vec::new());
        };
        let game = tables.points.get(point).map(|p| &p.game);
        Ok(ids
            .iter()
            .filter(|id| match (tables.assignments.get(*id), game) {
                (Some(record), Some(game)) => &record.game == game,
                _ => true,
            })
            .cloned()
            .collect())
    }

    async fn submissions_for(
        &self,
        user: &UserId,
        assignments: &[AssignmentId],
    ) -> Result<Vec<Submission>, String> {
        Ok(self
            .read()
            .submissions
            .iter()
            .filter(|s| &s.user == user && assignments.contains(&s.assignment))
            .cloned()
            .collect())
    }

    async fn user_team(&self, game: &GameId, user: &UserId) -> Result<Option<TeamId>, String> {
        Ok(self
            .read()
            .members
            .get(&(game.clone(), user.clone()))
            .and_then(|member| member.team.clone()))
    }
}

#[async_trait]
impl Permissions for InMemoryStore {
    async fn can_manage_game(&self, game: &GameId, user: &UserId) -> Result<bool, String> {
        Ok(self.read().managers.contains(&(game.clone(), user.clone())))
    }

    async fn user_role(&self, game: &GameId, user: &UserId) -> Result<Option<GameRole>, String> {
        Ok(self
            .read()
            .members
            .get(&(game.clone(), user.clone()))
            .map(|member| member.role))
    }
}
