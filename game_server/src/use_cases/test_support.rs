use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::ports::{Clock, GameStore, Permissions, PushChannel};
use crate::domain::{
    ApprovalState, AssignmentId, ConnectionId, Game, GameId, GameRole, GameStage, Location,
    Notification, Point, PointId, RangePolicy, Submission, SubmissionId, TeamId, UserId,
};
use crate::use_cases::context::{GameContext, LiveSettings, Ports};

pub(crate) const DECAY: Duration = Duration::from_secs(300);
pub(crate) const START_MS: u64 = 1_700_000_000_000;

pub(crate) fn game_id(n: u32) -> GameId {
    GameId::parse(&format!("{:024x}", 0x1000 + n)).expect("valid game id")
}

pub(crate) fn point_id(n: u32) -> PointId {
    PointId::parse(&format!("{:024x}", 0x2000 + n)).expect("valid point id")
}

pub(crate) fn user_id(n: u32) -> UserId {
    UserId::parse(&format!("{:024x}", 0x3000 + n)).expect("valid user id")
}

pub(crate) fn assignment_id(n: u32) -> AssignmentId {
    AssignmentId::parse(&format!("{:024x}", 0x4000 + n)).expect("valid assignment id")
}

pub(crate) fn team_id(n: u32) -> TeamId {
    TeamId::parse(&format!("{:024x}", 0x5000 + n)).expect("valid team id")
}

pub(crate) fn test_game(n: u32, stage: GameStage) -> Game {
    Game {
        id: game_id(n),
        name: format!("Game {n}"),
        stage,
        teams_enabled: false,
    }
}

pub(crate) fn test_point(n: u32, game: u32, location: Location) -> Point {
    Point {
        id: point_id(n),
        name: format!("Point {n}"),
        game: game_id(game),
        creator: user_id(900),
        location,
        level: None,
        defence: None,
        in_count: None,
        out_count: None,
        team: None,
    }
}

// Shared settable time source for deterministic decay tests.
#[derive(Clone)]
pub(crate) struct FixedClock(pub(crate) Arc<AtomicU64>);

impl FixedClock {
    pub(crate) fn new(now_ms: u64) -> Self {
        Self(Arc::new(AtomicU64::new(now_ms)))
    }

    pub(crate) fn advance(&self, by: Duration) {
        self.0.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_epoch_millis(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Default)]
pub(crate) struct FailureFlags {
    pub game: bool,
    pub point: bool,
    pub points_for_game: bool,
    pub delete_point: bool,
    pub submissions: bool,
    /// Point lookups never complete.
    pub hang_point: bool,
    /// Added to every game, point and submission lookup.
    pub latency: Option<Duration>,
}

#[derive(Default)]
struct StoreTables {
    games: HashMap<GameId, Game>,
    points: HashMap<PointId, Point>,
    point_assignments: HashMap<PointId, Vec<AssignmentId>>,
    submissions: Vec<Submission>,
    teams: HashMap<(GameId, UserId), TeamId>,
}

#[derive(Clone)]
pub(crate) struct RecordingStore {
    tables: Arc<Mutex<StoreTables>>,
    failures: Arc<Mutex<FailureFlags>>,
    submission_queries: Arc<AtomicUsize>,
}

impl RecordingStore {
    pub(crate) fn new() -> Self {
        Self {
            tables: Arc::new(Mutex::new(StoreTables::default())),
            failures: Arc::new(Mutex::new(FailureFlags::default())),
            submission_queries: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn set_failures(&self, failures: FailureFlags) {
        *self.failures.lock().expect("failures mutex poisoned") = failures;
    }

    fn failures(&self) -> FailureFlags {
        *self.failures.lock().expect("failures mutex poisoned")
    }

    async fn lag(&self) {
        if let Some(latency) = self.failures().latency {
            tokio::time::sleep(latency).await;
        }
    }

    pub(crate) fn insert_game(&self, game: Game) {
        let mut tables = self.tables.lock().expect("tables mutex poisoned");
        tables.games.insert(game.id.clone(), game);
    }

    pub(crate) fn insert_point(&self, point: Point) {
        let mut tables = self.tables.lock().expect("tables mutex poisoned");
        tables.points.insert(point.id.clone(), point);
    }

    pub(crate) fn set_point_assignments(&self, point: PointId, ids: Vec<AssignmentId>) {
        let mut tables = self.tables.lock().expect("tables mutex poisoned");
        tables.point_assignments.insert(point, ids);
    }

    pub(crate) fn insert_submission(
        &self,
        n: u32,
        user: UserId,
        assignment: AssignmentId,
        approval: ApprovalState,
    ) {
        let submission = Submission {
            id: SubmissionId::parse(&format!("{:024x}", 0x6000 + n)).expect("valid submission id"),
            assignment,
            user,
            approver: None,
            approval,
            text_answer: Some("answer".to_string()),
            file_answer: None,
        };
        let mut tables = self.tables.lock().expect("tables mutex poisoned");
        tables.submissions.push(submission);
    }

    pub(crate) fn set_team(&self, game: GameId, user: UserId, team: TeamId) {
        let mut tables = self.tables.lock().expect("tables mutex poisoned");
        tables.teams.insert((game, user), team);
    }

    pub(crate) fn submission_queries(&self) -> usize {
        self.submission_queries.load(Ordering::SeqCst)
    }

    pub(crate) fn has_point(&self, id: &PointId) -> bool {
        let tables = self.tables.lock().expect("tables mutex poisoned");
        tables.points.contains_key(id)
    }
}

#[async_trait]
impl GameStore for RecordingStore {
    async fn game(&self, id: &GameId) -> Result<Option<Game>, String> {
        self.lag().await;
        if self.failures().game {
            return Err("game lookup failed".to_string());
        }
        let tables = self.tables.lock().expect("tables mutex poisoned");
        Ok(tables.games.get(id).cloned())
    }

    async fn point(&self, id: &PointId) -> Result<Option<Point>, String> {
        self.lag().await;
        let failures = self.failures();
        if failures.hang_point {
            std::future::pending::<()>().await;
        }
        if failures.point {
            return Err("point lookup failed".to_string());
        }
        let tables = self.tables.lock().expect("tables mutex poisoned");
        Ok(tables.points.get(id).cloned())
    }

    async fn points_for_game(&self, game: &GameId) -> Result<Vec<Point>, String> {
        if self.failures().points_for_game {
            return Err("points query failed".to_string());
        }
        let tables = self.tables.lock().expect("tables mutex poisoned");
        let mut points: Vec<Point> = tables
            .points
            .values()
            .filter(|p| &p.game == game)
            .cloned()
            .collect();
        points.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(points)
    }

    async fn delete_point(&self, id: &PointId) -> Result<bool, String> {
        if self.failures().delete_point {
            return Err("delete failed".to_string());
        }
        let mut tables = self.tables.lock().expect("tables mutex poisoned");
        tables.point_assignments.remove(id);
        Ok(tables.points.remove(id).is_some())
    }

    async fn point_assignment_ids(&self, point: &PointId) -> Result<Vec<AssignmentId>, String> {
        let tables = self.tables.lock().expect("tables mutex poisoned");
        Ok(tables.point_assignments.get(point).cloned().unwrap_or_default())
    }

    async fn submissions_for(
        &self,
        user: &UserId,
        assignments: &[AssignmentId],
    ) -> Result<Vec<Submission>, String> {
        self.submission_queries.fetch_add(1, Ordering::SeqCst);
        self.lag().await;
        if self.failures().submissions {
            return Err("submissions query failed".to_string());
        }
        let tables = self.tables.lock().expect("tables mutex poisoned");
        Ok(tables
            .submissions
            .iter()
            .filter(|s| &s.user == user && assignments.contains(&s.assignment))
            .cloned()
            .collect())
    }

    async fn user_team(&self, game: &GameId, user: &UserId) -> Result<Option<TeamId>, String> {
        let tables = self.tables.lock().expect("tables mutex poisoned");
        Ok(tables.teams.get(&(game.clone(), user.clone())).cloned())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Target {
    User(UserId),
    Connection(ConnectionId),
    Everyone,
}

#[derive(Clone, Default)]
pub(crate) struct RecordingPush {
    sent: Arc<Mutex<Vec<(Target, Notification)>>>,
    fail: Arc<Mutex<bool>>,
}

impl RecordingPush {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_failing(&self, fail: bool) {
        *self.fail.lock().expect("push mutex poisoned") = fail;
    }

    pub(crate) fn sent(&self) -> Vec<(Target, Notification)> {
        self.sent.lock().expect("push mutex poisoned").clone()
    }

    pub(crate) fn clear(&self) {
        self.sent.lock().expect("push mutex poisoned").clear();
    }

    fn record(&self, target: Target, message: &Notification) -> Result<(), String> {
        if *self.fail.lock().expect("push mutex poisoned") {
            return Err("socket closed".to_string());
        }
        self.sent
            .lock()
            .expect("push mutex poisoned")
            .push((target, message.clone()));
        Ok(())
    }
}

impl PushChannel for RecordingPush {
    fn send_to_user(
        &self,
        _game: &GameId,
        user: &UserId,
        message: &Notification,
    ) -> Result<(), String> {
        self.record(Target::User(user.clone()), message)
    }

    fn send_to_connection(
        &self,
        connection: ConnectionId,
        message: &Notification,
    ) -> Result<(), String> {
        self.record(Target::Connection(connection), message)
    }

    fn broadcast(&self, _game: &GameId, message: &Notification) -> Result<(), String> {
        self.record(Target::Everyone, message)
    }
}

#[derive(Clone, Default)]
pub(crate) struct RoleTable {
    roles: Arc<Mutex<HashMap<UserId, GameRole>>>,
    managers: Arc<Mutex<HashSet<UserId>>>,
}

impl RoleTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_role(&self, user: UserId, role: GameRole) {
        self.roles.lock().expect("roles mutex poisoned").insert(user, role);
    }

    pub(crate) fn add_manager(&self, user: UserId) {
        self.managers.lock().expect("roles mutex poisoned").insert(user);
    }
}

#[async_trait]
impl Permissions for RoleTable {
    async fn can_manage_game(&self, _game: &GameId, user: &UserId) -> Result<bool, String> {
        Ok(self.managers.lock().expect("roles mutex poisoned").contains(user))
    }

    async fn user_role(&self, _game: &GameId, user: &UserId) -> Result<Option<GameRole>, String> {
        Ok(self.roles.lock().expect("roles mutex poisoned").get(user).copied())
    }
}

pub(crate) fn test_settings() -> LiveSettings {
    LiveSettings {
        range: RangePolicy::new(50.0, 75.0),
        location_decay: DECAY,
        io_timeout: Duration::from_millis(200),
        drain_timeout: Duration::from_millis(500),
    }
}

// Everything a use-case test needs, with handles kept for inspection.
pub(crate) struct Harness {
    pub store: RecordingStore,
    pub push: RecordingPush,
    pub roles: RoleTable,
    pub clock: FixedClock,
}

impl Harness {
    /// Seeds game 1 as running.
    pub(crate) fn new() -> Self {
        let store = RecordingStore::new();
        store.insert_game(test_game(1, GameStage::Running));
        Self {
            store,
            push: RecordingPush::new(),
            roles: RoleTable::new(),
            clock: FixedClock::new(START_MS),
        }
    }

    pub(crate) fn ports(&self) -> Ports {
        Ports {
            store: Arc::new(self.store.clone()),
            push: Arc::new(self.push.clone()),
            permissions: Arc::new(self.roles.clone()),
            clock: Arc::new(self.clock.clone()),
        }
    }

    pub(crate) fn context(&self) -> GameContext {
        GameContext::new(game_id(1), self.ports(), test_settings())
    }
}
