// Live point: range tracking, visibility and data pushes for one point of a running game.

use crate::domain::geo::distance_m;
use crate::domain::{
    AssignmentFilter, AssignmentId, ConnectionId, Game, GameRole, LiveError, LiveUser,
    Notification, Point, PointId, PointMemory, PointView, Submission, TeamId, UserId,
};
use crate::use_cases::context::GameContext;
use crate::use_cases::fanout::{any_true_within, try_join_all_within, within};
use crate::use_cases::point_manager::PointManager;
use futures::future::Either;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Outcome of recomputing one user's range flag at a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeUpdate {
    pub in_range: bool,
    /// True when the remembered flag flipped.
    pub changed: bool,
}

/// Where point data goes.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// Every connection of the user.
    User,
    Connections(Vec<ConnectionId>),
}

pub struct LivePoint {
    id: PointId,
    memory: Mutex<PointMemory>,
    // Serializes range recomputation so interleaved updates cannot lose a flip.
    range_gate: tokio::sync::Mutex<()>,
}

impl LivePoint {
    pub(crate) fn new(id: PointId) -> Self {
        Self {
            id,
            memory: Mutex::new(PointMemory::new()),
            range_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn id(&self) -> &PointId {
        &self.id
    }

    fn memory(&self) -> MutexGuard<'_, PointMemory> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_in_range_memory(&self, user: &UserId) -> bool {
        self.memory().is_in_range(user)
    }

    /// Returns true when the remembered flag flipped.
    pub fn set_in_range_memory(&self, user: &UserId, in_range: bool) -> bool {
        self.memory().set_in_range(user, in_range)
    }

    pub fn set_user_assignments(&self, user: &UserId, ids: Vec<AssignmentId>) {
        self.memory().set_assignments(user, ids);
    }

    pub fn remove_user_assignments(&self, user: &UserId, ids: &[AssignmentId]) -> usize {
        self.memory().remove_assignments(user, ids)
    }

    async fn fetch_point(&self, ctx: &GameContext) -> Result<Point, LiveError> {
        within("point lookup", ctx.settings.io_timeout, async {
            ctx.ports
                .store
                .point(&self.id)
                .await
                .map_err(LiveError::Storage)
        })
        .await?
        .ok_or_else(|| LiveError::PointMissing(self.id.clone()))
    }

    async fn fetch_game(&self, ctx: &GameContext) -> Result<Game, LiveError> {
        within("game lookup", ctx.settings.io_timeout, async {
            ctx.ports
                .store
                .game(&ctx.game_id)
                .await
                .map_err(LiveError::Storage)
        })
        .await?
        .ok_or_else(|| LiveError::GameMissing(ctx.game_id.clone()))
    }

    async fn fetch_team(&self, ctx: &GameContext, user: &UserId) -> Result<Option<TeamId>, LiveError> {
        within("team lookup", ctx.settings.io_timeout, async {
            ctx.ports
                .store
                .user_team(&ctx.game_id, user)
                .await
                .map_err(LiveError::Storage)
        })
        .await
    }

    /// Whether the user is currently within range, using the remembered flag
    /// to pick the entry or exit radius. Users without a recent location are
    /// never in range and cost no lookup.
    pub async fn is_user_in_range(&self, ctx: &GameContext, user: &LiveUser) -> Result<bool, LiveError> {
        let currently = self.is_in_range_memory(&user.id);
        self.compute_in_range(ctx, user, currently).await
    }

    async fn compute_in_range(
        &self,
        ctx: &GameContext,
        user: &LiveUser,
        currently: bool,
    ) -> Result<bool, LiveError> {
        let Some(location) = user.recent_location(ctx.now_ms(), ctx.settings.location_decay) else {
            return Ok(false);
        };
        let point = self.fetch_point(ctx).await?;
        let distance = distance_m(point.location, location);
        Ok(ctx.settings.range.is_in_range(distance, currently))
    }

    /// Everyone sees every point once the game is finished. Before that a
    /// point shows to spectators and to users with open or pending work here.
    pub async fn is_visible_for(&self, ctx: &GameContext, user: &UserId) -> Result<bool, LiveError> {
        let game = self.fetch_game(ctx).await?;
        if game.stage.is_finished() {
            return Ok(true);
        }

        let spectator = async {
            Ok::<bool, LiveError>(ctx.user_role(user).await? == Some(GameRole::Spectator))
        };
        let has_work = async {
            let ids = self
                .get_user_assignment_ids(ctx, user, Some(AssignmentFilter::OPEN_OR_PENDING))
                .await?;
            Ok::<bool, LiveError>(!ids.is_empty())
        };

        any_true_within(
            "visibility check",
            ctx.settings.join_timeout(),
            [Either::Left(spectator), Either::Right(has_work)],
        )
        .await
    }

    /// Recomputes the user's range flag and commits it to memory.
    ///
    /// The flag is written only after the computation succeeded and with no
    /// await in between, so cancelling this future never half-applies a flip.
    pub async fn recompute_range(
        &self,
        ctx: &GameContext,
        user: &LiveUser,
    ) -> Result<RangeUpdate, LiveError> {
        let _gate = self.range_gate.lock().await;
        let currently = self.is_in_range_memory(&user.id);
        let in_range = self.compute_in_range(ctx, user, currently).await?;
        let changed = self.set_in_range_memory(&user.id, in_range);
        Ok(RangeUpdate { in_range, changed })
    }

    /// Pushes fresh point data to everyone who can see the point and tells
    /// the mover about the flip. Failures are logged only.
    pub async fn announce_range_change(&self, ctx: &GameContext, user: &UserId, in_range: bool) {
        debug!(point_id = %self.id, user_id = %user, in_range, "range changed");
        let (broadcast, notified) = futures::join!(
            self.broadcast_data(ctx),
            self.notify_range_change(ctx, user, in_range)
        );
        if let Err(e) = broadcast {
            warn!(point_id = %self.id, error = %e, "point broadcast failed");
        }
        if let Err(e) = notified {
            warn!(point_id = %self.id, user_id = %user, error = %e, "range notification failed");
        }
    }

    /// Recomputes the user's range flag and announces a flip.
    ///
    /// Push failures are logged only; the returned value reflects the range
    /// computation. A failed computation leaves memory untouched.
    pub async fn update_range_state(
        &self,
        ctx: &GameContext,
        user: &LiveUser,
    ) -> Result<RangeUpdate, LiveError> {
        let update = self.recompute_range(ctx, user).await?;
        if update.changed {
            self.announce_range_change(ctx, &user.id, update.in_range).await;
        }
        Ok(update)
    }

    async fn notify_range_change(
        &self,
        ctx: &GameContext,
        user: &UserId,
        in_range: bool,
    ) -> Result<(), LiveError> {
        let (point, visible) =
            futures::try_join!(self.fetch_point(ctx), self.is_visible_for(ctx, user))?;
        if !visible {
            return Ok(());
        }

        let message = Notification::PointRange {
            point: self.id.clone(),
            name: point.name,
            in_range,
        };
        if let Err(e) = ctx.ports.push.send_to_user(&ctx.game_id, user, &message) {
            debug!(user_id = %user, error = %e, "range notification not delivered");
        }
        Ok(())
    }

    /// Memoized assignment ids for the user, optionally narrowed by `filter`.
    ///
    /// Filtering loads the user's submissions for all memoized ids at once.
    pub async fn get_user_assignment_ids(
        &self,
        ctx: &GameContext,
        user: &UserId,
        filter: Option<AssignmentFilter>,
    ) -> Result<Vec<AssignmentId>, LiveError> {
        let ids = self.memory().assignments(user);
        let Some(filter) = filter.and_then(AssignmentFilter::normalized) else {
            return Ok(ids);
        };
        if ids.is_empty() {
            return Ok(ids);
        }

        let submissions = within("submission lookup", ctx.settings.io_timeout, async {
            ctx.ports
                .store
                .submissions_for(user, &ids)
                .await
                .map_err(LiveError::Storage)
        })
        .await?;

        let mut by_assignment: HashMap<&AssignmentId, Vec<&Submission>> = HashMap::new();
        for submission in &submissions {
            by_assignment
                .entry(&submission.assignment)
                .or_default()
                .push(submission);
        }

        Ok(ids
            .iter()
            .filter(|id| filter.matches(by_assignment.get(id).into_iter().flatten().copied()))
            .cloned()
            .collect())
    }

    /// Reloads the assignments completable here into the user's memory.
    pub async fn refresh_user_assignments(
        &self,
        ctx: &GameContext,
        user: &UserId,
    ) -> Result<Vec<AssignmentId>, LiveError> {
        let ids = within("assignment lookup", ctx.settings.io_timeout, async {
            ctx.ports
                .store
                .point_assignment_ids(&self.id)
                .await
                .map_err(LiveError::Storage)
        })
        .await?;
        self.set_user_assignments(user, ids);
        Ok(self.memory().assignments(user))
    }

    /// The point as `user` should see it. Fails with `WrongGame` when the
    /// stored point no longer belongs to this runtime's game.
    pub async fn view_for(&self, ctx: &GameContext, user: &UserId) -> Result<PointView, LiveError> {
        let (point, game) = futures::try_join!(self.fetch_point(ctx), self.fetch_game(ctx))?;
        if point.game != ctx.game_id {
            return Err(LiveError::WrongGame {
                point: self.id.clone(),
                game: ctx.game_id.clone(),
            });
        }

        let ally = if game.teams_enabled {
            let team = self.fetch_team(ctx, user).await?;
            Some(team.is_some() && team == point.team)
        } else {
            None
        };

        Ok(PointView {
            name: point.name,
            in_range: self.is_in_range_memory(user),
            ally,
        })
    }

    pub async fn send_data(
        &self,
        ctx: &GameContext,
        user: &UserId,
        delivery: &Delivery,
    ) -> Result<(), LiveError> {
        let data = self.view_for(ctx, user).await?;
        let message = Notification::PointData {
            point: self.id.clone(),
            game: ctx.game_id.clone(),
            data,
        };
        deliver(ctx, user, delivery, &message);
        Ok(())
    }

    /// Sends point data to every live user who can see this point; returns how
    /// many were sent. The first failure cancels the sends still in flight.
    pub async fn broadcast_data(&self, ctx: &GameContext) -> Result<usize, LiveError> {
        let users = ctx.users.all().await;
        let sends = users.iter().map(|user| async move {
            if !self.is_visible_for(ctx, &user.id).await? {
                return Ok(false);
            }
            self.send_data(ctx, &user.id, &Delivery::User).await?;
            Ok::<bool, LiveError>(true)
        });

        let sent = try_join_all_within("point broadcast", ctx.settings.join_timeout(), sends).await?;
        Ok(sent.into_iter().filter(|s| *s).count())
    }

    /// Deletes the stored point, evicts it from `manager` and tells every live
    /// user of the game that it is gone.
    pub async fn destroy(&self, ctx: &GameContext, manager: &PointManager) -> Result<(), LiveError> {
        let existed = within("point delete", ctx.settings.io_timeout, async {
            ctx.ports
                .store
                .delete_point(&self.id)
                .await
                .map_err(LiveError::Storage)
        })
        .await?;
        manager.unload_point(&self.id).await;

        let message = Notification::PointRemoved {
            game: ctx.game_id.clone(),
            point: self.id.clone(),
        };
        for user in ctx.users.all().await {
            if let Err(e) = ctx.ports.push.send_to_user(&ctx.game_id, &user.id, &message) {
                debug!(user_id = %user.id, error = %e, "point removal not delivered");
            }
        }

        info!(point_id = %self.id, existed, "point destroyed");
        Ok(())
    }
}

pub(crate) fn deliver(ctx: &GameContext, user: &UserId, delivery: &Delivery, message: &Notification) {
    match delivery {
        Delivery::User => {
            if let Err(e) = ctx.ports.push.send_to_user(&ctx.game_id, user, message) {
                debug!(user_id = %user, error = %e, "push not delivered");
            }
        }
        Delivery::Connections(connections) => {
            for connection in connections {
                if let Err(e) = ctx.ports.push.send_to_connection(*connection, message) {
                    debug!(connection, error = %e, "push not delivered");
                }
            }
        }
    }
}
