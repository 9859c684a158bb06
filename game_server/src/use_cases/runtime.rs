// Runtime of one running game: owns its live users and points and routes
// location updates through them.

use crate::domain::{
    AssignmentId, ConnectionId, GameId, LiveError, LiveUser, Location, Notification, PointId,
    PointSummary, UserId,
};
use crate::use_cases::context::GameContext;
use crate::use_cases::fanout::{collect_all_within, try_join_all_within};
use crate::use_cases::latch::{Latch, LatchGuard};
use crate::use_cases::live_point::{Delivery, deliver};
use crate::use_cases::point_manager::PointManager;
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Result of one location update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationOutcome {
    /// Points whose range flag flipped for the mover.
    pub changed_points: Vec<PointId>,
}

pub struct GameRuntime {
    ctx: GameContext,
    points: PointManager,
    in_flight: Latch,
    closing: AtomicBool,
}

impl GameRuntime {
    /// Builds the runtime and loads every point of the game.
    pub async fn start(ctx: GameContext) -> Result<Self, LiveError> {
        let runtime = Self {
            ctx,
            points: PointManager::new(),
            in_flight: Latch::new(),
            closing: AtomicBool::new(false),
        };
        runtime.points.load(&runtime.ctx).await?;
        Ok(runtime)
    }

    pub fn game_id(&self) -> &GameId {
        &self.ctx.game_id
    }

    pub fn context(&self) -> &GameContext {
        &self.ctx
    }

    pub fn points(&self) -> &PointManager {
        &self.points
    }

    // Registers the caller as in flight before checking for shutdown, so
    // shutdown either refuses the call or waits for it.
    fn enter(&self) -> Result<LatchGuard<'_>, LiveError> {
        let guard = self.in_flight.enter();
        if self.closing.load(Ordering::SeqCst) {
            return Err(LiveError::ShuttingDown(self.ctx.game_id.clone()));
        }
        Ok(guard)
    }

    /// Stores the user's location and recomputes range at every point.
    ///
    /// Every point settles its range flag before any flip is announced, and
    /// announcements run outside the bounded join. When any point flipped, the
    /// mover gets fresh game data (on `source` when given) and everyone allowed
    /// to see the mover gets the new location. A point that failed to
    /// recompute yields the first error only after the flips were announced.
    pub async fn update_location(
        &self,
        user: &UserId,
        location: Location,
        source: Option<ConnectionId>,
    ) -> Result<LocationOutcome, LiveError> {
        let _in_flight = self.enter()?;
        let ctx = &self.ctx;

        let mover = ctx.users.set_location(user, location, ctx.now_ms()).await;
        let points = self.points.loaded().await;
        let results = collect_all_within(
            "range update",
            ctx.settings.join_timeout(),
            points.iter().map(|point| point.recompute_range(ctx, &mover)),
        )
        .await;

        let mut first_error = None;
        let mut flipped = Vec::new();
        for (point, result) in points.iter().zip(results) {
            match result {
                Ok(update) if update.changed => flipped.push((point, update.in_range)),
                Ok(_) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        join_all(
            flipped
                .iter()
                .map(|(point, in_range)| point.announce_range_change(ctx, user, *in_range)),
        )
        .await;
        let changed_points: Vec<PointId> = flipped.iter().map(|(point, _)| point.id().clone()).collect();

        if !changed_points.is_empty() {
            debug!(user_id = %user, changed = changed_points.len(), "range state changed");
            let delivery = match source {
                Some(connection) => Delivery::Connections(vec![connection]),
                None => Delivery::User,
            };
            if let Err(e) = self.send_game_data(user, &delivery).await {
                warn!(user_id = %user, error = %e, "game data push failed");
            }
            self.broadcast_location(&mover).await;
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(LocationOutcome { changed_points }),
        }
    }

    /// Pushes every point the user can currently see, in one message.
    pub async fn send_game_data(&self, user: &UserId, delivery: &Delivery) -> Result<usize, LiveError> {
        let ctx = &self.ctx;
        let points = self.points.loaded().await;
        let views = points.iter().map(|point| async move {
            if !point.is_visible_for(ctx, user).await? {
                return Ok::<_, LiveError>(None);
            }
            let view = point.view_for(ctx, user).await?;
            Ok(Some(PointSummary {
                point: point.id().clone(),
                view,
            }))
        });

        let mut summaries: Vec<PointSummary> =
            try_join_all_within("game data", ctx.settings.join_timeout(), views)
                .await?
                .into_iter()
                .flatten()
                .collect();
        summaries.sort_by(|a, b| a.point.cmp(&b.point));
        let count = summaries.len();

        let message = Notification::GameData {
            game: ctx.game_id.clone(),
            points: summaries,
        };
        deliver(ctx, user, delivery, &message);
        Ok(count)
    }

    // Best-effort: role lookups that fail only skip the affected viewer.
    async fn broadcast_location(&self, mover: &LiveUser) {
        let ctx = &self.ctx;
        let Some(location) = mover.location() else {
            return;
        };
        let own_role = match ctx.user_role(&mover.id).await {
            Ok(role) => role,
            Err(e) => {
                warn!(user_id = %mover.id, error = %e, "role lookup failed; location not broadcast");
                return;
            }
        };

        let viewers: Vec<LiveUser> = ctx
            .users
            .all()
            .await
            .into_iter()
            .filter(|viewer| viewer.id != mover.id)
            .collect();
        let roles = collect_all_within(
            "role lookup",
            ctx.settings.io_timeout,
            viewers.iter().map(|viewer| ctx.user_role(&viewer.id)),
        )
        .await;

        let message = Notification::UserLocation {
            game: ctx.game_id.clone(),
            user: mover.id.clone(),
            location,
        };
        let now_ms = ctx.now_ms();
        for (viewer, role) in viewers.iter().zip(roles) {
            let viewer_role = match role {
                Ok(role) => role,
                Err(e) => {
                    debug!(user_id = %viewer.id, error = %e, "skipping viewer");
                    continue;
                }
            };
            if !mover.is_visible_to(own_role, viewer, viewer_role, now_ms, ctx.settings.location_decay) {
                continue;
            }
            if let Err(e) = ctx.ports.push.send_to_user(&ctx.game_id, &viewer.id, &message) {
                debug!(user_id = %viewer.id, error = %e, "location not delivered");
            }
        }
    }

    /// Reloads the user's assignment memory at every point.
    pub async fn refresh_assignments(
        &self,
        user: &UserId,
    ) -> Result<Vec<(PointId, Vec<AssignmentId>)>, LiveError> {
        let _in_flight = self.enter()?;
        let ctx = &self.ctx;
        ctx.users.get_or_create(user).await;
        let points = self.points.loaded().await;
        let refreshed = try_join_all_within(
            "assignment refresh",
            ctx.settings.join_timeout(),
            points.iter().map(|point| async move {
                let ids = point.refresh_user_assignments(ctx, user).await?;
                Ok::<_, LiveError>((point.id().clone(), ids))
            }),
        )
        .await?;
        Ok(refreshed)
    }

    pub async fn visible_points(&self, user: &UserId) -> Result<Vec<PointId>, LiveError> {
        self.points.get_visible_points(&self.ctx, user).await
    }

    /// Deletes a point on behalf of `by`, who must manage the game.
    ///
    /// Returns false when the point is not part of this game.
    pub async fn destroy_point(&self, by: &UserId, point: &PointId) -> Result<bool, LiveError> {
        let _in_flight = self.enter()?;
        if !self.ctx.can_manage(by).await? {
            return Err(LiveError::Forbidden);
        }
        let Some(live) = self.points.get_point(&self.ctx, point).await? else {
            return Ok(false);
        };
        live.destroy(&self.ctx, &self.points).await?;
        Ok(true)
    }

    /// Stops accepting updates, waits for in-flight ones, then drops all state.
    pub async fn shutdown(&self) {
        self.closing.store(true, Ordering::SeqCst);
        if tokio::time::timeout(self.ctx.settings.drain_timeout, self.in_flight.wait())
            .await
            .is_err()
        {
            warn!(
                game_id = %self.ctx.game_id,
                pending = self.in_flight.pending(),
                "shutdown drain timed out"
            );
        }
        self.points.unload().await;
        self.ctx.users.clear().await;
        info!(game_id = %self.ctx.game_id, "game runtime stopped");
    }
}
