// Registry of live points for one running game.

use crate::domain::{AssignmentFilter, LiveError, Point, PointId, UserId};
use crate::use_cases::context::GameContext;
use crate::use_cases::fanout::{try_join_all_within, within};
use crate::use_cases::live_point::LivePoint;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// A point lookup by id or by an already fetched record.
#[derive(Debug, Clone, Copy)]
pub enum PointRef<'a> {
    Id(&'a PointId),
    Model(&'a Point),
}

impl<'a> From<&'a PointId> for PointRef<'a> {
    fn from(id: &'a PointId) -> Self {
        PointRef::Id(id)
    }
}

impl<'a> From<&'a Point> for PointRef<'a> {
    fn from(point: &'a Point) -> Self {
        PointRef::Model(point)
    }
}

impl PointRef<'_> {
    fn id(&self) -> &PointId {
        match self {
            PointRef::Id(id) => id,
            PointRef::Model(point) => &point.id,
        }
    }
}

#[derive(Default)]
pub struct PointManager {
    points: RwLock<HashMap<PointId, Arc<LivePoint>>>,
}

impl PointManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_loaded_point(&self, id: &PointId) -> Option<Arc<LivePoint>> {
        self.points.read().await.get(id).cloned()
    }

    pub async fn loaded(&self) -> Vec<Arc<LivePoint>> {
        self.points.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.points.read().await.len()
    }

    /// Returns the live point, materializing it on first use.
    ///
    /// `Ok(None)` means the point does not exist or belongs to another game.
    pub async fn get_point<'a>(
        &self,
        ctx: &GameContext,
        point: impl Into<PointRef<'a>>,
    ) -> Result<Option<Arc<LivePoint>>, LiveError> {
        let point = point.into();
        if let Some(live) = self.get_loaded_point(point.id()).await {
            return Ok(Some(live));
        }

        let belongs = match point {
            PointRef::Model(model) => model.game == ctx.game_id,
            PointRef::Id(id) => within("point lookup", ctx.settings.io_timeout, async {
                ctx.ports.store.point(id).await.map_err(LiveError::Storage)
            })
            .await?
            .is_some_and(|stored| stored.game == ctx.game_id),
        };
        if !belongs {
            return Ok(None);
        }

        let mut points = self.points.write().await;
        let live = points
            .entry(point.id().clone())
            .or_insert_with(|| {
                debug!(point_id = %point.id(), "point materialized");
                Arc::new(LivePoint::new(point.id().clone()))
            })
            .clone();
        Ok(Some(live))
    }

    /// Drops every loaded point and loads the game's points afresh.
    pub async fn load(&self, ctx: &GameContext) -> Result<usize, LiveError> {
        let stored = within("points query", ctx.settings.io_timeout, async {
            ctx.ports
                .store
                .points_for_game(&ctx.game_id)
                .await
                .map_err(LiveError::Storage)
        })
        .await?;

        let mut points = self.points.write().await;
        points.clear();
        for point in stored.into_iter().filter(|p| p.game == ctx.game_id) {
            points.insert(point.id.clone(), Arc::new(LivePoint::new(point.id)));
        }

        info!(game_id = %ctx.game_id, points = points.len(), "points loaded");
        Ok(points.len())
    }

    pub async fn unload(&self) {
        self.points.write().await.clear();
    }

    /// Returns true if the point was loaded.
    pub async fn unload_point(&self, id: &PointId) -> bool {
        self.points.write().await.remove(id).is_some()
    }

    /// Points where the user still has open assignments.
    pub async fn get_visible_points(
        &self,
        ctx: &GameContext,
        user: &UserId,
    ) -> Result<Vec<PointId>, LiveError> {
        let points = self.loaded().await;
        let checks = points.iter().map(|point| async move {
            let open = point
                .get_user_assignment_ids(ctx, user, Some(AssignmentFilter::OPEN))
                .await?;
            Ok::<_, LiveError>((!open.is_empty()).then(|| point.id().clone()))
        });

        let mut visible: Vec<PointId> =
            try_join_all_within("visible points", ctx.settings.join_timeout(), checks)
                .await?
                .into_iter()
                .flatten()
                .collect();
        visible.sort();
        Ok(visible)
    }
}
