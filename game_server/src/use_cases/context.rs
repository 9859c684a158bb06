// Collaborators and settings shared by everything running for one game.

use crate::domain::ports::{Clock, GameStore, Permissions, PushChannel};
use crate::domain::{GameId, GameRole, LiveError, RangePolicy, UserId};
use crate::use_cases::fanout::within;
use crate::use_cases::user_manager::UserManager;
use std::sync::Arc;
use std::time::Duration;

/// Injected ports; cheap to clone across games.
#[derive(Clone)]
pub struct Ports {
    pub store: Arc<dyn GameStore>,
    pub push: Arc<dyn PushChannel>,
    pub permissions: Arc<dyn Permissions>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone)]
pub struct LiveSettings {
    pub range: RangePolicy,
    /// Locations older than this count as unknown for range checks.
    pub location_decay: Duration,
    /// Upper bound for every store or permission call feeding a join.
    pub io_timeout: Duration,
    /// How long shutdown waits for in-flight location updates.
    pub drain_timeout: Duration,
}

impl LiveSettings {
    /// Bound for a whole fan-out, which may chain several I/O steps.
    pub fn join_timeout(&self) -> Duration {
        self.io_timeout * 4
    }
}

pub struct GameContext {
    pub game_id: GameId,
    pub ports: Ports,
    pub settings: LiveSettings,
    pub users: UserManager,
}

impl GameContext {
    pub fn new(game_id: GameId, ports: Ports, settings: LiveSettings) -> Self {
        Self {
            game_id,
            ports,
            settings,
            users: UserManager::new(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.ports.clock.now_epoch_millis()
    }

    pub async fn user_role(&self, user: &UserId) -> Result<Option<GameRole>, LiveError> {
        within(
            "role lookup",
            self.settings.io_timeout,
            async {
                self.ports
                    .permissions
                    .user_role(&self.game_id, user)
                    .await
                    .map_err(LiveError::Permission)
            },
        )
        .await
    }

    pub async fn can_manage(&self, user: &UserId) -> Result<bool, LiveError> {
        within(
            "manage permission lookup",
            self.settings.io_timeout,
            async {
                self.ports
                    .permissions
                    .can_manage_game(&self.game_id, user)
                    .await
                    .map_err(LiveError::Permission)
            },
        )
        .await
    }
}
