// Registry of running games, keyed by game id.

use crate::domain::{GameId, GameStage, LiveError};
use crate::use_cases::context::{GameContext, LiveSettings, Ports};
use crate::use_cases::fanout::within;
use crate::use_cases::runtime::GameRuntime;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Thread-safe registry for running games.
pub struct GameRegistry {
    /// Ports handed to every game runtime.
    ports: Ports,
    /// Settings applied to newly started games.
    settings: LiveSettings,
    /// Map of game id to its runtime.
    games: RwLock<HashMap<GameId, Arc<GameRuntime>>>,
}

impl GameRegistry {
    pub fn new(ports: Ports, settings: LiveSettings) -> Self {
        Self {
            ports,
            settings,
            games: RwLock::new(HashMap::new()),
        }
    }

    /// Starts the runtime of a game that is stored and in its running stage.
    pub async fn start_game(&self, game_id: &GameId) -> Result<Arc<GameRuntime>, LiveError> {
        let mut games = self.games.write().await;
        if games.contains_key(game_id) {
            return Err(LiveError::AlreadyRunning(game_id.clone()));
        }

        let game = within("game lookup", self.settings.io_timeout, async {
            self.ports.store.game(game_id).await.map_err(LiveError::Storage)
        })
        .await?
        .ok_or_else(|| LiveError::GameMissing(game_id.clone()))?;
        if game.stage != GameStage::Running {
            return Err(LiveError::GameNotRunning(game_id.clone()));
        }

        let ctx = GameContext::new(game_id.clone(), self.ports.clone(), self.settings.clone());
        let runtime = Arc::new(GameRuntime::start(ctx).await?);
        games.insert(game_id.clone(), Arc::clone(&runtime));

        info!(game_id = %game_id, name = %game.name, "game started");
        Ok(runtime)
    }

    /// Returns the runtime for the provided id, if the game is running.
    pub async fn get_game(&self, game_id: &GameId) -> Option<Arc<GameRuntime>> {
        let games = self.games.read().await;
        games.get(game_id).cloned()
    }

    /// Removes the game and drains it. Returns false if it was not running.
    pub async fn stop_game(&self, game_id: &GameId) -> bool {
        let removed = self.games.write().await.remove(game_id);
        match removed {
            Some(runtime) => {
                runtime.shutdown().await;
                true
            }
            None => false,
        }
    }

    pub async fn running_games(&self) -> Vec<GameId> {
        let mut ids: Vec<GameId> = self.games.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Stops every running game.
    pub async fn stop_all(&self) {
        let drained: Vec<Arc<GameRuntime>> =
            self.games.write().await.drain().map(|(_, runtime)| runtime).collect();
        for runtime in drained {
            runtime.shutdown().await;
        }
    }
}
