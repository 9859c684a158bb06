// Registry of live users for one running game.

use crate::domain::{LiveUser, Location, UserId};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct UserManager {
    users: RwLock<HashMap<UserId, LiveUser>>,
}

impl UserManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the user's current state, creating an empty entry on first reference.
    pub async fn get_or_create(&self, user: &UserId) -> LiveUser {
        let mut users = self.users.write().await;
        users
            .entry(user.clone())
            .or_insert_with(|| LiveUser::new(user.clone()))
            .clone()
    }

    pub async fn get(&self, user: &UserId) -> Option<LiveUser> {
        self.users.read().await.get(user).cloned()
    }

    /// Stores a fresh location and returns a snapshot of the updated user.
    pub async fn set_location(&self, user: &UserId, location: Location, now_ms: u64) -> LiveUser {
        let mut users = self.users.write().await;
        let live = users
            .entry(user.clone())
            .or_insert_with(|| LiveUser::new(user.clone()));
        live.set_location(location, now_ms);
        live.clone()
    }

    pub async fn all(&self) -> Vec<LiveUser> {
        self.users.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn clear(&self) {
        self.users.write().await.clear();
    }
}
