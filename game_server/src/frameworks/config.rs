use std::{env, time::Duration};

// Runtime/server constants and env-driven tuning for the live game core.

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|value| value.trim().parse().ok())
}

pub fn http_port() -> u16 {
    env_parse("LIVE_SERVER_PORT").unwrap_or(3003)
}

/// JSON fixture seeding the in-memory store; unset means an empty store.
pub fn fixture_path() -> Option<String> {
    env::var("GAME_FIXTURE_PATH")
        .ok()
        .filter(|path| !path.trim().is_empty())
}

pub fn point_range_meters() -> f64 {
    env_parse("POINT_RANGE_METERS").unwrap_or(50.0)
}

pub fn point_active_range_meters() -> f64 {
    env_parse("POINT_ACTIVE_RANGE_METERS").unwrap_or(75.0)
}

pub fn location_decay() -> Duration {
    Duration::from_secs(env_parse("LOCATION_DECAY_SECS").unwrap_or(300))
}

pub fn store_timeout() -> Duration {
    Duration::from_millis(env_parse("STORE_TIMEOUT_MS").unwrap_or(2000))
}

pub fn drain_timeout() -> Duration {
    Duration::from_millis(env_parse("DRAIN_TIMEOUT_MS").unwrap_or(5000))
}

// Outbound messages buffered per socket before pushes start failing.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 64;
// Consecutive unparsable client messages tolerated before disconnecting.
pub const MAX_INVALID_MESSAGES: u32 = 10;
