// Shared primitives for one-time server bootstrapping across integration tests.
use live_game_server::interface_adapters::memory_store::Fixture;
use live_game_server::use_cases::LiveSettings;
use live_game_server::domain::RangePolicy;
use std::{
    // `Arc` shares data between threads; `OnceLock` writes a value only once.
    sync::{Arc, OnceLock},
    // Sleep durations are used in readiness polling loops.
    time::Duration,
};

pub const GAME: &str = "00000000000000000000a001";
pub const STOPPED_GAME: &str = "00000000000000000000a002";
pub const POINT: &str = "00000000000000000000b001";
pub const OUTPOST: &str = "00000000000000000000b002";
pub const PLAYER: &str = "00000000000000000000c001";
pub const MANAGER: &str = "00000000000000000000c009";
pub const POINT_LAT: f64 = 52.0;
pub const POINT_LON: f64 = 5.0;

const FIXTURE: &str = r#"{
    "games": [
        {"id": "00000000000000000000a001", "name": "City run", "stage": "running"},
        {"id": "00000000000000000000a002", "name": "Draft", "stage": "open"}
    ],
    "points": [
        {"id": "00000000000000000000b001", "name": "Bridge", "game": "00000000000000000000a001",
         "creator": "00000000000000000000c009", "location": {"lat": 52.0, "lon": 5.0}},
        {"id": "00000000000000000000b002", "name": "Outpost", "game": "00000000000000000000a001",
         "creator": "00000000000000000000c009", "location": {"lat": 53.0, "lon": 5.0}}
    ],
    "point_assignments": [
        {"point": "00000000000000000000b001", "assignments": ["00000000000000000000d001"]}
    ],
    "members": [
        {"game": "00000000000000000000a001", "user": "00000000000000000000c001", "role": "participant"}
    ],
    "managers": [
        {"game": "00000000000000000000a001", "user": "00000000000000000000c009"}
    ]
}"#;

// Global base URL used by all tests after the server publishes its bound address.
static SERVER_URL: OnceLock<String> = OnceLock::new();
// One-time guard that ensures the server bootstrap path runs only once.
static SERVER_READY: OnceLock<()> = OnceLock::new();

fn test_settings() -> LiveSettings {
    LiveSettings {
        range: RangePolicy::new(50.0, 75.0),
        location_decay: Duration::from_secs(300),
        io_timeout: Duration::from_secs(1),
        drain_timeout: Duration::from_secs(1),
    }
}

// Ensure the test server is running and return the shared base URL.
pub fn ensure_server() -> &'static str {
    // Run initialization exactly once even if multiple tests call this function.
    SERVER_READY.get_or_init(|| {
        // Local one-time slot where the server thread publishes its selected URL.
        let published_url = Arc::new(OnceLock::<String>::new());
        // Clone so the spawned thread can write into the same shared slot.
        let published_url_thread = Arc::clone(&published_url);
        // Spawn an OS thread so the server outlives individual `#[tokio::test]` runtimes.
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().expect("test runtime");
            runtime.block_on(async move {
                // Bind to an ephemeral port to avoid collisions with local services.
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("bind ephemeral test port");
                let addr = listener.local_addr().expect("get local addr");
                let _ = published_url_thread.set(format!("ws://{}", addr));
                let fixture = Fixture::from_json(FIXTURE).expect("test fixture");
                live_game_server::run_with_fixture(listener, fixture, test_settings())
                    .await
                    .expect("server failed");
            });
        });
        // Block until URL is published and the bound port starts accepting connections.
        wait_for_server_url_and_readiness(published_url);
    });

    SERVER_URL
        .get()
        .expect("server url should be initialized")
        .as_str()
}

// Wait for URL publication and then wait for the server socket to accept TCP connections.
fn wait_for_server_url_and_readiness(published_url: Arc<OnceLock<String>>) {
    let base_url = loop {
        if let Some(url) = published_url.get() {
            break url.clone();
        }
        std::thread::sleep(Duration::from_millis(10));
    };

    let _ = SERVER_URL.set(base_url.clone());

    // Strip the scheme so we can use host:port for raw TCP readiness checks.
    let addr = base_url
        .strip_prefix("ws://")
        .expect("base url should use ws://");

    // Retry for a short period to avoid racing server bind/accept.
    for _ in 0..100 {
        if std::net::TcpStream::connect(addr).is_ok() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    panic!("server did not become ready at {addr}");
}
