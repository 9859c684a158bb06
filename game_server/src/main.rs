#[tokio::main]
async fn main() {
    // Delegate to the server framework entry point.
    if let Err(e) = live_game_server::run_with_config().await {
        tracing::error!(error = %e, "server exited with error");
        std::process::exit(1);
    }
}
