use crate::interface_adapters::push::ConnectionHub;
use crate::use_cases::GameRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    // Running games, looked up per socket.
    pub registry: Arc<GameRegistry>,
    // Outbound queues of every open socket; also the push port of every game.
    pub hub: Arc<ConnectionHub>,
}
