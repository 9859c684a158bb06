// Interface adapters: wire protocol, sockets, push routing and the in-memory backend.

pub mod http;
pub mod memory_store;
pub mod net;
pub mod protocol;
pub mod push;
pub mod state;
pub mod utils;
