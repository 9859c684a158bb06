// Frameworks layer: env config and server bootstrap.

pub mod config;
pub mod server;
