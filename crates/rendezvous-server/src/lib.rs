pub mod config;
pub mod connection;
pub mod relay;
pub mod server;

pub use config::ServerConfig;
pub use server::{start, ServerHandle};
