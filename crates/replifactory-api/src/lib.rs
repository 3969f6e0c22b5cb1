// replifactory-api: Async Rust client for the Replifactory backend (HTTP + WebSocket)

pub mod client;
pub mod device;
pub mod envelope;
pub mod error;
pub mod experiment;
pub mod models;
pub mod system;
pub mod transport;
pub mod tunnel;
pub mod websocket;

pub use client::GatewayClient;
pub use error::Error;
pub use transport::TransportConfig;
