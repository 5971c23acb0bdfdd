//! WebSocket connection handling, registration handshake, heartbeat and the
//! domain-change bridge.

pub mod connection;
pub mod event_bridge;
pub mod handshake;
pub mod heartbeat;
pub mod session;
