//! Melee session server - authoritative host for multiplayer melee battle royale sessions
//!
//! Each session runs one [`game::HostRuntime`] that owns the match state. Clients
//! talk to it only through the session's [`relay::Relay`]:
//! - position updates are validated and batched for broadcast
//! - attacks, pickups, zone damage and the win condition are resolved by the host
//! - bots run inside the host and submit intents through the same dispatch as clients

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod relay;
pub mod session;
pub mod store;
pub mod util;
pub mod ws;
