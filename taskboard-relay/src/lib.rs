//! Taskboard relay server library.
//!
//! Hosts the realtime room broadcaster behind an axum WebSocket endpoint.
//! Clients authenticate with a bearer token, join the rooms of projects
//! they belong to, and receive the board changes published there.

pub mod config;
pub mod relay;
pub mod rooms;
