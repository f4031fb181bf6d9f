//! # Game Server Library
//!
//! Authoritative server for a 2D multiplayer arena game. The server owns the
//! only real copy of the world: it simulates players, critters, projectiles
//! and the static map at a fixed tick rate, and broadcasts entity snapshots
//! over UDP for clients to render.
//!
//! ## Architecture
//!
//! All game state lives on a single-threaded event loop; spawned async tasks
//! only move packets between the socket and that loop. Within one tick the
//! controller applies queued input, advances the physics simulation, resolves
//! collisions and reaps destroyed entities, so every observer sees the same
//! deterministic ordering.
//!
//! ## Module Organization
//!
//! - [`network`]: the UDP server loop, session handshake and state broadcast
//! - [`client_manager`]: per-peer sessions and timeout sweeping
//! - [`controller`]: the game rules driving each simulation tick
//! - [`world`]: entity storage on top of the physics world
//! - [`entity`]: the seven entity kinds and their per-kind state
//! - [`collision`]: pairwise contact outcome resolution
//! - [`physics`]: rigid body simulation built on rapier2d
//! - [`config`]: server, map and entity parameter tables
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::GameConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new("127.0.0.1:4242", GameConfig::standard()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod collision;
pub mod config;
pub mod controller;
pub mod entity;
pub mod network;
pub mod physics;
pub mod world;
