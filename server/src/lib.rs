//! # Blob Arena Server Library
//!
//! This library provides the authoritative server for a 2D multiplayer blob
//! arena. Players are circles that move, eat food and grow. The server owns
//! the only copy of the world and streams it to every connected client at a
//! fixed tick rate; clients send nothing but movement intent.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative World
//! All positions, radii and food live in one [`world::World`]. Clients never
//! report positions; they only say which direction keys are held.
//!
//! ### Session Lifecycle
//! Every TCP connection gets its own task that walks through:
//! - Onboarding: three raw color bytes and a newline-terminated name
//! - Active play: write a frame, read one intent line, move, sleep out the tick
//! - Teardown: the player's slot is released exactly once
//!
//! ### Food and Growth
//! A background task scans food against players. Food that lies fully inside
//! a player is eaten, respawned elsewhere, and the player's radius grows so
//! that areas add up.
//!
//! ## Architecture Design
//!
//! ### Shared World Behind One Lock
//! Sessions and the food loop share the world as `Arc<RwLock<World>>`. Every
//! mutation takes the write lock and every frame is cloned under the read
//! lock, so a frame's player count always matches the players it carries.
//!
//! ### Task Per Connection
//! Sessions run independently at their own 60 Hz cadence. A slow or silent
//! client only stalls its own task, and is dropped after the idle timeout.
//!
//! ### TCP Wire Protocol
//! Outbound frames are little-endian binary (see `shared::protocol`); inbound
//! messages are short newline-terminated text lines.
//!
//! ## Module Organization
//!
//! ### Config Module (`config`)
//! Listen address, tick rate, timeouts and world dimensions, with validation.
//!
//! ### World Module (`world`)
//! Slot storage with generation-checked ids, movement, growth, food
//! consumption and snapshots.
//!
//! ### Spawn Module (`spawn`)
//! Rejection-sampling placement with a bounded attempt budget and a
//! best-effort fallback.
//!
//! ### Food Module (`food`)
//! The background consumption loop.
//!
//! ### Session Module (`session`)
//! The per-connection state machine.
//!
//! ### Network Module (`network`)
//! The TCP listener, session spawning and graceful shutdown.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let config = ServerConfig {
//!         addr: "127.0.0.1:8080".to_string(),
//!         ..ServerConfig::default()
//!     };
//!
//!     // Binds the listener, then serves until Ctrl+C:
//!     // - one task per client runs the onboarding and tick loop
//!     // - one background task lets players eat food
//!     let server = Server::bind(config).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod food;
pub mod network;
pub mod session;
pub mod spawn;
pub mod world;
