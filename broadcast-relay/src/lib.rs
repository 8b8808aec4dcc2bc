//! A small message relay: every message a client sends is broadcast to
//! every connected client, over WebSocket and plain TCP alike.
//!
//! The core is three pieces:
//!
//! - [`registry`] holds the live clients behind a single lock.
//! - [`router`] is the one task that drains the broadcast queue and writes
//!   each message to every registered client, evicting any client whose
//!   write fails or times out.
//! - [`session`] owns one connection's read loop and takes the client out
//!   of the registry when that loop ends.
//!
//! Around it, [`transport`] adapts TCP (JSON lines) and WebSocket (JSON
//! frames) connections into the transport-agnostic [`connection`] type,
//! [`relay`] binds listeners and coordinates shutdown, and [`cli`] /
//! [`client`] provide the command-line surface.

pub mod cli;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod message;
pub mod registry;
pub mod relay;
pub mod router;
pub mod session;
pub mod transport;
