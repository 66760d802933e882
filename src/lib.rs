//! Pong session core
//!
//! Fixed-step paddle and ball physics, a session state machine for local,
//! matchmade, direct friend and tournament play, and the client side of the
//! matchmaking and match channels.

pub mod app;
pub mod config;
pub mod game;
pub mod store;
pub mod util;
pub mod ws;
