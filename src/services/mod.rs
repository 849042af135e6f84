//! Domain services used by websocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own room state and its rules so route handlers can stay
//! focused on protocol translation and fan-out.

pub mod oplog;
pub mod presence;
pub mod room;
