//! WebSocket fan-out of match events

pub mod handler;
pub mod protocol;
