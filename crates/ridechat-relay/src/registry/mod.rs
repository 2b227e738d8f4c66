//! In-memory room membership for live chat connections.

pub mod room;

pub use room::{ConnectionId, OutboundFrame, RoomRegistry};
