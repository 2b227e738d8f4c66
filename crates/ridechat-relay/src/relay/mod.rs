//! Booking-scoped chat relay: sessions, wire protocol and event handlers.

pub mod error;
pub mod handler;
pub mod protocol;
pub mod sequencer;
pub mod session;

pub use error::RelayError;
pub use handler::ChatRelay;
pub use protocol::{Ack, ClientEvent, ServerEvent};
pub use sequencer::RoomSequencer;
pub use session::ConnectionSession;
