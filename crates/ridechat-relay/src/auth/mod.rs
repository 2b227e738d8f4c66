//! Booking chat token verification.
//!
//! Tokens are issued by the booking service when a chat session starts and
//! bind a user to exactly one booking.

pub mod claims;
pub mod token;

pub use claims::Claims;
pub use token::{TokenError, TokenVerifier};
