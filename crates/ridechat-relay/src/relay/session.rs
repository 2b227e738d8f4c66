//! Per-connection state established by `join_booking`.

use crate::auth::Claims;
use crate::registry::ConnectionId;

use super::error::RelayError;

/// Identity and booking a connection bound on its first successful join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub user_id: i64,
    pub booking_id: i64,
}

/// State of one live connection: `Unbound` until a join succeeds, then bound
/// to a single booking until disconnect.
#[derive(Debug, Clone)]
pub struct ConnectionSession {
    id: ConnectionId,
    binding: Option<Binding>,
}

impl ConnectionSession {
    pub const fn new(id: ConnectionId) -> Self {
        Self { id, binding: None }
    }

    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    pub const fn binding(&self) -> Option<Binding> {
        self.binding
    }

    pub fn is_bound_to(&self, booking_id: i64) -> bool {
        self.binding.is_some_and(|b| b.booking_id == booking_id)
    }

    /// Bind to the booking in `claims`.
    ///
    /// Returns `Ok(true)` on first bind and `Ok(false)` when already bound to
    /// the same booking. Binding to a different booking is refused.
    pub fn bind(&mut self, claims: &Claims) -> Result<bool, RelayError> {
        match self.binding {
            None => {
                self.binding = Some(Binding {
                    user_id: claims.user_id,
                    booking_id: claims.booking_id,
                });
                Ok(true)
            }
            Some(b) if b.booking_id == claims.booking_id => Ok(false),
            Some(_) => Err(RelayError::AlreadyBound),
        }
    }
}
