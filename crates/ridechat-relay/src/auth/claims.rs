//! Claims carried by a booking chat token.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::positive_id;

use super::token::TokenError;

/// Verified token payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Participant (passenger or driver) the token was issued to.
    pub user_id: i64,
    /// Booking whose chat room the token grants access to.
    pub booking_id: i64,
    /// Expiration (unix timestamp). Absent means the token never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl Claims {
    /// Extract claims from a decoded JSON payload.
    ///
    /// Ids may arrive as numbers or numeric strings depending on the issuer;
    /// both must be strictly positive.
    pub(crate) fn from_payload(payload: &Value) -> Result<Self, TokenError> {
        let obj = payload.as_object().ok_or(TokenError::InvalidPayload)?;

        let user_id = obj
            .get("user_id")
            .and_then(positive_id)
            .ok_or(TokenError::InvalidClaims("user_id"))?;
        let booking_id = obj
            .get("booking_id")
            .and_then(positive_id)
            .ok_or(TokenError::InvalidClaims("booking_id"))?;

        let exp = match obj.get("exp") {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => Some(n.as_i64().unwrap_or_else(|| {
                #[allow(clippy::cast_possible_truncation)]
                let secs = n.as_f64().unwrap_or_default().floor() as i64;
                secs
            })),
            Some(_) => return Err(TokenError::InvalidClaims("exp")),
        };

        Ok(Self {
            user_id,
            booking_id,
            exp,
        })
    }

    /// True when `exp` is set and strictly before `now`.
    pub const fn is_expired_at(&self, now: i64) -> bool {
        match self.exp {
            Some(exp) => exp < now,
            None => false,
        }
    }
}
