//! Compact HMAC-signed token issuance and validation.
//!
//! Format: `base64url(json(claims)) "." base64url(HMAC-SHA256(secret, payload))`,
//! where the MAC is computed over the encoded payload segment and both
//! segments use the URL-safe alphabet without padding.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::claims::Claims;

type HmacSha256 = Hmac<Sha256>;

/// Reasons a token is rejected. Never shown to clients.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token signing secret is not configured")]
    Unconfigured,

    #[error("token is not two non-empty segments")]
    Malformed,

    #[error("signature mismatch")]
    BadSignature,

    #[error("payload is not valid base64url JSON")]
    InvalidPayload,

    #[error("missing or invalid claim: {0}")]
    InvalidClaims(&'static str),

    #[error("token expired")]
    Expired,
}

/// Verifies (and, for tooling and tests, issues) booking chat tokens.
#[derive(Clone)]
pub struct TokenVerifier {
    secret: Option<Vec<u8>>,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("configured", &self.secret.is_some())
            .finish()
    }
}

impl TokenVerifier {
    /// Create a verifier. An absent or empty secret rejects every token.
    pub fn new(secret: Option<&str>) -> Self {
        Self {
            secret: secret
                .filter(|s| !s.is_empty())
                .map(|s| s.as_bytes().to_vec()),
        }
    }

    pub const fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    /// Validate a token against the current time and return its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, now_secs())
    }

    /// Validate a token as of `now` (unix seconds).
    pub fn verify_at(&self, token: &str, now: i64) -> Result<Claims, TokenError> {
        let secret = self.secret.as_deref().ok_or(TokenError::Unconfigured)?;

        let mut parts = token.split('.');
        let (Some(payload), Some(signature), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };
        if payload.is_empty() || signature.is_empty() {
            return Err(TokenError::Malformed);
        }

        let expected = sign_segment(secret, payload)?;
        if !bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
            return Err(TokenError::BadSignature);
        }

        let raw = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenError::InvalidPayload)?;
        let value: serde_json::Value =
            serde_json::from_slice(&raw).map_err(|_| TokenError::InvalidPayload)?;
        let claims = Claims::from_payload(&value)?;

        if claims.is_expired_at(now) {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    /// Issue a token for the given claims.
    pub fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        let secret = self.secret.as_deref().ok_or(TokenError::Unconfigured)?;
        let json = serde_json::to_vec(claims).map_err(|_| TokenError::InvalidPayload)?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = sign_segment(secret, &payload)?;
        Ok(format!("{payload}.{signature}"))
    }
}

fn sign_segment(secret: &[u8], payload: &str) -> Result<String, TokenError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| TokenError::Unconfigured)?;
    mac.update(payload.as_bytes());
    Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
}

/// Current unix time in seconds.
pub fn now_secs() -> i64 {
    #[allow(clippy::cast_possible_wrap)]
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;
    secs
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "s3cr3t";

    fn verifier() -> TokenVerifier {
        TokenVerifier::new(Some(SECRET))
    }

    fn claims(exp: Option<i64>) -> Claims {
        Claims {
            user_id: 5,
            booking_id: 42,
            exp,
        }
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let v = verifier();
        let original = claims(Some(now_secs() + 600));
        let token = v.sign(&original).unwrap();
        assert_eq!(v.verify(&token).unwrap(), original);
    }

    #[test]
    fn token_without_exp_never_expires() {
        let v = verifier();
        let token = v.sign(&claims(None)).unwrap();
        assert_eq!(v.verify_at(&token, i64::MAX).unwrap().exp, None);
    }

    #[test]
    fn token_format_is_bit_exact() {
        let v = verifier();
        let token = v.sign(&claims(Some(1_700_000_000))).unwrap();
        let (payload, signature) = token.split_once('.').unwrap();

        assert!(!token.contains('='));
        assert!(!token.contains('+'));
        assert!(!token.contains('/'));

        let json = URL_SAFE_NO_PAD.decode(payload).unwrap();
        assert_eq!(
            String::from_utf8(json).unwrap(),
            r#"{"user_id":5,"booking_id":42,"exp":1700000000}"#
        );

        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(payload.as_bytes());
        let expected = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        assert_eq!(signature, expected);
    }

    #[test]
    fn externally_built_token_verifies() {
        // Built the way the booking service does it: plain JSON, then HMAC over
        // the encoded segment.
        let payload = URL_SAFE_NO_PAD.encode(br#"{"user_id":"7","booking_id":"9"}"#);
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(payload.as_bytes());
        let sig = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        let claims = verifier().verify(&format!("{payload}.{sig}")).unwrap();
        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.booking_id, 9);
    }

    #[test]
    fn expired_token_rejected_even_with_valid_signature() {
        let v = verifier();
        let token = v.sign(&claims(Some(now_secs() - 1))).unwrap();
        assert!(matches!(v.verify(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn exp_equal_to_now_still_valid() {
        let v = verifier();
        let token = v.sign(&claims(Some(1000))).unwrap();
        assert!(v.verify_at(&token, 1000).is_ok());
        assert!(matches!(
            v.verify_at(&token, 1001),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn any_altered_payload_byte_is_rejected() {
        let v = verifier();
        let token = v.sign(&claims(Some(now_secs() + 600))).unwrap();
        let (payload, signature) = token.split_once('.').unwrap();

        for i in 0..payload.len() {
            let mut bytes = payload.as_bytes().to_vec();
            bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
            let tampered = format!("{}.{signature}", String::from_utf8(bytes).unwrap());
            assert!(
                matches!(v.verify(&tampered), Err(TokenError::BadSignature)),
                "byte {i} altered but token accepted"
            );
        }
    }

    #[test]
    fn wrong_secret_rejected() {
        let token = verifier().sign(&claims(None)).unwrap();
        let other = TokenVerifier::new(Some("different"));
        assert!(matches!(other.verify(&token), Err(TokenError::BadSignature)));
    }

    #[test]
    fn unconfigured_secret_rejects_everything() {
        let token = verifier().sign(&claims(None)).unwrap();
        for v in [TokenVerifier::new(None), TokenVerifier::new(Some(""))] {
            assert!(!v.is_configured());
            assert!(matches!(v.verify(&token), Err(TokenError::Unconfigured)));
            assert!(matches!(v.sign(&claims(None)), Err(TokenError::Unconfigured)));
        }
    }

    #[test]
    fn malformed_shapes_rejected() {
        let v = verifier();
        for token in ["", "abc", ".sig", "payload.", "a.b.c", "."] {
            assert!(
                matches!(v.verify(token), Err(TokenError::Malformed)),
                "accepted {token:?}"
            );
        }
    }

    #[test]
    fn signed_garbage_payload_rejected() {
        let v = verifier();
        let payload = URL_SAFE_NO_PAD.encode(b"not json");
        let sig = sign_segment(SECRET.as_bytes(), &payload).unwrap();
        assert!(matches!(
            v.verify(&format!("{payload}.{sig}")),
            Err(TokenError::InvalidPayload)
        ));

        let payload = URL_SAFE_NO_PAD.encode(br#"{"user_id":-1,"booking_id":4}"#);
        let sig = sign_segment(SECRET.as_bytes(), &payload).unwrap();
        assert!(matches!(
            v.verify(&format!("{payload}.{sig}")),
            Err(TokenError::InvalidClaims("user_id"))
        ));
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let rendered = format!("{:?}", verifier());
        assert!(!rendered.contains(SECRET));
    }
}
