use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Leeway applied when validating `exp`, to tolerate clock skew between
/// instances sharing a token namespace.
const EXPIRY_LEEWAY_SECONDS: u64 = 30;

/// Number of random bytes in a refresh token.
const REFRESH_TOKEN_BYTES: usize = 32;

/// JWT claims embedded in every access token.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Claims {
    /// Subject -- the user's public UUID.
    pub sub: String,
    /// The user's internal numeric id.
    pub user_id: i64,
    /// The user's email address.
    pub email: String,
    /// Issued-at time (UTC Unix timestamp).
    pub iat: i64,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
    /// Unique token identifier (UUID v4).
    pub jti: String,
}

/// Encodes and decodes HS256-signed, time-bound access tokens.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_minutes: i64,
}

impl TokenCodec {
    /// Creates a codec from the shared signing secret.
    pub fn new(secret: &str, ttl_minutes: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl_minutes,
        }
    }

    /// The configured access-token lifetime in minutes.
    pub fn ttl_minutes(&self) -> i64 {
        self.ttl_minutes
    }

    /// Issues a signed access token for the given user.
    ///
    /// # Returns
    ///
    /// A `Result` containing the token string and its expiry as epoch seconds.
    pub fn issue(&self, user_id: i64, user_public_id: Uuid, email: &str) -> Result<(String, i64)> {
        let now = Utc::now().timestamp();
        let exp = now + self.ttl_minutes * 60;

        let claims = Claims {
            sub: user_public_id.to_string(),
            user_id,
            email: email.to_string(),
            iat: now,
            exp,
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token signing error: {}", e)))?;

        Ok((token, exp))
    }

    /// Validates a token's signature and expiry.
    ///
    /// Returns `None` for every failure mode (expired, malformed, tampered);
    /// callers never learn which, so the HTTP layer reports a uniform 401.
    pub fn validate(&self, token: &str) -> Option<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = EXPIRY_LEEWAY_SECONDS;

        match decode::<Claims>(token, &self.decoding_key, &validation) {
            Ok(data) => Some(data.claims),
            Err(_) => None,
        }
    }
}

/// Extracts the token from an `Authorization` header value.
///
/// Anything other than exactly two whitespace-separated parts with a
/// case-insensitive "Bearer" prefix yields `None`.
pub fn extract_from_header(header_value: &str) -> Option<&str> {
    let mut parts = header_value.split_whitespace();
    let scheme = parts.next()?;
    let token = parts.next()?;

    if parts.next().is_some() || !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    Some(token)
}

/// Seconds remaining until `exp_timestamp`, clamped to zero.
pub fn remaining_seconds(exp_timestamp: i64) -> i64 {
    (exp_timestamp - Utc::now().timestamp()).max(0)
}

/// Computes the SHA-256 hex digest of a token. Only digests are ever
/// persisted, so a database leak does not compromise active sessions.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time comparison of two token digests.
pub fn hashes_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Generates an opaque refresh token: 32 random bytes, base64url.
pub fn generate_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
