//! Issuing and verifying the bearer tokens used to authenticate API requests.

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use time::{Duration, OffsetDateTime};

use crate::{Error, UserId};

/// The contents of a JSON Web Token.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// The user the token was issued to.
    pub sub: UserId,
    /// The expiry time of the token as a Unix timestamp.
    pub exp: u64,
    /// The time the token was issued as a Unix timestamp.
    pub iat: u64,
}

/// The keys for signing and verifying tokens, derived from the server secret.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenKeys {
    /// Derive the signing keys from `secret`.
    ///
    /// The secret is hashed with SHA-512 so that secrets of any length give a
    /// full-strength HMAC key.
    pub fn from_secret(secret: &str) -> Self {
        let hash = Sha512::digest(secret.as_bytes());

        Self {
            encoding: EncodingKey::from_secret(&hash),
            decoding: DecodingKey::from_secret(&hash),
        }
    }
}

/// The body returned by the register, log-in and refresh routes.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The signed token to send in the `Authorization: Bearer` header.
    pub access_token: String,
    /// Always "bearer".
    pub token_type: String,
}

/// Issue a token for `user_id` that expires after `duration`.
///
/// # Errors
///
/// Returns a [Error::TokenError] if the token could not be signed.
pub fn encode_token(
    user_id: UserId,
    duration: Duration,
    keys: &TokenKeys,
) -> Result<TokenResponse, Error> {
    let now = OffsetDateTime::now_utc();
    let claims = Claims {
        sub: user_id,
        exp: unix_timestamp(now + duration),
        iat: unix_timestamp(now),
    };

    let access_token = encode(&Header::default(), &claims, &keys.encoding)
        .map_err(|error| Error::TokenError(error.to_string()))?;

    Ok(TokenResponse {
        access_token,
        token_type: "bearer".to_owned(),
    })
}

/// Verify `token` and return its claims.
///
/// # Errors
///
/// Returns [Error::Unauthenticated] if the token is malformed, has a bad
/// signature or has expired.
pub fn decode_token(token: &str, keys: &TokenKeys) -> Result<Claims, Error> {
    decode::<Claims>(token, &keys.decoding, &Validation::default())
        .map(|token_data| token_data.claims)
        .map_err(|error| {
            tracing::debug!("Rejected access token: {error}");
            Error::Unauthenticated
        })
}

fn unix_timestamp(date_time: OffsetDateTime) -> u64 {
    u64::try_from(date_time.unix_timestamp()).unwrap_or(0)
}
