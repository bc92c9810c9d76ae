//! Issuing and checking session tokens.
//!
//! Tokens are HS256 JWTs whose subject is the user id. They carry an issue time and
//! an expiry, and hold nothing else about the user, so a profile change never
//! invalidates a session.

use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use jwt::{RegisteredClaims, SignWithKey, VerifyWithKey};
use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::request::{self, FromRequest, Request};
use sha2::Sha256;
use tracing::{debug, error};

use crate::config::Config;
use crate::errors::Result;
use crate::types::ApiError;

const ISSUER: &str = "conduit";

/// The authenticated caller. Only the id is trusted; everything else is loaded
/// from the store by whoever needs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i32,
}

/// Required posture: handlers taking this reject anonymous callers.
pub type CurrentUser = std::result::Result<Identity, ApiError>;

/// Optional posture: a missing or bad token yields an anonymous caller.
pub type MaybeUser = Option<Identity>;

#[derive(Clone)]
pub struct IdentityProvider {
    key: Hmac<Sha256>,
    ttl: Duration,
}

impl IdentityProvider {
    pub fn new(secret: &[u8], ttl: Duration) -> Result<IdentityProvider> {
        let key = Hmac::<Sha256>::new_from_slice(secret).map_err(|_| "invalid token secret")?;
        Ok(IdentityProvider { key, ttl })
    }

    pub fn from_config(config: &Config) -> Result<IdentityProvider> {
        IdentityProvider::new(config.jwt_secret.as_bytes(), config.token_ttl)
    }

    pub fn issue_token(&self, user_id: i32) -> std::result::Result<String, ApiError> {
        let now = Utc::now();
        let expires = now.checked_add_signed(self.ttl).ok_or_else(|| {
            error!("token lifetime {} overflows the clock", self.ttl);
            ApiError::Internal
        })?;
        let claims = RegisteredClaims {
            issuer: Some(ISSUER.to_string()),
            subject: Some(user_id.to_string()),
            issued_at: Some(now.timestamp() as u64),
            expiration: Some(expires.timestamp().max(0) as u64),
            ..Default::default()
        };
        claims.sign_with_key(&self.key).map_err(|e| {
            error!("failed to sign token: {}", e);
            ApiError::Internal
        })
    }

    pub fn authenticate(&self, token: &str) -> std::result::Result<Identity, ApiError> {
        let claims: RegisteredClaims = token.verify_with_key(&self.key).map_err(|e| {
            debug!("rejected token: {}", e);
            ApiError::Unauthorized
        })?;

        let expiration = claims.expiration.ok_or(ApiError::Unauthorized)?;
        if expiration <= Utc::now().timestamp().max(0) as u64 {
            debug!("rejected expired token");
            return Err(ApiError::Unauthorized);
        }

        let user_id = claims
            .subject
            .as_ref()
            .and_then(|sub| sub.parse::<i32>().ok())
            .ok_or(ApiError::Unauthorized)?;
        Ok(Identity { user_id })
    }
}

/// Strips the `Token` (or `Bearer`) scheme from an `Authorization` header value.
fn token_from_header(header: &str) -> Option<&str> {
    let header = header.trim();
    ["Token ", "Bearer "]
        .iter()
        .find_map(|scheme| header.strip_prefix(scheme))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Identity {
    type Error = ApiError;

    async fn from_request(request: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let provider = match request.rocket().state::<IdentityProvider>() {
            Some(provider) => provider,
            None => return Outcome::Error((Status::InternalServerError, ApiError::Internal)),
        };

        let token = request
            .headers()
            .get_one("Authorization")
            .and_then(token_from_header);
        match token {
            Some(token) => match provider.authenticate(token) {
                Ok(identity) => Outcome::Success(identity),
                Err(e) => Outcome::Error((Status::Unauthorized, e)),
            },
            None => Outcome::Error((Status::Unauthorized, ApiError::Unauthorized)),
        }
    }
}
