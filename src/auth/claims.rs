/// Token Claims
///
/// Every signed token is a `Claims<P>`: a class-specific payload flattened
/// next to the registered claims (`iat`, `exp`, `iss`).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::principal::Principal;

/// Envelope shared by access and refresh tokens
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims<P> {
    #[serde(flatten)]
    pub payload: P,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp), exclusive
    pub exp: i64,
    pub iss: String,
}

impl<P> Claims<P> {
    pub fn new(payload: P, issued_at: i64, ttl_seconds: i64, issuer: String) -> Self {
        Self {
            payload,
            iat: issued_at,
            exp: issued_at + ttl_seconds,
            iss: issuer,
        }
    }

    /// A token is valid on `[iat, exp)`; there is no grace window.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.exp <= now
    }
}

/// Payload of an access token
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AccessPayload {
    /// Principal id
    pub sub: i64,
    pub email: String,
    /// Tenant attribute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<i64>,
}

impl AccessPayload {
    pub fn for_principal(principal: &Principal) -> Self {
        Self {
            sub: principal.id,
            email: principal.email.clone(),
            branch_id: principal.branch_id,
        }
    }
}

/// Payload of a refresh token
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RefreshPayload {
    pub sub: i64,
    /// Id of the stored record backing this token. Tokens minted before the
    /// id was embedded carry none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<Uuid>,
    #[serde(default)]
    pub nonce: String,
}

pub type AccessClaims = Claims<AccessPayload>;
pub type RefreshClaims = Claims<RefreshPayload>;
