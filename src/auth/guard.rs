/// Bearer token verification for protected requests.
///
/// Pure over (header, signer, clock): no I/O, no shared mutable state.

use chrono::Utc;

use crate::auth::claims::{AccessClaims, AccessPayload};
use crate::auth::jwt::TokenSigner;
use crate::error::{AuthError, TokenError};

const BEARER_SCHEME: &str = "Bearer";

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    if scheme != BEARER_SCHEME || token.is_empty() || token.contains(char::is_whitespace) {
        return None;
    }
    Some(token)
}

pub fn authorize(header: Option<&str>, signer: &TokenSigner) -> Result<AccessClaims, AuthError> {
    authorize_at(header, signer, Utc::now().timestamp())
}

pub fn authorize_at(
    header: Option<&str>,
    signer: &TokenSigner,
    now: i64,
) -> Result<AccessClaims, AuthError> {
    let token = header.and_then(bearer_token).ok_or(AuthError::MissingToken)?;

    signer
        .verify_at::<AccessPayload>(token, now)
        .map_err(|e| match e {
            TokenError::Expired => AuthError::TokenExpired,
            TokenError::Invalid => AuthError::TokenInvalid,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::Algorithm;

    fn signer() -> TokenSigner {
        TokenSigner::new("guard-test-secret-at-least-32-characters", Algorithm::HS256, 3600, "test")
    }

    fn payload() -> AccessPayload {
        AccessPayload { sub: 1, email: "a@x.com".to_string(), branch_id: Some(2) }
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(bearer_token("Bearer"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("BearerToken"), None);
        assert_eq!(bearer_token("Basic dXNlcjpwYXNz"), None);
        assert_eq!(bearer_token("bearer abc"), None);
        assert_eq!(bearer_token("Bearer abc def"), None);
    }

    #[test]
    fn test_missing_header() {
        assert_eq!(authorize(None, &signer()).unwrap_err(), AuthError::MissingToken);
        assert_eq!(
            authorize(Some("Basic abc"), &signer()).unwrap_err(),
            AuthError::MissingToken
        );
    }

    #[test]
    fn test_valid_token_yields_claims() {
        let signer = signer();
        let token = signer.sign(payload()).unwrap();
        let header = format!("Bearer {}", token);

        let claims = authorize(Some(&header), &signer).unwrap();
        assert_eq!(claims.payload, payload());
    }

    #[test]
    fn test_invalid_token() {
        assert_eq!(
            authorize(Some("Bearer invalid.token.here"), &signer()).unwrap_err(),
            AuthError::TokenInvalid
        );
    }

    #[test]
    fn test_expired_vs_valid_around_boundary() {
        let signer = signer();
        let now = 1_700_000_000;

        let stale = signer.sign_at(payload(), now - 3600 - 1).unwrap();
        let fresh = signer.sign_at(payload(), now - 3600 + 1).unwrap();

        assert_eq!(
            authorize_at(Some(&format!("Bearer {}", stale)), &signer, now).unwrap_err(),
            AuthError::TokenExpired
        );
        assert!(authorize_at(Some(&format!("Bearer {}", fresh)), &signer, now).is_ok());
    }
}
