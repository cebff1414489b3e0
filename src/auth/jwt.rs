/// JWT Token Codec
///
/// Signs and verifies tokens for one token class. The service holds two
/// signers, one per class, each with its own secret and lifetime.

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::auth::claims::Claims;
use crate::error::{AppError, TokenError};

#[derive(Clone)]
pub struct TokenSigner {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl_seconds: i64,
    issuer: String,
}

impl TokenSigner {
    pub fn new(secret: &str, algorithm: Algorithm, ttl_seconds: i64, issuer: &str) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "iat", "iss"]);
        // Expiry is checked in `verify_at` so the boundary is exact
        validation.validate_exp = false;
        validation.leeway = 0;

        Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl_seconds,
            issuer: issuer.to_string(),
        }
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    /// Sign a payload issued now
    ///
    /// # Errors
    /// Returns error if the payload cannot be serialized
    pub fn sign<P: Serialize>(&self, payload: P) -> Result<String, AppError> {
        self.sign_at(payload, Utc::now().timestamp())
    }

    pub fn sign_at<P: Serialize>(&self, payload: P, issued_at: i64) -> Result<String, AppError> {
        let claims = Claims::new(payload, issued_at, self.ttl_seconds, self.issuer.clone());

        encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }

    /// Verify a token against the current wall clock
    pub fn verify<P: DeserializeOwned>(&self, token: &str) -> Result<Claims<P>, TokenError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Check signature and shape first, then expiry.
    ///
    /// `Expired` is only ever returned for a token this signer produced.
    pub fn verify_at<P: DeserializeOwned>(
        &self,
        token: &str,
        now: i64,
    ) -> Result<Claims<P>, TokenError> {
        let claims = decode::<Claims<P>>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => {
                    tracing::debug!("JWT validation error: {}", e);
                    TokenError::Invalid
                }
            })?;

        if claims.is_expired_at(now) {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::{AccessPayload, RefreshPayload};

    const ACCESS_SECRET: &str = "test-access-secret-at-least-32-characters";
    const REFRESH_SECRET: &str = "test-refresh-secret-at-least-32-characters";

    fn access_signer() -> TokenSigner {
        TokenSigner::new(ACCESS_SECRET, Algorithm::HS256, 3600, "test")
    }

    fn payload() -> AccessPayload {
        AccessPayload {
            sub: 42,
            email: "test@example.com".to_string(),
            branch_id: Some(1),
        }
    }

    #[test]
    fn test_sign_and_verify_token() {
        let signer = access_signer();

        let token = signer.sign(payload()).expect("Failed to generate token");
        let claims: Claims<AccessPayload> = signer.verify(&token).expect("Failed to validate token");

        assert_eq!(claims.payload, payload());
        assert_eq!(claims.exp - claims.iat, 3600);
        assert_eq!(claims.iss, "test");
    }

    #[test]
    fn test_malformed_token_is_invalid() {
        let result = access_signer().verify::<AccessPayload>("invalid.token.here");
        assert_eq!(result.unwrap_err(), TokenError::Invalid);
    }

    #[test]
    fn test_tampered_token_is_invalid() {
        let signer = access_signer();
        let token = signer.sign(payload()).expect("Failed to generate token");

        let tampered = format!("{}X", token);
        let result = signer.verify::<AccessPayload>(&tampered);

        assert_eq!(result.unwrap_err(), TokenError::Invalid);
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let refresh = TokenSigner::new(REFRESH_SECRET, Algorithm::HS256, 604800, "test");
        let token = refresh
            .sign(RefreshPayload { sub: 42, jti: None, nonce: "n".to_string() })
            .expect("Failed to generate token");

        let result = access_signer().verify::<AccessPayload>(&token);
        assert_eq!(result.unwrap_err(), TokenError::Invalid);
    }

    #[test]
    fn test_wrong_issuer_is_invalid() {
        let token = access_signer().sign(payload()).expect("Failed to generate token");
        let other = TokenSigner::new(ACCESS_SECRET, Algorithm::HS256, 3600, "someone-else");

        assert_eq!(
            other.verify::<AccessPayload>(&token).unwrap_err(),
            TokenError::Invalid
        );
    }

    #[test]
    fn test_expired_one_second_ago() {
        let signer = access_signer();
        let now = 1_700_000_000;
        let token = signer.sign_at(payload(), now - 3600 - 1).unwrap();

        let result = signer.verify_at::<AccessPayload>(&token, now);
        assert_eq!(result.unwrap_err(), TokenError::Expired);
    }

    #[test]
    fn test_valid_until_one_second_before_expiry() {
        let signer = access_signer();
        let now = 1_700_000_000;
        let token = signer.sign_at(payload(), now - 3600 + 1).unwrap();

        assert!(signer.verify_at::<AccessPayload>(&token, now).is_ok());
    }

    #[test]
    fn test_expiry_instant_itself_is_expired() {
        let signer = access_signer();
        let now = 1_700_000_000;
        let token = signer.sign_at(payload(), now - 3600).unwrap();

        assert_eq!(
            signer.verify_at::<AccessPayload>(&token, now).unwrap_err(),
            TokenError::Expired
        );
    }

    #[test]
    fn test_expired_token_with_bad_signature_is_invalid() {
        let signer = access_signer();
        let token = signer.sign_at(payload(), 0).unwrap();
        let tampered = format!("{}X", token);

        assert_eq!(
            signer.verify_at::<AccessPayload>(&tampered, 1_700_000_000).unwrap_err(),
            TokenError::Invalid
        );
    }
}
