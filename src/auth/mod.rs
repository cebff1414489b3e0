/// Authentication module
///
/// Token signing/verification, credential hashing, refresh token storage,
/// the session manager and the bearer guard.

mod claims;
mod guard;
mod jwt;
mod password;
mod refresh_token;
mod session;

pub use claims::{AccessClaims, AccessPayload, Claims, RefreshClaims, RefreshPayload};
pub use guard::{authorize, authorize_at, bearer_token};
pub use jwt::TokenSigner;
pub use password::{CredentialHasher, DEFAULT_HASH_COST};
pub use refresh_token::{
    generate_nonce, token_digest, InMemoryRefreshTokenStore, PgRefreshTokenStore,
    RefreshTokenRecord, RefreshTokenStore,
};
pub use session::{LoginOutcome, SessionManager, SessionTokens};
