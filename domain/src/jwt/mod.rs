//! Bearer tokens identifying the account a metered request is charged to.
//!
//! Tokens are HS256 JWTs carrying the account id in an `id` claim. They are issued by the
//! subscription side of the product; this module only verifies them, and issues tokens
//! for local development and tests.
//!
//! # Example
//!
//! ```rust
//! use domain::jwt::{decode_account_id, encode_token};
//! use domain::Id;
//! use std::time::Duration;
//!
//! let account_id = Id::new_v4();
//! let token = encode_token(account_id, "secret", Duration::from_secs(60)).unwrap();
//!
//! assert_eq!(decode_account_id(&token, "secret").unwrap(), account_id);
//! ```

use crate::error::{DomainErrorKind, Error, InternalErrorKind};
use crate::Id;
use claims::AccountClaims;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::*;
use std::time::Duration;

pub(crate) mod claims;

/// Verifies `token` against `secret` and returns the account it was issued for.
pub fn decode_account_id(token: &str, secret: &str) -> Result<Id, Error> {
    let validation = Validation::new(Algorithm::HS256);

    let data = decode::<AccountClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|err| {
        debug!("Rejected bearer token: {err}");
        err
    })?;

    Ok(data.claims.id)
}

/// Issues a token for `account_id` that expires after `ttl`.
pub fn encode_token(account_id: Id, secret: &str, ttl: Duration) -> Result<String, Error> {
    let ttl = chrono::Duration::from_std(ttl).map_err(|err| Error {
        source: Some(Box::new(err)),
        error_kind: DomainErrorKind::Internal(InternalErrorKind::Config),
    })?;
    let exp = (chrono::Utc::now() + ttl).timestamp().max(0) as usize;

    let claims = AccountClaims {
        id: account_id,
        exp,
    };

    Ok(encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_decode_to_their_account() {
        let account_id = Id::new_v4();
        let token = encode_token(account_id, "s3cret", Duration::from_secs(60)).unwrap();

        assert_eq!(decode_account_id(&token, "s3cret").unwrap(), account_id);
    }

    #[test]
    fn tokens_signed_with_another_secret_are_rejected() {
        let token = encode_token(Id::new_v4(), "s3cret", Duration::from_secs(60)).unwrap();

        assert!(decode_account_id(&token, "other").is_err());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let claims = AccountClaims {
            id: Id::new_v4(),
            exp: (chrono::Utc::now().timestamp() - 3600) as usize,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"s3cret"),
        )
        .unwrap();

        assert!(decode_account_id(&token, "s3cret").is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode_account_id("not-a-token", "s3cret").is_err());
    }
}
