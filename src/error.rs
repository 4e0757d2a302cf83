//! Error taxonomy for account operations.
//!
//! The store adapter classifies backend failures into these variants and the
//! account service hands them to the caller unchanged, so nothing lower-level
//! (sqlx, argon2, serde) leaks past this type.

use thiserror::Error;

use crate::{credentials::HashError, token::TokenError};

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("invalid account id")]
    InvalidIdentifier,
    #[error("account not found")]
    NotFound,
    #[error("email already exists")]
    EmailConflict,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("unauthorized access")]
    Unauthorized,
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("could not hash password")]
    Hashing(#[from] HashError),
    #[error("could not generate token")]
    TokenIssuance(#[source] TokenError),
    #[error("invalid token")]
    TokenInvalid,
    #[error("insert failed: {0}")]
    InsertFailed(String),
    #[error("update failed: {0}")]
    UpdateFailed(String),
    #[error("delete failed: {0}")]
    DeleteFailed(String),
    #[error("store error: {0}")]
    Store(String),
}

impl From<TokenError> for AccountError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid(_) => Self::TokenInvalid,
            TokenError::Issuance(_) => Self::TokenIssuance(err),
        }
    }
}
