//! Account entity, request payloads and outward projections.

use chrono::{DateTime, Utc};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::AccountError;

pub const NAME_MIN_CHARS: usize = 3;
pub const NAME_MAX_CHARS: usize = 50;
pub const PASSWORD_MIN_CHARS: usize = 6;
pub const PASSWORD_MAX_CHARS: usize = 50;

#[derive(Clone, PartialEq, Eq)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password_hash", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Public projection of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountView {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl From<&Account> for AccountView {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.to_string(),
            name: account.name.clone(),
            email: account.email.clone(),
        }
    }
}

impl From<Account> for AccountView {
    fn from(account: Account) -> Self {
        Self {
            id: account.id.to_string(),
            name: account.name,
            email: account.email,
        }
    }
}

#[derive(Clone, Serialize)]
pub struct AuthenticatedAccount {
    #[serde(flatten)]
    pub account: AccountView,
    pub token: String,
}

impl fmt::Debug for AuthenticatedAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedAccount")
            .field("account", &self.account)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdatedAccount {
    #[serde(flatten)]
    pub account: AccountView,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DeleteConfirmation {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: SecretString,
}

impl RegisterRequest {
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>, password: &str) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password: SecretString::from(password.to_string()),
        }
    }

    /// # Errors
    /// Returns `AccountError::InvalidInput` naming the first failing field.
    pub fn validate(&self) -> Result<(), AccountError> {
        validate_name(&self.name)?;
        validate_email(&self.email)?;
        validate_password(&self.password)
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: SecretString,
}

impl LoginRequest {
    #[must_use]
    pub fn new(email: impl Into<String>, password: &str) -> Self {
        Self {
            email: email.into(),
            password: SecretString::from(password.to_string()),
        }
    }

    /// # Errors
    /// Returns `AccountError::InvalidInput` naming the first failing field.
    pub fn validate(&self) -> Result<(), AccountError> {
        validate_email(&self.email)?;
        validate_password(&self.password)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateRequest {
    pub name: String,
    pub email: String,
}

impl UpdateRequest {
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// # Errors
    /// Returns `AccountError::InvalidInput` naming the first failing field.
    pub fn validate(&self) -> Result<(), AccountError> {
        validate_name(&self.name)?;
        validate_email(&self.email)
    }
}

/// Basic email format check.
pub(crate) fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email))
}

fn validate_name(name: &str) -> Result<(), AccountError> {
    let chars = name.trim().chars().count();
    if chars < NAME_MIN_CHARS {
        return Err(AccountError::InvalidInput("name is too short"));
    }
    if chars > NAME_MAX_CHARS {
        return Err(AccountError::InvalidInput("name is too long"));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), AccountError> {
    if valid_email(email) {
        Ok(())
    } else {
        Err(AccountError::InvalidInput("email is not valid"))
    }
}

fn validate_password(password: &SecretString) -> Result<(), AccountError> {
    let chars = password.expose_secret().chars().count();
    if chars < PASSWORD_MIN_CHARS {
        return Err(AccountError::InvalidInput("password is too short"));
    }
    if chars > PASSWORD_MAX_CHARS {
        return Err(AccountError::InvalidInput("password is too long"));
    }
    Ok(())
}
