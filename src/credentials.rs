//! Password hashing with Argon2id.

use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

/// Upper bound on plaintext length accepted by the hasher.
pub const MAX_PASSWORD_BYTES: usize = 1024;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("password exceeds {MAX_PASSWORD_BYTES} bytes")]
    PasswordTooLong,
    #[error("stored password hash is malformed")]
    MalformedHash,
    #[error("password hashing failed: {0}")]
    Primitive(String),
}

pub trait CredentialHasher: Send + Sync {
    /// Produce a salted PHC string for `plaintext`.
    ///
    /// # Errors
    /// Returns `HashError` if the plaintext is too long or the primitive fails.
    fn hash(&self, plaintext: &SecretString) -> Result<String, HashError>;

    /// Check `plaintext` against a stored PHC string.
    ///
    /// A mismatch is `Ok(false)`. Only a corrupt stored hash is an error.
    ///
    /// # Errors
    /// Returns `HashError::MalformedHash` if `hash` cannot be parsed.
    fn verify(&self, hash: &str, plaintext: &SecretString) -> Result<bool, HashError>;
}

#[derive(Debug, Clone)]
pub struct Argon2Hasher {
    params: Params,
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Self {
            params: Params::default(),
        }
    }
}

impl Argon2Hasher {
    #[must_use]
    pub fn new(params: Params) -> Self {
        Self { params }
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, plaintext: &SecretString) -> Result<String, HashError> {
        let plaintext = plaintext.expose_secret().as_bytes();
        if plaintext.len() > MAX_PASSWORD_BYTES {
            return Err(HashError::PasswordTooLong);
        }

        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(plaintext, &salt)
            .map_err(|err| HashError::Primitive(err.to_string()))?;

        Ok(hash.to_string())
    }

    fn verify(&self, hash: &str, plaintext: &SecretString) -> Result<bool, HashError> {
        let parsed = PasswordHash::new(hash).map_err(|_| HashError::MalformedHash)?;

        let plaintext = plaintext.expose_secret().as_bytes();
        if plaintext.len() > MAX_PASSWORD_BYTES {
            return Ok(false);
        }

        // cost parameters come from the stored hash, not from `self.params`
        match self.argon2().verify_password(plaintext, &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(_) => Err(HashError::MalformedHash),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_hasher() -> anyhow::Result<Argon2Hasher> {
        Ok(Argon2Hasher::new(
            Params::new(8, 1, 1, None).map_err(|err| anyhow::anyhow!("{err}"))?,
        ))
    }

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    #[test]
    fn verify_accepts_matching_password() -> anyhow::Result<()> {
        let hasher = fast_hasher()?;
        let hash = hasher.hash(&secret("hunter22"))?;
        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify(&hash, &secret("hunter22"))?);
        Ok(())
    }

    #[test]
    fn verify_rejects_other_password() -> anyhow::Result<()> {
        let hasher = fast_hasher()?;
        let hash = hasher.hash(&secret("hunter22"))?;
        assert!(!hasher.verify(&hash, &secret("hunter23"))?);
        assert!(!hasher.verify(&hash, &secret(""))?);
        Ok(())
    }

    #[test]
    fn hashes_are_salted() -> anyhow::Result<()> {
        let hasher = fast_hasher()?;
        let first = hasher.hash(&secret("same-password"))?;
        let second = hasher.hash(&secret("same-password"))?;
        assert_ne!(first, second);
        Ok(())
    }

    #[test]
    fn default_params_are_the_owasp_baseline() {
        let params = Params::default();
        assert_eq!(params.m_cost(), 19_456);
        assert_eq!(params.t_cost(), 2);
        assert_eq!(params.p_cost(), 1);
    }

    #[test]
    fn malformed_hash_is_an_error() -> anyhow::Result<()> {
        let hasher = fast_hasher()?;
        let result = hasher.verify("not-a-phc-string", &secret("whatever"));
        assert!(matches!(result, Err(HashError::MalformedHash)));
        Ok(())
    }

    #[test]
    fn over_long_passwords() -> anyhow::Result<()> {
        let hasher = fast_hasher()?;
        let long = secret(&"a".repeat(MAX_PASSWORD_BYTES + 1));
        assert!(matches!(hasher.hash(&long), Err(HashError::PasswordTooLong)));

        let hash = hasher.hash(&secret("short-one"))?;
        assert!(!hasher.verify(&hash, &long)?);
        Ok(())
    }
}
