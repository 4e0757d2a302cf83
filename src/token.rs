//! HS256 bearer tokens.
//!
//! Tokens are compact JWS strings signed with a shared secret. Validation pins
//! the algorithm to `HS256`, requires `exp`, and checks `nbf`, `iss` and `aud`
//! against the deployment settings. Every rejection surfaces as the same
//! opaque [`TokenError::Invalid`]; the [`InvalidTokenReason`] is only for logs.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::{fmt, time::Duration};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "HS256";
pub const DEFAULT_ISSUER: &str = "accountd";
pub const DEFAULT_AUDIENCE: &str = "accountd";
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidTokenReason {
    Malformed,
    MissingBearer,
    UnsupportedAlgorithm,
    BadSignature,
    MissingExpiry,
    Expired,
    NotYetValid,
    IssuerMismatch,
    AudienceMismatch,
}

impl fmt::Display for InvalidTokenReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Malformed => "malformed token",
            Self::MissingBearer => "missing bearer prefix",
            Self::UnsupportedAlgorithm => "unsupported algorithm",
            Self::BadSignature => "signature mismatch",
            Self::MissingExpiry => "missing exp claim",
            Self::Expired => "token expired",
            Self::NotYetValid => "token not yet valid",
            Self::IssuerMismatch => "issuer mismatch",
            Self::AudienceMismatch => "audience mismatch",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token")]
    Invalid(InvalidTokenReason),
    #[error("could not issue token: {0}")]
    Issuance(String),
}

impl TokenError {
    #[must_use]
    pub fn reason(&self) -> Option<InvalidTokenReason> {
        match self {
            Self::Invalid(reason) => Some(*reason),
            Self::Issuance(_) => None,
        }
    }
}

impl From<InvalidTokenReason> for TokenError {
    fn from(reason: InvalidTokenReason) -> Self {
        Self::Invalid(reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

// Optional fields let validation report which claim is missing.
#[derive(Debug, Deserialize)]
struct RawClaims {
    sub: String,
    iat: i64,
    exp: Option<i64>,
    nbf: Option<i64>,
    iss: Option<String>,
    aud: Option<String>,
}

#[derive(Clone)]
pub struct TokenSettings {
    pub secret: SecretString,
    pub issuer: String,
    pub audience: String,
    pub lifetime: Duration,
}

impl fmt::Debug for TokenSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSettings")
            .field("secret", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

impl TokenSettings {
    #[must_use]
    pub fn new(secret: SecretString) -> Self {
        Self {
            secret,
            issuer: DEFAULT_ISSUER.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
            lifetime: DEFAULT_LIFETIME,
        }
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = audience.into();
        self
    }

    #[must_use]
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }
}

pub trait TokenAuthenticator: Send + Sync {
    /// Build claims for `subject` valid from now for the configured lifetime.
    fn generate_claims(&self, subject: &str) -> Claims;

    /// Sign `claims` into a compact token.
    ///
    /// # Errors
    /// Returns `TokenError::Issuance` if no secret is configured or encoding fails.
    fn issue(&self, claims: &Claims) -> Result<String, TokenError>;

    /// Verify a compact token and return its claims.
    ///
    /// # Errors
    /// Returns `TokenError::Invalid` for any rejected token.
    fn validate(&self, token: &str) -> Result<Claims, TokenError>;
}

#[derive(Debug, Clone)]
pub struct JwtAuthenticator {
    settings: TokenSettings,
}

impl JwtAuthenticator {
    #[must_use]
    pub fn new(settings: TokenSettings) -> Self {
        Self { settings }
    }

    #[must_use]
    pub fn settings(&self) -> &TokenSettings {
        &self.settings
    }

    #[must_use]
    pub fn generate_claims_at(&self, subject: &str, now: i64) -> Claims {
        let lifetime = i64::try_from(self.settings.lifetime.as_secs()).unwrap_or(i64::MAX);
        Claims {
            sub: subject.to_string(),
            iat: now,
            nbf: now,
            exp: now.saturating_add(lifetime),
            iss: self.settings.issuer.clone(),
            aud: self.settings.audience.clone(),
        }
    }

    /// Validate `token` as of `now` (unix seconds).
    ///
    /// # Errors
    /// Returns `TokenError::Invalid` with the first failed check.
    pub fn validate_at(&self, token: &str, now: i64) -> Result<Claims, TokenError> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(claims_b64), Some(sig_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(InvalidTokenReason::Malformed.into());
        };

        let header: Header = decode_json(header_b64)?;
        if header.alg != ALGORITHM {
            return Err(InvalidTokenReason::UnsupportedAlgorithm.into());
        }

        let signature =
            Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| InvalidTokenReason::Malformed)?;

        let secret = self.settings.secret.expose_secret().as_bytes();
        if secret.is_empty() {
            return Err(InvalidTokenReason::BadSignature.into());
        }
        let mut mac =
            HmacSha256::new_from_slice(secret).map_err(|_| InvalidTokenReason::BadSignature)?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| InvalidTokenReason::BadSignature)?;

        let raw: RawClaims = decode_json(claims_b64)?;

        let exp = raw.exp.ok_or(InvalidTokenReason::MissingExpiry)?;
        if exp <= now {
            return Err(InvalidTokenReason::Expired.into());
        }
        if raw.nbf.is_some_and(|nbf| nbf > now) {
            return Err(InvalidTokenReason::NotYetValid.into());
        }
        if raw.iss.as_deref() != Some(self.settings.issuer.as_str()) {
            return Err(InvalidTokenReason::IssuerMismatch.into());
        }
        if raw.aud.as_deref() != Some(self.settings.audience.as_str()) {
            return Err(InvalidTokenReason::AudienceMismatch.into());
        }

        Ok(Claims {
            sub: raw.sub,
            iat: raw.iat,
            nbf: raw.nbf.unwrap_or(raw.iat),
            exp,
            iss: self.settings.issuer.clone(),
            aud: self.settings.audience.clone(),
        })
    }

    fn sign(&self, signing_input: &str) -> Result<String, TokenError> {
        let secret = self.settings.secret.expose_secret().as_bytes();
        if secret.is_empty() {
            return Err(TokenError::Issuance("signing secret is not configured".to_string()));
        }
        let mut mac = HmacSha256::new_from_slice(secret)
            .map_err(|err| TokenError::Issuance(err.to_string()))?;
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();

        Ok(format!(
            "{signing_input}.{}",
            Base64UrlUnpadded::encode_string(&signature)
        ))
    }
}

impl TokenAuthenticator for JwtAuthenticator {
    fn generate_claims(&self, subject: &str) -> Claims {
        self.generate_claims_at(subject, Utc::now().timestamp())
    }

    fn issue(&self, claims: &Claims) -> Result<String, TokenError> {
        if claims.exp <= claims.iat {
            return Err(TokenError::Issuance(
                "token lifetime must be positive".to_string(),
            ));
        }

        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: Some("JWT".to_string()),
        };
        let header_b64 = encode_json(&header)?;
        let claims_b64 = encode_json(claims)?;

        self.sign(&format!("{header_b64}.{claims_b64}"))
    }

    fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        self.validate_at(token, Utc::now().timestamp())
    }
}

fn encode_json<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value).map_err(|err| TokenError::Issuance(err.to_string()))?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn decode_json<T: for<'de> Deserialize<'de>>(segment: &str) -> Result<T, TokenError> {
    let bytes =
        Base64UrlUnpadded::decode_vec(segment).map_err(|_| InvalidTokenReason::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| InvalidTokenReason::Malformed.into())
}

/// Authenticated caller, derived from a validated bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    subject: String,
}

impl CallerIdentity {
    /// Parse an `Authorization` header value of the form `Bearer <token>`.
    ///
    /// # Errors
    /// Returns `TokenError::Invalid` if the prefix is missing or the token is rejected.
    pub fn from_bearer(
        header_value: &str,
        authenticator: &dyn TokenAuthenticator,
    ) -> Result<Self, TokenError> {
        let token = header_value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(InvalidTokenReason::MissingBearer)?;

        let claims = authenticator.validate(token)?;

        Ok(Self::from(claims))
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

impl From<Claims> for CallerIdentity {
    fn from(claims: Claims) -> Self {
        Self {
            subject: claims.sub,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn authenticator(secret: &str) -> JwtAuthenticator {
        JwtAuthenticator::new(TokenSettings::new(SecretString::from(secret.to_string())))
    }

    fn forge(auth: &JwtAuthenticator, header: &str, claims: &str) -> Result<String, TokenError> {
        let header_b64 = Base64UrlUnpadded::encode_string(header.as_bytes());
        let claims_b64 = Base64UrlUnpadded::encode_string(claims.as_bytes());
        auth.sign(&format!("{header_b64}.{claims_b64}"))
    }

    fn reason(result: Result<Claims, TokenError>) -> Option<InvalidTokenReason> {
        result.err().and_then(|err| err.reason())
    }

    #[test]
    fn round_trip_preserves_subject() -> anyhow::Result<()> {
        let auth = authenticator("s3cret");
        let claims = auth.generate_claims_at("account-1", NOW);
        assert_eq!(claims.exp, NOW + 3600);
        assert_eq!(claims.iat, NOW);
        assert_eq!(claims.nbf, NOW);
        assert_eq!(claims.iss, DEFAULT_ISSUER);
        assert_eq!(claims.aud, DEFAULT_AUDIENCE);

        let token = auth.issue(&claims)?;
        assert_eq!(token.split('.').count(), 3);

        let validated = auth.validate_at(&token, NOW + 10)?;
        assert_eq!(validated, claims);
        Ok(())
    }

    #[test]
    fn live_clock_round_trip() -> anyhow::Result<()> {
        let auth = authenticator("s3cret");
        let token = auth.issue(&auth.generate_claims("account-2"))?;
        assert_eq!(auth.validate(&token)?.sub, "account-2");
        Ok(())
    }

    #[test]
    fn expired_token_is_rejected() -> anyhow::Result<()> {
        let auth = authenticator("s3cret");
        let token = auth.issue(&auth.generate_claims_at("account-1", NOW))?;
        assert_eq!(
            reason(auth.validate_at(&token, NOW + 3600)),
            Some(InvalidTokenReason::Expired)
        );
        Ok(())
    }

    #[test]
    fn other_secret_is_rejected() -> anyhow::Result<()> {
        let first = authenticator("first");
        let token = first.issue(&first.generate_claims_at("a", NOW))?;
        assert_eq!(
            reason(authenticator("second").validate_at(&token, NOW)),
            Some(InvalidTokenReason::BadSignature)
        );
        Ok(())
    }

    #[test]
    fn altered_algorithm_is_rejected() -> anyhow::Result<()> {
        let auth = authenticator("s3cret");
        let token = auth.issue(&auth.generate_claims_at("a", NOW))?;
        let mut parts = token.splitn(2, '.');
        let _ = parts.next();
        let rest = parts.next().unwrap_or_default();

        for alg in ["none", "HS512", "RS256", "hs256"] {
            let header = Base64UrlUnpadded::encode_string(
                format!(r#"{{"alg":"{alg}","typ":"JWT"}}"#).as_bytes(),
            );
            let tampered = format!("{header}.{rest}");
            assert_eq!(
                reason(auth.validate_at(&tampered, NOW)),
                Some(InvalidTokenReason::UnsupportedAlgorithm),
                "alg {alg}"
            );
        }
        Ok(())
    }

    #[test]
    fn tampered_claims_fail_signature() -> anyhow::Result<()> {
        let auth = authenticator("s3cret");
        let token = auth.issue(&auth.generate_claims_at("a", NOW))?;
        let segments: Vec<&str> = token.split('.').collect();
        let forged_claims = Base64UrlUnpadded::encode_string(
            format!(
                r#"{{"sub":"b","iat":{NOW},"nbf":{NOW},"exp":{},"iss":"accountd","aud":"accountd"}}"#,
                NOW + 3600
            )
            .as_bytes(),
        );
        let tampered = format!("{}.{forged_claims}.{}", segments[0], segments[2]);
        assert_eq!(
            reason(auth.validate_at(&tampered, NOW)),
            Some(InvalidTokenReason::BadSignature)
        );
        Ok(())
    }

    #[test]
    fn missing_expiry_is_rejected() -> anyhow::Result<()> {
        let auth = authenticator("s3cret");
        let token = forge(
            &auth,
            r#"{"alg":"HS256","typ":"JWT"}"#,
            &format!(r#"{{"sub":"a","iat":{NOW},"iss":"accountd","aud":"accountd"}}"#),
        )?;
        assert_eq!(
            reason(auth.validate_at(&token, NOW)),
            Some(InvalidTokenReason::MissingExpiry)
        );
        Ok(())
    }

    #[test]
    fn future_not_before_is_rejected() -> anyhow::Result<()> {
        let auth = authenticator("s3cret");
        let token = forge(
            &auth,
            r#"{"alg":"HS256"}"#,
            &format!(
                r#"{{"sub":"a","iat":{NOW},"nbf":{},"exp":{},"iss":"accountd","aud":"accountd"}}"#,
                NOW + 60,
                NOW + 3600
            ),
        )?;
        assert_eq!(
            reason(auth.validate_at(&token, NOW)),
            Some(InvalidTokenReason::NotYetValid)
        );
        assert!(auth.validate_at(&token, NOW + 60).is_ok());
        Ok(())
    }

    #[test]
    fn issuer_and_audience_must_match() -> anyhow::Result<()> {
        let issuer = JwtAuthenticator::new(
            TokenSettings::new(SecretString::from("s3cret".to_string())).with_issuer("elsewhere"),
        );
        let token = issuer.issue(&issuer.generate_claims_at("a", NOW))?;
        assert_eq!(
            reason(authenticator("s3cret").validate_at(&token, NOW)),
            Some(InvalidTokenReason::IssuerMismatch)
        );

        let audience = JwtAuthenticator::new(
            TokenSettings::new(SecretString::from("s3cret".to_string())).with_audience("billing"),
        );
        let token = audience.issue(&audience.generate_claims_at("a", NOW))?;
        assert_eq!(
            reason(authenticator("s3cret").validate_at(&token, NOW)),
            Some(InvalidTokenReason::AudienceMismatch)
        );
        Ok(())
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        let auth = authenticator("s3cret");
        for token in ["", "a.b", "a.b.c.d", "!!!.???.***", "e30.e30.e30"] {
            let err = auth.validate_at(token, NOW).err();
            assert!(err.is_some(), "token {token:?}");
            assert_eq!(err.map(|e| e.to_string()), Some("invalid token".to_string()));
        }
    }

    #[test]
    fn issuance_requires_secret_and_positive_lifetime() {
        let auth = authenticator("");
        let claims = auth.generate_claims_at("a", NOW);
        assert!(matches!(auth.issue(&claims), Err(TokenError::Issuance(_))));

        let auth = JwtAuthenticator::new(
            TokenSettings::new(SecretString::from("s3cret".to_string()))
                .with_lifetime(Duration::ZERO),
        );
        let claims = auth.generate_claims_at("a", NOW);
        assert!(matches!(auth.issue(&claims), Err(TokenError::Issuance(_))));
    }

    #[test]
    fn empty_secret_never_validates() -> anyhow::Result<()> {
        let signer = authenticator("s3cret");
        let token = signer.issue(&signer.generate_claims_at("a", NOW))?;
        assert_eq!(
            reason(authenticator("").validate_at(&token, NOW)),
            Some(InvalidTokenReason::BadSignature)
        );
        Ok(())
    }

    #[test]
    fn bearer_header_yields_caller() -> anyhow::Result<()> {
        let auth = authenticator("s3cret");
        let token = auth.issue(&auth.generate_claims("account-9"))?;

        let caller = CallerIdentity::from_bearer(&format!("Bearer {token}"), &auth)?;
        assert_eq!(caller.subject(), "account-9");

        for header in [token.as_str(), "Bearer ", "Bearer", "Basic abc"] {
            let err = CallerIdentity::from_bearer(header, &auth).err();
            assert_eq!(
                err.and_then(|e| e.reason()),
                Some(InvalidTokenReason::MissingBearer),
                "header {header:?}"
            );
        }
        Ok(())
    }

    #[test]
    fn settings_debug_hides_secret() {
        let settings = TokenSettings::new(SecretString::from("s3cret".to_string()));
        let debug = format!("{settings:?}");
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("REDACTED"));
    }
}
