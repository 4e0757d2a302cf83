//! Account orchestration: validation, hashing, persistence and token issuance.

use secrecy::SecretString;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::{
    context::OperationContext,
    credentials::{CredentialHasher, HashError},
    error::AccountError,
    model::{
        Account, AccountView, AuthenticatedAccount, DeleteConfirmation, LoginRequest,
        RegisterRequest, UpdateRequest, UpdatedAccount,
    },
    store::AccountStore,
    token::{CallerIdentity, TokenAuthenticator},
};

const DECOY_PASSWORD: &str = "decoy-password-for-unknown-accounts";

#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn AccountStore>,
    hasher: Arc<dyn CredentialHasher>,
    tokens: Arc<dyn TokenAuthenticator>,
    decoy_hash: Arc<str>,
}

impl AccountService {
    /// Build the service and hash the decoy credential used for unknown
    /// emails, so no login pays for that hash.
    ///
    /// Call this before serving, outside latency-sensitive paths: it runs one
    /// full hash on the current thread.
    ///
    /// # Errors
    /// Returns `AccountError::Hashing` if the hasher cannot hash the decoy.
    pub fn new(
        store: Arc<dyn AccountStore>,
        hasher: Arc<dyn CredentialHasher>,
        tokens: Arc<dyn TokenAuthenticator>,
    ) -> Result<Self, AccountError> {
        let decoy_hash = hasher.hash(&SecretString::from(DECOY_PASSWORD.to_string()))?;
        Ok(Self {
            store,
            hasher,
            tokens,
            decoy_hash: Arc::from(decoy_hash),
        })
    }

    /// # Errors
    /// Returns `AccountError::Store` if the backend fails.
    #[instrument(skip(self, ctx), fields(trace_id = %ctx.trace_id()))]
    pub async fn list(&self, ctx: &OperationContext) -> Result<Vec<AccountView>, AccountError> {
        let accounts = self.store.list(ctx).await?;
        Ok(accounts.into_iter().map(AccountView::from).collect())
    }

    /// # Errors
    /// Returns `InvalidIdentifier`, `NotFound` or `Store`.
    #[instrument(skip(self, ctx), fields(trace_id = %ctx.trace_id()))]
    pub async fn get_by_id(
        &self,
        ctx: &OperationContext,
        id: &str,
    ) -> Result<AccountView, AccountError> {
        let account = self.store.get_by_id(ctx, id).await?;
        Ok(account.into())
    }

    /// Create an account and return it with a fresh bearer token.
    ///
    /// The account stays persisted if token issuance fails afterwards.
    ///
    /// # Errors
    /// Returns `InvalidInput`, `EmailConflict`, `Hashing`, `TokenIssuance`,
    /// `InsertFailed` or `Store`.
    #[instrument(skip(self, ctx, request), fields(trace_id = %ctx.trace_id()))]
    pub async fn register(
        &self,
        ctx: &OperationContext,
        request: RegisterRequest,
    ) -> Result<AuthenticatedAccount, AccountError> {
        request.validate()?;

        let name = request.name.trim().to_string();
        let password_hash = self.hash_password(request.password).await?;

        let account = self
            .store
            .create(ctx, &name, &request.email, &password_hash)
            .await?;
        info!(account = %account.id, "account registered");

        let token = self.issue_token(&account)?;

        Ok(AuthenticatedAccount {
            account: account.into(),
            token,
        })
    }

    /// Check credentials and return the account with a fresh bearer token.
    ///
    /// An unknown email and a wrong password fail the same way.
    ///
    /// # Errors
    /// Returns `InvalidInput`, `InvalidCredentials`, `Hashing`, `TokenIssuance`
    /// or `Store`.
    #[instrument(skip(self, ctx, request), fields(trace_id = %ctx.trace_id()))]
    pub async fn login(
        &self,
        ctx: &OperationContext,
        request: LoginRequest,
    ) -> Result<AuthenticatedAccount, AccountError> {
        request.validate()?;

        let account = match self.store.get_by_email(ctx, &request.email).await {
            Ok(account) => account,
            Err(AccountError::NotFound) => {
                self.decoy_verify(request.password).await;
                debug!("login for unknown email");
                return Err(AccountError::InvalidCredentials);
            }
            Err(err) => return Err(err),
        };

        if !self
            .verify_password(account.password_hash.clone(), request.password)
            .await?
        {
            debug!(account = %account.id, "password mismatch");
            return Err(AccountError::InvalidCredentials);
        }

        let token = self.issue_token(&account)?;

        Ok(AuthenticatedAccount {
            account: account.into(),
            token,
        })
    }

    /// # Errors
    /// Returns `Unauthorized` unless `caller` owns `id`, then `InvalidInput`,
    /// `InvalidIdentifier`, `NotFound`, `EmailConflict`, `UpdateFailed` or `Store`.
    #[instrument(skip(self, ctx, request, caller), fields(trace_id = %ctx.trace_id()))]
    pub async fn update(
        &self,
        ctx: &OperationContext,
        id: &str,
        request: UpdateRequest,
        caller: &CallerIdentity,
    ) -> Result<UpdatedAccount, AccountError> {
        ensure_owner(caller, id)?;
        request.validate()?;

        let account = self
            .store
            .update(ctx, id, request.name.trim(), &request.email)
            .await?;

        Ok(UpdatedAccount {
            account: account.into(),
            message: "User updated successfully".to_string(),
        })
    }

    /// # Errors
    /// Returns `Unauthorized` unless `caller` owns `id`, then `InvalidIdentifier`,
    /// `NotFound`, `DeleteFailed` or `Store`.
    #[instrument(skip(self, ctx, caller), fields(trace_id = %ctx.trace_id()))]
    pub async fn delete(
        &self,
        ctx: &OperationContext,
        id: &str,
        caller: &CallerIdentity,
    ) -> Result<DeleteConfirmation, AccountError> {
        ensure_owner(caller, id)?;

        self.store.delete(ctx, id).await?;
        info!(account = id, "account deleted");

        Ok(DeleteConfirmation {
            message: format!("User with id {id} deleted successfully"),
        })
    }

    /// # Errors
    /// Returns `AccountError::Store` if the backend fails.
    pub async fn count(&self, ctx: &OperationContext) -> Result<i64, AccountError> {
        self.store.count(ctx).await
    }

    /// Resolve an `Authorization` header into the calling account.
    ///
    /// # Errors
    /// Returns `AccountError::TokenInvalid` for any rejected header.
    pub fn authenticate_bearer(&self, header_value: &str) -> Result<CallerIdentity, AccountError> {
        CallerIdentity::from_bearer(header_value, self.tokens.as_ref()).map_err(|err| {
            if let Some(reason) = err.reason() {
                debug!(%reason, "bearer token rejected");
            }
            AccountError::TokenInvalid
        })
    }

    fn issue_token(&self, account: &Account) -> Result<String, AccountError> {
        let claims = self.tokens.generate_claims(&account.id.to_string());
        self.tokens.issue(&claims).map_err(|err| {
            warn!(account = %account.id, "token issuance failed: {err}");
            AccountError::TokenIssuance(err)
        })
    }

    async fn hash_password(&self, password: SecretString) -> Result<String, AccountError> {
        let hasher = Arc::clone(&self.hasher);
        let hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|err| HashError::Primitive(err.to_string()))??;
        Ok(hash)
    }

    async fn verify_password(
        &self,
        hash: String,
        password: SecretString,
    ) -> Result<bool, AccountError> {
        let hasher = Arc::clone(&self.hasher);
        let matches = tokio::task::spawn_blocking(move || hasher.verify(&hash, &password))
            .await
            .map_err(|err| HashError::Primitive(err.to_string()))??;
        Ok(matches)
    }

    // Burn one verification so unknown emails cost the same as wrong passwords.
    async fn decoy_verify(&self, password: SecretString) {
        let hasher = Arc::clone(&self.hasher);
        let decoy = Arc::clone(&self.decoy_hash);
        let outcome = tokio::task::spawn_blocking(move || hasher.verify(&decoy, &password)).await;

        if let Ok(Err(err)) = outcome {
            debug!("decoy verification failed: {err}");
        }
    }
}

fn ensure_owner(caller: &CallerIdentity, id: &str) -> Result<(), AccountError> {
    if caller.subject() == id {
        Ok(())
    } else {
        warn!(caller = caller.subject(), account = id, "caller does not own account");
        Err(AccountError::Unauthorized)
    }
}
