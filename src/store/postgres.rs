//! PostgreSQL [`AccountCollection`] over an `sqlx` pool.

use secrecy::ExposeSecret;
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    FromRow, PgPool, Row,
};
use std::time::Duration;
use tracing::{error, info_span, Instrument};
use uuid::Uuid;

use super::{
    AccountChanges, AccountCollection, BoxFuture, CollectionError, Lookup, NewAccountDocument,
    StoreSettings,
};
use crate::model::Account;

const SCHEMA: &str = include_str!("../../sql/schema.sql");

const SELECT_ALL: &str = r"
    SELECT id, name, email, password_hash, created_at, updated_at
    FROM accounts
    ORDER BY created_at, id
";
const SELECT_BY_ID: &str = r"
    SELECT id, name, email, password_hash, created_at, updated_at
    FROM accounts
    WHERE id = $1
";
const SELECT_BY_EMAIL: &str = r"
    SELECT id, name, email, password_hash, created_at, updated_at
    FROM accounts
    WHERE email = $1 AND ($2::uuid IS NULL OR id <> $2)
    LIMIT 1
";
const INSERT: &str = r"
    INSERT INTO accounts (name, email, password_hash, created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5)
    RETURNING id
";
const UPDATE: &str = r"
    UPDATE accounts
    SET name = $2, email = $3, updated_at = $4
    WHERE id = $1
    RETURNING id, name, email, password_hash, created_at, updated_at
";
const DELETE: &str = "DELETE FROM accounts WHERE id = $1";
const COUNT: &str = "SELECT COUNT(*) FROM accounts";

impl<'r> FromRow<'r, PgRow> for Account {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Build the connection pool.
///
/// # Errors
/// Returns an error if the first connection cannot be established.
pub async fn connect(settings: &StoreSettings) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .min_connections(1)
        .max_connections(settings.max_connections)
        .max_lifetime(Duration::from_secs(60 * 2))
        .acquire_timeout(settings.operation_timeout)
        .test_before_acquire(true)
        .connect(settings.dsn.expose_secret())
        .await
}

/// Apply `sql/schema.sql`. Every statement is idempotent.
///
/// # Errors
/// Returns an error if any statement fails.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DDL",
            db.statement = statement
        );
        sqlx::query(statement).execute(pool).instrument(span).await?;
    }
    Ok(())
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn classify(err: sqlx::Error) -> CollectionError {
    match err {
        sqlx::Error::RowNotFound => CollectionError::NoDocuments,
        ref err if is_unique_violation(err) => CollectionError::DuplicateKey,
        err => CollectionError::Backend(err.to_string()),
    }
}

fn query_span(operation: &'static str, statement: &'static str) -> tracing::Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

#[derive(Debug, Clone)]
pub struct PgCollection {
    pool: PgPool,
}

impl PgCollection {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl AccountCollection for PgCollection {
    fn find_all(&self) -> BoxFuture<'_, Result<Vec<Account>, CollectionError>> {
        Box::pin(async move {
            sqlx::query_as::<_, Account>(SELECT_ALL)
                .fetch_all(&self.pool)
                .instrument(query_span("SELECT", SELECT_ALL))
                .await
                .map_err(classify)
        })
    }

    fn find_one<'a>(
        &'a self,
        lookup: &'a Lookup,
    ) -> BoxFuture<'a, Result<Account, CollectionError>> {
        Box::pin(async move {
            let found = match lookup {
                Lookup::Id(id) => {
                    sqlx::query_as::<_, Account>(SELECT_BY_ID)
                        .bind(*id)
                        .fetch_optional(&self.pool)
                        .instrument(query_span("SELECT", SELECT_BY_ID))
                        .await
                }
                Lookup::Email { email, exclude } => {
                    sqlx::query_as::<_, Account>(SELECT_BY_EMAIL)
                        .bind(email.as_str())
                        .bind(*exclude)
                        .fetch_optional(&self.pool)
                        .instrument(query_span("SELECT", SELECT_BY_EMAIL))
                        .await
                }
            };
            found.map_err(classify)?.ok_or(CollectionError::NoDocuments)
        })
    }

    fn insert_one<'a>(
        &'a self,
        document: &'a NewAccountDocument,
    ) -> BoxFuture<'a, Result<Uuid, CollectionError>> {
        Box::pin(async move {
            let row = sqlx::query(INSERT)
                .bind(document.name.as_str())
                .bind(document.email.as_str())
                .bind(document.password_hash.as_str())
                .bind(document.created_at)
                .bind(document.updated_at)
                .fetch_one(&self.pool)
                .instrument(query_span("INSERT", INSERT))
                .await
                .map_err(|err| {
                    if !is_unique_violation(&err) {
                        error!("account insert failed: {err}");
                    }
                    classify(err)
                })?;
            row.try_get::<Uuid, _>("id").map_err(classify)
        })
    }

    fn find_one_and_update<'a>(
        &'a self,
        id: Uuid,
        changes: &'a AccountChanges,
    ) -> BoxFuture<'a, Result<Account, CollectionError>> {
        Box::pin(async move {
            sqlx::query_as::<_, Account>(UPDATE)
                .bind(id)
                .bind(changes.name.as_str())
                .bind(changes.email.as_str())
                .bind(changes.updated_at)
                .fetch_optional(&self.pool)
                .instrument(query_span("UPDATE", UPDATE))
                .await
                .map_err(classify)?
                .ok_or(CollectionError::NoDocuments)
        })
    }

    fn delete_one(&self, id: Uuid) -> BoxFuture<'_, Result<u64, CollectionError>> {
        Box::pin(async move {
            sqlx::query(DELETE)
                .bind(id)
                .execute(&self.pool)
                .instrument(query_span("DELETE", DELETE))
                .await
                .map(|result| result.rows_affected())
                .map_err(classify)
        })
    }

    fn count(&self) -> BoxFuture<'_, Result<i64, CollectionError>> {
        Box::pin(async move {
            sqlx::query_scalar::<_, i64>(COUNT)
                .fetch_one(&self.pool)
                .instrument(query_span("SELECT", COUNT))
                .await
                .map_err(classify)
        })
    }
}
