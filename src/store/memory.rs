//! In-memory [`AccountCollection`] for tests and local fakes.
//!
//! Documents keep insertion order. Each operation takes the lock once, so a
//! single call is atomic, but a sequence of calls is not. The optional unique
//! email constraint mirrors the PostgreSQL index.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
    time::Duration,
};
use tokio::{sync::RwLock, time::sleep};
use uuid::Uuid;

use super::{
    AccountChanges, AccountCollection, BoxFuture, CollectionError, Lookup, NewAccountDocument,
};
use crate::model::Account;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionOperation {
    FindAll,
    FindOne,
    InsertOne,
    FindOneAndUpdate,
    DeleteOne,
    Count,
}

#[derive(Debug, Default)]
pub struct MemoryCollection {
    documents: RwLock<Vec<Account>>,
    unique_email: bool,
    latency: Duration,
    failures: Mutex<HashMap<CollectionOperation, CollectionError>>,
}

impl MemoryCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject writes that would duplicate an email, like a unique index.
    #[must_use]
    pub fn with_unique_email(mut self) -> Self {
        self.unique_email = true;
        self
    }

    /// Delay every operation before it touches the documents.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make `operation` fail with `error` until [`Self::clear_failures`].
    pub fn fail_with(&self, operation: CollectionOperation, error: CollectionError) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(operation, error);
    }

    pub fn clear_failures(&self) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    async fn enter(&self, operation: CollectionOperation) -> Result<(), CollectionError> {
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }
        let injected = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&operation)
            .cloned();
        injected.map_or(Ok(()), Err)
    }
}

fn email_taken(documents: &[Account], email: &str, exclude: Option<Uuid>) -> bool {
    documents
        .iter()
        .any(|doc| doc.email == email && Some(doc.id) != exclude)
}

impl AccountCollection for MemoryCollection {
    fn find_all(&self) -> BoxFuture<'_, Result<Vec<Account>, CollectionError>> {
        Box::pin(async move {
            self.enter(CollectionOperation::FindAll).await?;
            Ok(self.documents.read().await.clone())
        })
    }

    fn find_one<'a>(
        &'a self,
        lookup: &'a Lookup,
    ) -> BoxFuture<'a, Result<Account, CollectionError>> {
        Box::pin(async move {
            self.enter(CollectionOperation::FindOne).await?;
            let documents = self.documents.read().await;
            let found = match lookup {
                Lookup::Id(id) => documents.iter().find(|doc| doc.id == *id),
                Lookup::Email { email, exclude } => documents
                    .iter()
                    .find(|doc| doc.email == *email && Some(doc.id) != *exclude),
            };
            found.cloned().ok_or(CollectionError::NoDocuments)
        })
    }

    fn insert_one<'a>(
        &'a self,
        document: &'a NewAccountDocument,
    ) -> BoxFuture<'a, Result<Uuid, CollectionError>> {
        Box::pin(async move {
            self.enter(CollectionOperation::InsertOne).await?;
            let mut documents = self.documents.write().await;
            if self.unique_email && email_taken(&documents, &document.email, None) {
                return Err(CollectionError::DuplicateKey);
            }
            let id = Uuid::new_v4();
            documents.push(Account {
                id,
                name: document.name.clone(),
                email: document.email.clone(),
                password_hash: document.password_hash.clone(),
                created_at: document.created_at,
                updated_at: document.updated_at,
            });
            Ok(id)
        })
    }

    fn find_one_and_update<'a>(
        &'a self,
        id: Uuid,
        changes: &'a AccountChanges,
    ) -> BoxFuture<'a, Result<Account, CollectionError>> {
        Box::pin(async move {
            self.enter(CollectionOperation::FindOneAndUpdate).await?;
            let mut documents = self.documents.write().await;
            if self.unique_email && email_taken(&documents, &changes.email, Some(id)) {
                return Err(CollectionError::DuplicateKey);
            }
            let document = documents
                .iter_mut()
                .find(|doc| doc.id == id)
                .ok_or(CollectionError::NoDocuments)?;
            document.name.clone_from(&changes.name);
            document.email.clone_from(&changes.email);
            document.updated_at = changes.updated_at;
            Ok(document.clone())
        })
    }

    fn delete_one(&self, id: Uuid) -> BoxFuture<'_, Result<u64, CollectionError>> {
        Box::pin(async move {
            self.enter(CollectionOperation::DeleteOne).await?;
            let mut documents = self.documents.write().await;
            let before = documents.len();
            documents.retain(|doc| doc.id != id);
            Ok((before - documents.len()) as u64)
        })
    }

    fn count(&self) -> BoxFuture<'_, Result<i64, CollectionError>> {
        Box::pin(async move {
            self.enter(CollectionOperation::Count).await?;
            let documents = self.documents.read().await;
            Ok(i64::try_from(documents.len()).unwrap_or(i64::MAX))
        })
    }
}
