//! Storage backends for glyphgate
//!
//! - Postgres: Durable storage for subjects, tokens, and grants
//! - Memory: In-process store for tests and local experiments
//!
//! Every operation is a single atomic step against the persisted relation.
//! There are no cross-call transactions: callers that resolve a name and then
//! mutate must expect the entity to have vanished in between, which surfaces
//! as [`StorageError::NotFound`] on the second call.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{PostgresConfig, PostgresStore};

use crate::auth::AllowSet;
pub use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Store-assigned subject identity
pub type SubjectId = i64;

/// Store-assigned token identity
pub type TokenId = i64;

/// Storage errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A subject row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub name: String,
}

/// A token row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub id: TokenId,
    pub value: char,
}

/// Trait for the subject × token relation
#[async_trait]
pub trait RelationStore: Send + Sync {
    /// Resolve a subject name to its id
    async fn find_subject(&self, name: &str) -> Result<SubjectId, StorageError>;

    /// Resolve a token value to its id
    async fn find_token(&self, value: char) -> Result<TokenId, StorageError>;

    /// Return the id of a token, creating it if absent
    async fn ensure_token(&self, value: char) -> Result<TokenId, StorageError>;

    /// Create a subject, returns the existing id if the name is taken
    async fn create_subject(&self, name: &str) -> Result<SubjectId, StorageError>;

    /// Create a subject together with its initial tokens in one step
    ///
    /// The default composes single operations; durable backends override it
    /// with a transaction.
    async fn create_subject_with(
        &self,
        name: &str,
        tokens: &[char],
    ) -> Result<SubjectId, StorageError> {
        let subject = self.create_subject(name).await?;
        for token in tokens {
            let token = self.ensure_token(*token).await?;
            self.grant(subject, token).await?;
        }
        Ok(subject)
    }

    /// All subjects in insertion order
    async fn list_subjects(&self) -> Result<Vec<Subject>, StorageError>;

    /// All tokens in insertion order
    async fn list_tokens(&self) -> Result<Vec<Token>, StorageError>;

    /// Tokens granted to a subject, `NotFound` if the subject does not exist
    async fn granted_tokens(&self, subject: SubjectId) -> Result<AllowSet, StorageError>;

    /// Grant a token, returns true if the grant did not exist before
    async fn grant(&self, subject: SubjectId, token: TokenId) -> Result<bool, StorageError>;

    /// Revoke a token, returns true if a grant was removed
    async fn revoke(&self, subject: SubjectId, token: TokenId) -> Result<bool, StorageError>;

    /// Grant every existing token, returns the number of new grants
    async fn grant_all(&self, subject: SubjectId) -> Result<u64, StorageError>;

    /// Remove every grant of a subject, returns the number removed
    async fn revoke_all(&self, subject: SubjectId) -> Result<u64, StorageError>;

    /// Delete a subject and all of its grants
    async fn delete_subject(&self, subject: SubjectId) -> Result<(), StorageError>;

    /// Delete a token and all grants referencing it
    async fn delete_token(&self, token: TokenId) -> Result<(), StorageError>;

    /// Rename a subject, `Conflict` if another subject holds the name
    async fn rename_subject(&self, subject: SubjectId, name: &str) -> Result<(), StorageError>;

    /// Change a token's value, `Conflict` if another token holds it
    async fn rename_token(&self, token: TokenId, value: char) -> Result<(), StorageError>;

    /// Check that the backend is reachable
    async fn health_check(&self) -> Result<(), StorageError>;

    fn backend_name(&self) -> &'static str;
}
