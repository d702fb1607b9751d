//! Name-addressed grant operations
//!
//! Everything above the store talks in names: subject names and token
//! characters. Names are resolved to ids immediately before each store call
//! and ids are never kept across calls, so a concurrent rename or delete
//! surfaces as `NotFound` instead of acting on a stale id.

mod bulk;

pub use bulk::{BulkEngine, DeleteReport, GrantReport, RevokeReport, SubjectOutcome};

use crate::auth::{self, AllowSet, TokenError};
use crate::storage::{RelationStore, StorageError, Subject, Token};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Error categories shared by every engine operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Storage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::Conflict => write!(f, "conflict"),
            ErrorKind::Storage => write!(f, "storage"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(msg) => EngineError::NotFound(msg),
            StorageError::Conflict(msg) => EngineError::Conflict(msg),
            StorageError::Database(msg) | StorageError::Serialization(msg) => {
                EngineError::Storage(msg)
            }
        }
    }
}

impl From<TokenError> for EngineError {
    fn from(e: TokenError) -> Self {
        EngineError::Validation(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Single-pair grant primitives and single-entity administration
#[derive(Clone)]
pub struct GrantEngine {
    store: Arc<dyn RelationStore>,
}

impl GrantEngine {
    pub fn new(store: Arc<dyn RelationStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn RelationStore> {
        &self.store
    }

    /// Grant a token to an existing subject, creating the token if needed.
    ///
    /// Unknown subjects are `NotFound`; only explicit adds and bulk
    /// grant-or-create materialize subjects.
    pub async fn grant_one(&self, subject: &str, token: char) -> Result<()> {
        let token = auth::check_token(token)?;
        let subject_id = self.store.find_subject(subject).await?;
        let token_id = self.store.ensure_token(token).await?;
        self.store.grant(subject_id, token_id).await?;

        debug!(subject = %subject, token = %token, "Granted");
        Ok(())
    }

    /// Revoke a token from a subject; absent tokens are already revoked
    pub async fn revoke_one(&self, subject: &str, token: char) -> Result<()> {
        let subject_id = self.store.find_subject(subject).await?;

        let token_id = match self.store.find_token(token).await {
            Ok(id) => id,
            Err(StorageError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        self.store.revoke(subject_id, token_id).await?;

        debug!(subject = %subject, token = %token, "Revoked");
        Ok(())
    }

    /// Check whether a subject currently holds a token
    pub async fn has_grant(&self, subject: &str, token: char) -> Result<bool> {
        Ok(self.allow_set(subject).await?.allows(token))
    }

    /// Grant if absent, revoke if present. Returns the new state.
    ///
    /// The check and the write are separate store calls; two concurrent
    /// togglers of the same pair may both observe the same initial state.
    pub async fn toggle(&self, subject: &str, token: char) -> Result<bool> {
        if self.has_grant(subject, token).await? {
            self.revoke_one(subject, token).await?;
            Ok(false)
        } else {
            self.grant_one(subject, token).await?;
            Ok(true)
        }
    }

    /// The current allow-set of a subject
    pub async fn allow_set(&self, subject: &str) -> Result<AllowSet> {
        let subject_id = self.store.find_subject(subject).await?;
        Ok(self.store.granted_tokens(subject_id).await?)
    }

    /// Add a subject with an initial token set
    pub async fn add_subject(&self, name: &str, tokens: &[char]) -> Result<()> {
        let name = auth::parse_subject_name(name)?;
        for token in tokens {
            auth::check_token(*token)?;
        }

        let id = self.store.create_subject_with(&name, tokens).await?;
        info!(subject_id = id, name = %name, tokens = tokens.len(), "Added subject");
        Ok(())
    }

    /// Add a token without granting it to anyone
    pub async fn add_token(&self, token: char) -> Result<()> {
        let token = auth::check_token(token)?;
        let id = self.store.ensure_token(token).await?;
        info!(token_id = id, token = %token, "Added token");
        Ok(())
    }

    /// Delete a subject and all of its grants
    pub async fn delete_subject(&self, name: &str) -> Result<()> {
        let id = self.store.find_subject(name).await?;
        self.store.delete_subject(id).await?;
        info!(subject_id = id, name = %name, "Deleted subject");
        Ok(())
    }

    /// Delete a token and every grant referencing it
    pub async fn delete_token(&self, token: char) -> Result<()> {
        let id = self.store.find_token(token).await?;
        self.store.delete_token(id).await?;
        info!(token_id = id, token = %token, "Deleted token");
        Ok(())
    }

    pub async fn rename_subject(&self, current: &str, new_name: &str) -> Result<()> {
        let new_name = auth::parse_subject_name(new_name)?;
        let id = self.store.find_subject(current).await?;
        self.store.rename_subject(id, &new_name).await?;
        info!(subject_id = id, from = %current, to = %new_name, "Renamed subject");
        Ok(())
    }

    pub async fn rename_token(&self, current: char, new_value: char) -> Result<()> {
        let new_value = auth::check_token(new_value)?;
        let id = self.store.find_token(current).await?;
        self.store.rename_token(id, new_value).await?;
        info!(token_id = id, from = %current, to = %new_value, "Renamed token");
        Ok(())
    }

    /// Grant every existing token to a subject
    pub async fn grant_all(&self, subject: &str) -> Result<u64> {
        let id = self.store.find_subject(subject).await?;
        Ok(self.store.grant_all(id).await?)
    }

    /// Remove every grant from a subject
    pub async fn revoke_all(&self, subject: &str) -> Result<u64> {
        let id = self.store.find_subject(subject).await?;
        Ok(self.store.revoke_all(id).await?)
    }

    pub async fn list_subjects(&self) -> Result<Vec<Subject>> {
        Ok(self.store.list_subjects().await?)
    }

    pub async fn list_tokens(&self) -> Result<Vec<Token>> {
        Ok(self.store.list_tokens().await?)
    }
}
