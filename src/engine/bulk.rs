//! Batch operations over subject lists
//!
//! Input is raw operator text: a subject list (one name per line) and a token
//! list (letters separated by whitespace, `,` or `;`). Both are validated up
//! front; a malformed list rejects the batch before anything is mutated.
//! After that each subject is processed on its own and failures are collected
//! into the report instead of aborting the batch.

use crate::auth;
use crate::engine::{GrantEngine, Result};
use crate::storage::{RelationStore, StorageError};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happened to one subject in a grant-or-create batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "reason")]
pub enum SubjectOutcome {
    /// Subject did not exist and was created with the token set
    Created,
    /// Existing subject received at least one token
    Granted,
    /// Existing subject, nothing attached (empty token list or every attach failed)
    Unchanged,
    Failed(String),
}

/// Result of a grant-or-create batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GrantReport {
    pub created: usize,
    pub granted: usize,
    pub failures: Vec<String>,
}

impl GrantReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for GrantReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Created subjects: {}", self.created)?;
        write!(f, "Granted to existing subjects: {}", self.granted)?;
        write_failures(f, &self.failures)
    }
}

/// Result of a bulk revoke
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RevokeReport {
    /// Subjects that lost at least one grant
    pub removed: usize,
    pub failures: Vec<String>,
}

impl RevokeReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for RevokeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Subjects with grants removed: {}", self.removed)?;
        write_failures(f, &self.failures)
    }
}

/// Result of a bulk delete
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub deleted: usize,
    pub failures: Vec<String>,
}

impl DeleteReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for DeleteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Deleted subjects: {}", self.deleted)?;
        write_failures(f, &self.failures)
    }
}

fn write_failures(f: &mut fmt::Formatter<'_>, failures: &[String]) -> fmt::Result {
    if failures.is_empty() {
        return Ok(());
    }

    write!(f, "\nFailures:")?;
    for failure in failures {
        write!(f, "\n  {}", failure)?;
    }
    Ok(())
}

/// Batch grant, revoke and delete over subject lists
#[derive(Clone)]
pub struct BulkEngine {
    store: Arc<dyn RelationStore>,
}

impl BulkEngine {
    pub fn new(store: Arc<dyn RelationStore>) -> Self {
        Self { store }
    }

    /// Build a bulk engine sharing a grant engine's store
    pub fn from_engine(engine: &GrantEngine) -> Self {
        Self::new(engine.store().clone())
    }

    /// Grant the tokens to every listed subject, creating unknown subjects.
    ///
    /// This is the only batch operation that creates subjects.
    pub async fn grant_or_create(&self, subjects: &str, tokens: &str) -> Result<GrantReport> {
        let subjects = auth::parse_subject_list(subjects)?;
        let tokens = auth::parse_token_list(tokens)?;

        let mut report = GrantReport::default();

        for subject in &subjects {
            let (outcome, token_failures) = self.grant_or_create_one(subject, &tokens).await;
            report.failures.extend(token_failures);

            match outcome {
                SubjectOutcome::Created => report.created += 1,
                SubjectOutcome::Granted => report.granted += 1,
                SubjectOutcome::Unchanged => {}
                SubjectOutcome::Failed(reason) => report.failures.push(reason),
            }
        }

        info!(
            subjects = subjects.len(),
            tokens = tokens.len(),
            created = report.created,
            granted = report.granted,
            failures = report.failures.len(),
            "Bulk grant finished"
        );
        Ok(report)
    }

    /// Process one subject; returns its outcome and any per-token failures
    async fn grant_or_create_one(
        &self,
        subject: &str,
        tokens: &[char],
    ) -> (SubjectOutcome, Vec<String>) {
        let subject_id = match self.store.find_subject(subject).await {
            Ok(id) => id,
            Err(StorageError::NotFound(_)) => {
                return match self.store.create_subject_with(subject, tokens).await {
                    Ok(id) => {
                        debug!(subject_id = id, subject = %subject, "Created subject in bulk");
                        (SubjectOutcome::Created, Vec::new())
                    }
                    Err(e) => (
                        SubjectOutcome::Failed(format!("failed to create '{}': {}", subject, e)),
                        Vec::new(),
                    ),
                };
            }
            Err(e) => {
                return (
                    SubjectOutcome::Failed(format!("failed to look up '{}': {}", subject, e)),
                    Vec::new(),
                )
            }
        };

        let mut attached = false;
        let mut failures = Vec::new();

        for token in tokens {
            let result = match self.store.ensure_token(*token).await {
                Ok(token_id) => self.store.grant(subject_id, token_id).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(_) => attached = true,
                Err(e) => {
                    warn!(subject = %subject, token = %token, error = %e, "Bulk grant failed");
                    failures.push(format!(
                        "failed to grant '{}' to '{}': {}",
                        token, subject, e
                    ));
                }
            }
        }

        let outcome = if attached {
            SubjectOutcome::Granted
        } else {
            SubjectOutcome::Unchanged
        };
        (outcome, failures)
    }

    /// Revoke the tokens from every listed subject.
    ///
    /// Unknown subjects are failures; unknown tokens are skipped since no
    /// grant can reference them.
    pub async fn revoke(&self, subjects: &str, tokens: &str) -> Result<RevokeReport> {
        let subjects = auth::parse_subject_list(subjects)?;
        let tokens = auth::parse_token_list(tokens)?;

        let mut report = RevokeReport::default();

        for subject in &subjects {
            let subject_id = match self.store.find_subject(subject).await {
                Ok(id) => id,
                Err(e) => {
                    report
                        .failures
                        .push(format!("subject '{}' not resolved: {}", subject, e));
                    continue;
                }
            };

            let mut removed_any = false;
            for token in &tokens {
                let token_id = match self.store.find_token(*token).await {
                    Ok(id) => id,
                    Err(StorageError::NotFound(_)) => continue,
                    Err(e) => {
                        report.failures.push(format!(
                            "failed to look up token '{}' for '{}': {}",
                            token, subject, e
                        ));
                        continue;
                    }
                };

                match self.store.revoke(subject_id, token_id).await {
                    Ok(removed) => removed_any |= removed,
                    Err(e) => report.failures.push(format!(
                        "failed to revoke '{}' from '{}': {}",
                        token, subject, e
                    )),
                }
            }

            if removed_any {
                report.removed += 1;
            }
        }

        info!(
            subjects = subjects.len(),
            tokens = tokens.len(),
            removed = report.removed,
            failures = report.failures.len(),
            "Bulk revoke finished"
        );
        Ok(report)
    }

    /// Delete every listed subject with its grants.
    ///
    /// Destructive: callers must obtain operator confirmation first.
    pub async fn delete(&self, subjects: &str) -> Result<DeleteReport> {
        let subjects = auth::parse_subject_list(subjects)?;

        let mut report = DeleteReport::default();

        for subject in &subjects {
            let result = match self.store.find_subject(subject).await {
                Ok(id) => self.store.delete_subject(id).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => report.deleted += 1,
                Err(e) => report
                    .failures
                    .push(format!("failed to delete '{}': {}", subject, e)),
            }
        }

        info!(
            subjects = subjects.len(),
            deleted = report.deleted,
            failures = report.failures.len(),
            "Bulk delete finished"
        );
        Ok(report)
    }
}
