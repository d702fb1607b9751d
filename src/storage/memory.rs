//! In-memory relation store
//!
//! Not durable: all state is lost when the store is dropped. Each operation
//! takes the lock once, so it is atomic with respect to every other
//! operation, matching the single-statement guarantees of the Postgres
//! backend.

use crate::auth::AllowSet;
use crate::storage::{RelationStore, StorageError, Subject, SubjectId, Token, TokenId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

#[derive(Debug, Default)]
struct Relation {
    next_subject_id: SubjectId,
    next_token_id: TokenId,
    /// Keyed by id, so iteration order is insertion order
    subjects: BTreeMap<SubjectId, String>,
    subject_ids: HashMap<String, SubjectId>,
    tokens: BTreeMap<TokenId, char>,
    token_ids: HashMap<char, TokenId>,
    grants: BTreeSet<(SubjectId, TokenId)>,
}

impl Relation {
    fn require_subject(&self, subject: SubjectId) -> Result<(), StorageError> {
        if self.subjects.contains_key(&subject) {
            Ok(())
        } else {
            Err(StorageError::NotFound(format!("subject {}", subject)))
        }
    }

    fn require_token(&self, token: TokenId) -> Result<(), StorageError> {
        if self.tokens.contains_key(&token) {
            Ok(())
        } else {
            Err(StorageError::NotFound(format!("token {}", token)))
        }
    }

    fn ensure_token(&mut self, value: char) -> TokenId {
        if let Some(id) = self.token_ids.get(&value) {
            return *id;
        }

        self.next_token_id += 1;
        let id = self.next_token_id;
        self.tokens.insert(id, value);
        self.token_ids.insert(value, id);
        id
    }

    fn create_subject(&mut self, name: &str) -> SubjectId {
        if let Some(id) = self.subject_ids.get(name) {
            return *id;
        }

        self.next_subject_id += 1;
        let id = self.next_subject_id;
        self.subjects.insert(id, name.to_string());
        self.subject_ids.insert(name.to_string(), id);
        id
    }

    fn grants_of(&self, subject: SubjectId) -> impl Iterator<Item = TokenId> + '_ {
        self.grants
            .range((subject, TokenId::MIN)..=(subject, TokenId::MAX))
            .map(|(_, token)| *token)
    }
}

/// Relation store held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    relation: RwLock<Relation>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of grants across all subjects
    pub fn grant_count(&self) -> usize {
        self.relation.read().grants.len()
    }
}

#[async_trait]
impl RelationStore for MemoryStore {
    async fn find_subject(&self, name: &str) -> Result<SubjectId, StorageError> {
        self.relation
            .read()
            .subject_ids
            .get(name)
            .copied()
            .ok_or_else(|| StorageError::NotFound(format!("subject '{}'", name)))
    }

    async fn find_token(&self, value: char) -> Result<TokenId, StorageError> {
        self.relation
            .read()
            .token_ids
            .get(&value)
            .copied()
            .ok_or_else(|| StorageError::NotFound(format!("token '{}'", value)))
    }

    async fn ensure_token(&self, value: char) -> Result<TokenId, StorageError> {
        Ok(self.relation.write().ensure_token(value))
    }

    async fn create_subject(&self, name: &str) -> Result<SubjectId, StorageError> {
        let id = self.relation.write().create_subject(name);
        debug!(subject_id = id, name = %name, "Created subject");
        Ok(id)
    }

    async fn create_subject_with(
        &self,
        name: &str,
        tokens: &[char],
    ) -> Result<SubjectId, StorageError> {
        let mut relation = self.relation.write();

        let subject = relation.create_subject(name);
        for value in tokens {
            let token = relation.ensure_token(*value);
            relation.grants.insert((subject, token));
        }

        debug!(subject_id = subject, name = %name, tokens = tokens.len(), "Created subject with tokens");
        Ok(subject)
    }

    async fn list_subjects(&self) -> Result<Vec<Subject>, StorageError> {
        Ok(self
            .relation
            .read()
            .subjects
            .iter()
            .map(|(id, name)| Subject {
                id: *id,
                name: name.clone(),
            })
            .collect())
    }

    async fn list_tokens(&self) -> Result<Vec<Token>, StorageError> {
        Ok(self
            .relation
            .read()
            .tokens
            .iter()
            .map(|(id, value)| Token {
                id: *id,
                value: *value,
            })
            .collect())
    }

    async fn granted_tokens(&self, subject: SubjectId) -> Result<AllowSet, StorageError> {
        let relation = self.relation.read();
        relation.require_subject(subject)?;

        Ok(relation
            .grants_of(subject)
            .filter_map(|token| relation.tokens.get(&token).copied())
            .collect())
    }

    async fn grant(&self, subject: SubjectId, token: TokenId) -> Result<bool, StorageError> {
        let mut relation = self.relation.write();
        relation.require_subject(subject)?;
        relation.require_token(token)?;

        let inserted = relation.grants.insert((subject, token));
        debug!(subject_id = subject, token_id = token, inserted, "Granted token");
        Ok(inserted)
    }

    async fn revoke(&self, subject: SubjectId, token: TokenId) -> Result<bool, StorageError> {
        let mut relation = self.relation.write();
        relation.require_subject(subject)?;

        let removed = relation.grants.remove(&(subject, token));
        debug!(subject_id = subject, token_id = token, removed, "Revoked token");
        Ok(removed)
    }

    async fn grant_all(&self, subject: SubjectId) -> Result<u64, StorageError> {
        let mut relation = self.relation.write();
        relation.require_subject(subject)?;

        let tokens: Vec<TokenId> = relation.tokens.keys().copied().collect();
        let inserted = tokens
            .into_iter()
            .filter(|token| relation.grants.insert((subject, *token)))
            .count();

        Ok(inserted as u64)
    }

    async fn revoke_all(&self, subject: SubjectId) -> Result<u64, StorageError> {
        let mut relation = self.relation.write();
        relation.require_subject(subject)?;

        let before = relation.grants.len();
        relation.grants.retain(|(s, _)| *s != subject);
        Ok((before - relation.grants.len()) as u64)
    }

    async fn delete_subject(&self, subject: SubjectId) -> Result<(), StorageError> {
        let mut relation = self.relation.write();
        relation.require_subject(subject)?;

        relation.grants.retain(|(s, _)| *s != subject);
        if let Some(name) = relation.subjects.remove(&subject) {
            relation.subject_ids.remove(&name);
        }

        debug!(subject_id = subject, "Deleted subject");
        Ok(())
    }

    async fn delete_token(&self, token: TokenId) -> Result<(), StorageError> {
        let mut relation = self.relation.write();
        relation.require_token(token)?;

        relation.grants.retain(|(_, t)| *t != token);
        if let Some(value) = relation.tokens.remove(&token) {
            relation.token_ids.remove(&value);
        }

        debug!(token_id = token, "Deleted token");
        Ok(())
    }

    async fn rename_subject(&self, subject: SubjectId, name: &str) -> Result<(), StorageError> {
        let mut relation = self.relation.write();
        relation.require_subject(subject)?;

        match relation.subject_ids.get(name) {
            Some(existing) if *existing == subject => return Ok(()),
            Some(_) => {
                return Err(StorageError::Conflict(format!(
                    "subject name '{}' is already taken",
                    name
                )))
            }
            None => {}
        }

        if let Some(old) = relation.subjects.insert(subject, name.to_string()) {
            relation.subject_ids.remove(&old);
        }
        relation.subject_ids.insert(name.to_string(), subject);
        Ok(())
    }

    async fn rename_token(&self, token: TokenId, value: char) -> Result<(), StorageError> {
        let mut relation = self.relation.write();
        relation.require_token(token)?;

        match relation.token_ids.get(&value) {
            Some(existing) if *existing == token => return Ok(()),
            Some(_) => {
                return Err(StorageError::Conflict(format!(
                    "token '{}' already exists",
                    value
                )))
            }
            None => {}
        }

        if let Some(old) = relation.tokens.insert(token, value) {
            relation.token_ids.remove(&old);
        }
        relation.token_ids.insert(value, token);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
