//! Allow-sets: the tokens currently granted to one subject

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Characters kept by [`AllowSet::filter`] regardless of grants
fn is_filter_passthrough(c: char) -> bool {
    matches!(c, ' ' | '\n' | '\t' | '\r')
}

/// The set of token characters granted to one subject
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowSet {
    tokens: BTreeSet<char>,
}

impl AllowSet {
    pub fn new() -> Self {
        Self {
            tokens: BTreeSet::new(),
        }
    }

    /// Add a token, returns false if it was already present
    pub fn insert(&mut self, token: char) -> bool {
        self.tokens.insert(token)
    }

    /// Remove a token, returns false if it was not present
    pub fn remove(&mut self, token: char) -> bool {
        self.tokens.remove(&token)
    }

    /// Check if a token is allowed
    pub fn allows(&self, token: char) -> bool {
        self.tokens.contains(&token)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Tokens in code point order
    pub fn iter(&self) -> impl Iterator<Item = char> + '_ {
        self.tokens.iter().copied()
    }

    /// Symmetric difference against a newer set.
    ///
    /// `added` holds tokens present only in `newer`, `removed` tokens present
    /// only in `self`.
    pub fn delta(&self, newer: &AllowSet) -> AllowDelta {
        AllowDelta {
            added: newer.tokens.difference(&self.tokens).copied().collect(),
            removed: self.tokens.difference(&newer.tokens).copied().collect(),
        }
    }

    /// Keep whitespace and allowed characters, drop everything else
    pub fn filter(&self, text: &str) -> String {
        text.chars()
            .filter(|c| is_filter_passthrough(*c) || self.allows(*c))
            .collect()
    }
}

impl fmt::Display for AllowSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for token in &self.tokens {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}", token)?;
            first = false;
        }
        Ok(())
    }
}

impl FromIterator<char> for AllowSet {
    fn from_iter<T: IntoIterator<Item = char>>(iter: T) -> Self {
        Self {
            tokens: iter.into_iter().collect(),
        }
    }
}

impl Extend<char> for AllowSet {
    fn extend<T: IntoIterator<Item = char>>(&mut self, iter: T) {
        self.tokens.extend(iter);
    }
}

/// Difference between two allow-sets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowDelta {
    pub added: Vec<char>,
    pub removed: Vec<char>,
}

impl AllowDelta {
    /// True when both sets were identical
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl fmt::Display for AllowDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let added: String = self.added.iter().collect();
        let removed: String = self.removed.iter().collect();
        write!(f, "+[{}] -[{}]", added, removed)
    }
}
