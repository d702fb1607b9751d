//! Subject × token grid
//!
//! Row 0 and column 0 are headers. A data cell reports whether the row's
//! subject holds the column's token. Lookups that fail render as
//! [`Cell::Error`] rather than being read as "not granted".

use crate::engine::{GrantEngine, Result};
use serde::Serialize;
use std::fmt::Write as _;
use tracing::{debug, warn};

/// One grid cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Cell {
    Corner,
    SubjectHeader(String),
    TokenHeader(char),
    Granted,
    Denied,
    /// The row's lookup failed (e.g. the subject vanished after listing)
    Error(String),
}

impl Cell {
    pub fn is_header(&self) -> bool {
        matches!(self, Cell::Corner | Cell::SubjectHeader(_) | Cell::TokenHeader(_))
    }

    fn symbol(&self) -> String {
        match self {
            Cell::Corner => "subject \\ token".to_string(),
            Cell::SubjectHeader(name) => name.clone(),
            Cell::TokenHeader(token) => token.to_string(),
            Cell::Granted => "✓".to_string(),
            Cell::Denied => "✗".to_string(),
            Cell::Error(_) => "❌".to_string(),
        }
    }
}

/// A snapshot of the whole relation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Matrix {
    subjects: Vec<String>,
    tokens: Vec<char>,
    cells: Vec<Vec<Cell>>,
}

impl Matrix {
    /// Rows including the header row
    pub fn rows(&self) -> usize {
        self.subjects.len() + 1
    }

    /// Columns including the header column
    pub fn cols(&self) -> usize {
        self.tokens.len() + 1
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.cells.get(row).and_then(|r| r.get(col))
    }

    pub fn subjects(&self) -> &[String] {
        &self.subjects
    }

    pub fn tokens(&self) -> &[char] {
        &self.tokens
    }

    /// Subject and token addressed by a data cell
    pub fn pair_at(&self, row: usize, col: usize) -> Option<(&str, char)> {
        if row == 0 || col == 0 {
            return None;
        }

        let subject = self.subjects.get(row - 1)?;
        let token = self.tokens.get(col - 1)?;
        Some((subject.as_str(), *token))
    }

    /// Render as an aligned text table
    pub fn render(&self) -> String {
        let width = self
            .cells
            .iter()
            .map(|row| row[0].symbol().chars().count())
            .max()
            .unwrap_or(0);

        let mut out = String::new();
        for row in &self.cells {
            let header = row[0].symbol();
            let pad = width - header.chars().count();
            let _ = write!(out, "{}{}", header, " ".repeat(pad));
            for cell in &row[1..] {
                let _ = write!(out, " {}", cell.symbol());
            }
            out.push('\n');
        }
        out
    }
}

/// Result of interacting with a cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    /// Header or out-of-range cell, nothing changed
    Ignored,
    /// The pair was toggled; `matrix` is rebuilt from a fresh listing
    Toggled {
        subject: String,
        token: char,
        granted: bool,
        matrix: Matrix,
    },
}

/// Builds grids from the store and toggles cells through the grant engine
#[derive(Clone)]
pub struct MatrixProjector {
    engine: GrantEngine,
}

impl MatrixProjector {
    pub fn new(engine: GrantEngine) -> Self {
        Self { engine }
    }

    /// Build a fresh grid.
    ///
    /// Listing failures are returned as errors; per-row lookup failures
    /// become error cells.
    pub async fn build(&self) -> Result<Matrix> {
        let subjects: Vec<String> = self
            .engine
            .list_subjects()
            .await?
            .into_iter()
            .map(|s| s.name)
            .collect();
        let tokens: Vec<char> = self
            .engine
            .list_tokens()
            .await?
            .into_iter()
            .map(|t| t.value)
            .collect();

        let mut cells = Vec::with_capacity(subjects.len() + 1);

        let mut header = Vec::with_capacity(tokens.len() + 1);
        header.push(Cell::Corner);
        header.extend(tokens.iter().map(|t| Cell::TokenHeader(*t)));
        cells.push(header);

        for subject in &subjects {
            let mut row = Vec::with_capacity(tokens.len() + 1);
            row.push(Cell::SubjectHeader(subject.clone()));

            // One allow-set read per row answers has_grant for every column
            match self.engine.allow_set(subject).await {
                Ok(allowed) => row.extend(tokens.iter().map(|t| {
                    if allowed.allows(*t) {
                        Cell::Granted
                    } else {
                        Cell::Denied
                    }
                })),
                Err(e) => {
                    warn!(subject = %subject, error = %e, "Matrix row lookup failed");
                    row.extend(tokens.iter().map(|_| Cell::Error(e.to_string())));
                }
            }

            cells.push(row);
        }

        debug!(subjects = subjects.len(), tokens = tokens.len(), "Built matrix");
        Ok(Matrix {
            subjects,
            tokens,
            cells,
        })
    }

    /// Toggle the pair under a data cell of `matrix` and rebuild.
    ///
    /// Header cells are a no-op. The returned grid is rebuilt from scratch
    /// since subjects or tokens may have changed concurrently.
    pub async fn interact(&self, matrix: &Matrix, row: usize, col: usize) -> Result<Interaction> {
        let (subject, token) = match matrix.pair_at(row, col) {
            Some(pair) => pair,
            None => return Ok(Interaction::Ignored),
        };

        let granted = self.engine.toggle(subject, token).await?;
        let rebuilt = self.build().await?;

        Ok(Interaction::Toggled {
            subject: subject.to_string(),
            token,
            granted,
            matrix: rebuilt,
        })
    }
}
