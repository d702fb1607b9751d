//! Token and subject-name parsing
//!
//! Token lists are free text: tokens are single alphabetic characters and
//! whitespace, `,` and `;` act as separators. Subject lists hold one name per
//! line with blank lines ignored.

use thiserror::Error;

/// Maximum subject name length, in characters
pub const MAX_SUBJECT_NAME_LEN: usize = 256;

/// Separators accepted between tokens in a token list
fn is_token_separator(c: char) -> bool {
    c.is_whitespace() || c == ',' || c == ';'
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token cannot be empty")]
    Empty,

    #[error("token must be exactly one character, got '{0}'")]
    NotSingle(String),

    #[error("token '{0}' is not a letter")]
    NotAlphabetic(char),

    #[error("subject name cannot be empty")]
    EmptyName,

    #[error("subject name '{name}' is longer than {max} characters")]
    NameTooLong { name: String, max: usize },
}

/// Parse a single token value such as `"A"` or `"ж"`
pub fn parse_token(input: &str) -> Result<char, TokenError> {
    let trimmed = input.trim();
    let mut chars = trimmed.chars();

    let token = chars.next().ok_or(TokenError::Empty)?;
    if chars.next().is_some() {
        return Err(TokenError::NotSingle(trimmed.to_string()));
    }

    check_token(token)
}

/// Validate a token character
pub fn check_token(token: char) -> Result<char, TokenError> {
    if token.is_alphabetic() {
        Ok(token)
    } else {
        Err(TokenError::NotAlphabetic(token))
    }
}

/// Parse a token list like `"A B, C;D"`.
///
/// Duplicates collapse to their first occurrence. Any character that is
/// neither a separator nor a letter rejects the whole list.
pub fn parse_token_list(input: &str) -> Result<Vec<char>, TokenError> {
    let mut tokens = Vec::new();

    for c in input.chars() {
        if is_token_separator(c) {
            continue;
        }

        let token = check_token(c)?;
        if !tokens.contains(&token) {
            tokens.push(token);
        }
    }

    Ok(tokens)
}

/// Validate and trim a single subject name
pub fn parse_subject_name(input: &str) -> Result<String, TokenError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(TokenError::EmptyName);
    }

    if trimmed.chars().count() > MAX_SUBJECT_NAME_LEN {
        return Err(TokenError::NameTooLong {
            name: trimmed.to_string(),
            max: MAX_SUBJECT_NAME_LEN,
        });
    }

    Ok(trimmed.to_string())
}

/// Parse a newline-separated subject list, skipping blank lines.
///
/// A single over-long name rejects the whole list.
pub fn parse_subject_list(input: &str) -> Result<Vec<String>, TokenError> {
    input
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(parse_subject_name)
        .collect()
}
