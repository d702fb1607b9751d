//! CLI command definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "glyphgate")]
#[command(about = "Per-subject character allow-lists", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database URL
    #[arg(long, env = "DATABASE_URL", global = true)]
    pub database_url: Option<String>,

    /// Print reports as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database schema
    Init,

    /// Show store status and statistics
    Status,

    /// Manage subjects
    Subject {
        #[command(subcommand)]
        command: SubjectCommands,
    },

    /// Manage tokens
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },

    /// Grant tokens to an existing subject
    ///
    /// Examples:
    ///   glyphgate grant alice "A B C"
    ///   glyphgate grant bob "а,б;в"
    Grant {
        /// Subject name
        subject: String,

        /// Tokens, separated by spaces, ',' or ';'
        tokens: String,
    },

    /// Revoke tokens from a subject
    Revoke {
        /// Subject name
        subject: String,

        /// Tokens, separated by spaces, ',' or ';'
        tokens: String,
    },

    /// Flip a single grant
    Toggle {
        /// Subject name
        subject: String,

        /// A single token
        #[arg(value_parser = parse_token_arg)]
        token: char,
    },

    /// Print the subject x token matrix
    Matrix {
        /// Toggle the cell at ROW COL (1-based data cells) before printing
        #[arg(long, num_args = 2, value_names = ["ROW", "COL"])]
        toggle: Option<Vec<usize>>,
    },

    /// Batch operations over a subject list
    Bulk {
        #[command(subcommand)]
        command: BulkCommands,
    },

    /// Run a client session: filter stdin through the live allow-set
    Session {
        /// Subject name to authenticate as
        subject: String,

        /// Poll interval in milliseconds
        #[arg(long, env = "GLYPHGATE_POLL_INTERVAL_MS")]
        poll_interval_ms: Option<u64>,
    },
}

#[derive(Subcommand)]
pub enum SubjectCommands {
    /// Add a subject with optional initial tokens
    Add {
        name: String,

        /// Initial tokens
        #[arg(long, default_value = "")]
        tokens: String,
    },

    /// Rename a subject
    Rename { name: String, new_name: String },

    /// Delete a subject and its grants
    Delete {
        name: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// List all subjects
    List,

    /// Show a subject's allow-set
    Show { name: String },

    /// Grant every existing token
    GrantAll { name: String },

    /// Remove every grant
    RevokeAll { name: String },
}

#[derive(Subcommand)]
pub enum TokenCommands {
    /// Add a token
    Add {
        #[arg(value_parser = parse_token_arg)]
        token: char,
    },

    /// Change a token's character
    Rename {
        #[arg(value_parser = parse_token_arg)]
        token: char,
        #[arg(value_parser = parse_token_arg)]
        new_token: char,
    },

    /// Delete a token and every grant referencing it
    Delete {
        #[arg(value_parser = parse_token_arg)]
        token: char,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// List all tokens
    List,
}

/// Subject list input shared by the bulk commands
#[derive(Args)]
pub struct SubjectListArgs {
    /// File with one subject name per line ('-' for stdin)
    #[arg(long = "subjects-file", short = 'f')]
    pub subjects_file: PathBuf,
}

#[derive(Subcommand)]
pub enum BulkCommands {
    /// Grant tokens, creating subjects that do not exist yet
    Grant {
        #[command(flatten)]
        subjects: SubjectListArgs,

        /// Tokens, separated by spaces, ',' or ';'
        #[arg(long, short = 't', default_value = "")]
        tokens: String,
    },

    /// Revoke tokens from existing subjects
    Revoke {
        #[command(flatten)]
        subjects: SubjectListArgs,

        /// Tokens, separated by spaces, ',' or ';'
        #[arg(long, short = 't')]
        tokens: String,
    },

    /// Delete subjects and their grants
    Delete {
        #[command(flatten)]
        subjects: SubjectListArgs,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

fn parse_token_arg(s: &str) -> Result<char, String> {
    glyphgate::auth::parse_token(s).map_err(|e| e.to_string())
}
