//! Command-line interface

mod commands;

pub use commands::{BulkCommands, Cli, Commands, SubjectCommands, SubjectListArgs, TokenCommands};
