//! Glyphgate CLI entry point

mod cli;

use crate::cli::{BulkCommands, Cli, Commands, SubjectCommands, SubjectListArgs, TokenCommands};
use anyhow::{bail, Context, Result};
use clap::Parser;
use glyphgate::auth;
use glyphgate::engine::{BulkEngine, GrantEngine};
use glyphgate::matrix::{Interaction, MatrixProjector};
use glyphgate::storage::{PostgresConfig, PostgresStore, RelationStore};
use glyphgate::sync::{PermissionSession, SyncConfig};
use serde::Serialize;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Logs go to stderr so stdout stays clean for reports and filtered text
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let db_config = match &cli.database_url {
        Some(url) => PostgresConfig::from_url(url).context("Invalid DATABASE_URL")?,
        None => PostgresConfig::from_env().context("DATABASE_URL not set")?,
    };

    let store: Arc<dyn RelationStore> = Arc::new(PostgresStore::new(db_config).await?);
    let engine = GrantEngine::new(store.clone());
    let json = cli.json;

    match cli.command {
        Commands::Init => {
            println!("Database schema initialized successfully");
            Ok(())
        }
        Commands::Status => status(store).await,
        Commands::Subject { command } => subject(&engine, command, json).await,
        Commands::Token { command } => token(&engine, command, json).await,
        Commands::Grant { subject, tokens } => {
            for token in auth::parse_token_list(&tokens)? {
                engine.grant_one(&subject, token).await?;
                println!("  + {}", token);
            }
            Ok(())
        }
        Commands::Revoke { subject, tokens } => {
            for token in auth::parse_token_list(&tokens)? {
                engine.revoke_one(&subject, token).await?;
                println!("  - {}", token);
            }
            Ok(())
        }
        Commands::Toggle { subject, token } => {
            let granted = engine.toggle(&subject, token).await?;
            println!("{} {} {}", subject, if granted { "+" } else { "-" }, token);
            Ok(())
        }
        Commands::Matrix { toggle } => matrix(engine, toggle, json).await,
        Commands::Bulk { command } => bulk(&engine, command, json).await,
        Commands::Session {
            subject,
            poll_interval_ms,
        } => session(store, subject, poll_interval_ms).await,
    }
}

/// Print a report either as JSON or in its human form
fn report<T: Serialize + Display>(value: &T, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", value);
    }
    Ok(())
}

/// Ask the operator for a yes/no answer on stdin
async fn confirm(prompt: &str) -> Result<bool> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(format!("{} [y/N] ", prompt).as_bytes()).await?;
    stdout.flush().await?;

    let mut answer = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut answer)
        .await?;

    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

async fn read_subject_list(args: &SubjectListArgs) -> Result<String> {
    if args.subjects_file.as_os_str() == "-" {
        let mut input = String::new();
        tokio::io::stdin().read_to_string(&mut input).await?;
        Ok(input)
    } else {
        tokio::fs::read_to_string(&args.subjects_file)
            .await
            .with_context(|| format!("Failed to read subject list: {:?}", args.subjects_file))
    }
}

async fn status(store: Arc<dyn RelationStore>) -> Result<()> {
    store.health_check().await?;
    let subjects = store.list_subjects().await?;
    let tokens = store.list_tokens().await?;

    println!("Glyphgate Status");
    println!("================");
    println!("Backend: {} (connected)", store.backend_name());
    println!("Subjects: {}", subjects.len());
    println!("Tokens: {}", tokens.len());

    Ok(())
}

async fn subject(engine: &GrantEngine, command: SubjectCommands, json: bool) -> Result<()> {
    match command {
        SubjectCommands::Add { name, tokens } => {
            let tokens = auth::parse_token_list(&tokens)?;
            engine.add_subject(&name, &tokens).await?;
            println!("Added subject: {}", name.trim());
        }
        SubjectCommands::Rename { name, new_name } => {
            engine.rename_subject(&name, &new_name).await?;
            println!("Renamed subject: {} -> {}", name, new_name.trim());
        }
        SubjectCommands::Delete { name, yes } => {
            if !yes && !confirm(&format!("Delete subject '{}'?", name)).await? {
                println!("Aborted");
                return Ok(());
            }
            engine.delete_subject(&name).await?;
            println!("Deleted subject: {}", name);
        }
        SubjectCommands::List => {
            let subjects = engine.list_subjects().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&subjects)?);
            } else {
                for subject in subjects {
                    println!("{}", subject.name);
                }
            }
        }
        SubjectCommands::Show { name } => {
            let allowed = engine.allow_set(&name).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&allowed)?);
            } else {
                println!("Subject: {}", name);
                if allowed.is_empty() {
                    println!("Tokens: (none)");
                } else {
                    println!("Tokens: {}", allowed);
                }
            }
        }
        SubjectCommands::GrantAll { name } => {
            let added = engine.grant_all(&name).await?;
            println!("Granted {} new token(s) to {}", added, name);
        }
        SubjectCommands::RevokeAll { name } => {
            let removed = engine.revoke_all(&name).await?;
            println!("Removed {} grant(s) from {}", removed, name);
        }
    }

    Ok(())
}

async fn token(engine: &GrantEngine, command: TokenCommands, json: bool) -> Result<()> {
    match command {
        TokenCommands::Add { token } => {
            engine.add_token(token).await?;
            println!("Added token: {}", token);
        }
        TokenCommands::Rename { token, new_token } => {
            engine.rename_token(token, new_token).await?;
            println!("Renamed token: {} -> {}", token, new_token);
        }
        TokenCommands::Delete { token, yes } => {
            let prompt = format!("Delete token '{}' and every grant of it?", token);
            if !yes && !confirm(&prompt).await? {
                println!("Aborted");
                return Ok(());
            }
            engine.delete_token(token).await?;
            println!("Deleted token: {}", token);
        }
        TokenCommands::List => {
            let tokens = engine.list_tokens().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tokens)?);
            } else {
                let values: Vec<String> = tokens.iter().map(|t| t.value.to_string()).collect();
                println!("{}", values.join(" "));
            }
        }
    }

    Ok(())
}

async fn matrix(engine: GrantEngine, toggle: Option<Vec<usize>>, json: bool) -> Result<()> {
    let projector = MatrixProjector::new(engine);
    let mut matrix = projector.build().await?;

    if let Some(cell) = toggle {
        let (row, col) = match cell.as_slice() {
            [row, col] => (*row, *col),
            _ => bail!("--toggle takes exactly ROW and COL"),
        };

        match projector.interact(&matrix, row, col).await? {
            Interaction::Ignored => println!("Cell ({}, {}) is not a data cell", row, col),
            Interaction::Toggled {
                subject,
                token,
                granted,
                matrix: rebuilt,
            } => {
                println!("{} {} {}", subject, if granted { "+" } else { "-" }, token);
                matrix = rebuilt;
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&matrix)?);
    } else {
        print!("{}", matrix.render());
    }
    Ok(())
}

async fn bulk(engine: &GrantEngine, command: BulkCommands, json: bool) -> Result<()> {
    let bulk = BulkEngine::from_engine(engine);

    match command {
        BulkCommands::Grant { subjects, tokens } => {
            let list = read_subject_list(&subjects).await?;
            let result = bulk.grant_or_create(&list, &tokens).await?;
            report(&result, json)
        }
        BulkCommands::Revoke { subjects, tokens } => {
            let list = read_subject_list(&subjects).await?;
            let result = bulk.revoke(&list, &tokens).await?;
            report(&result, json)
        }
        BulkCommands::Delete { subjects, yes } => {
            let list = read_subject_list(&subjects).await?;
            let names = auth::parse_subject_list(&list)?;
            if names.is_empty() {
                println!("Subject list is empty");
                return Ok(());
            }

            if !yes {
                if subjects.subjects_file.as_os_str() == "-" {
                    bail!("Subject list read from stdin, pass --yes to confirm deletion");
                }
                let prompt = format!(
                    "Delete {} subject(s): {}?",
                    names.len(),
                    names.join(", ")
                );
                if !confirm(&prompt).await? {
                    println!("Aborted");
                    return Ok(());
                }
            }

            let result = bulk.delete(&list).await?;
            report(&result, json)
        }
    }
}

async fn session(
    store: Arc<dyn RelationStore>,
    subject: String,
    poll_interval_ms: Option<u64>,
) -> Result<()> {
    let mut config = SyncConfig::from_env();
    if let Some(ms) = poll_interval_ms {
        config = config.poll_interval(Duration::from_millis(ms));
    }

    let session = PermissionSession::new(store, config);
    session.on_change(|allowed, delta| {
        eprintln!("Permissions updated {}: {}", delta, allowed);
    });
    session
        .authenticate(&subject)
        .await
        .with_context(|| format!("Subject '{}' is not registered", subject))?;

    eprintln!("Allowed tokens: {}", session.allow_set());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => println!("{}", session.filter(&line)),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    session.end();
    Ok(())
}
