mod commands;
mod config;
mod handlers;

use agent_host::Session;
use anyhow::{Context, Result};
use clap::Parser;
use commands::Command;
use config::Args;
use handlers::{handle, status_line, Flow};
use shared::credentials::{ApiKey, API_KEY_ENV};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    // .env first so RUST_LOG and the key can come from it
    config::load_env_file(args.env_file.as_deref())?;
    config::init_logging(args.log_level.as_deref())?;

    let settings = config::build_settings(&args, |key| std::env::var(key).ok())?;
    let credential = ApiKey::from_env();
    if credential.is_none() {
        tracing::warn!("{} is not set; use /key to provide one for this session", API_KEY_ENV);
    }

    let mut session = Session::new(settings, credential);
    if let Some(role) = args.role.as_deref() {
        session
            .select_role(role)
            .with_context(|| format!("cannot start with role '{}'", role))?;
    }

    println!("💬 ConsultBot. Type /help for commands, /quit to leave.");
    println!("{}", status_line(&session));

    let mut stdout = std::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        stdout.flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(msg) => {
                println!("{}", msg);
                continue;
            }
        };
        if handle(&mut session, command, &mut stdout).await? == Flow::Quit {
            break;
        }
    }

    tracing::info!(session = %session.id(), turns = session.turns().len(), "session ended");
    Ok(())
}
