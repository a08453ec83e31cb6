use anyhow::{Context, Result};
use clap::Parser;
use shared::settings::{AppSettings, AuthScheme, ChatBackendKind};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Terminal front-end for the ConsultBot assistants
#[derive(Parser, Debug)]
#[command(name = "consultbot", version, about, long_about = None)]
pub struct Args {
    /// Auth header scheme: bearer, x-api-key, apikey or "bearer + x-api-key"
    #[arg(long)]
    pub scheme: Option<AuthScheme>,
    /// Chat backend: gemini or hosted
    #[arg(long)]
    pub backend: Option<ChatBackendKind>,
    /// Role to start with
    #[arg(long)]
    pub role: Option<String>,
    /// Log filter, e.g. "debug" or "providers=debug" (default: RUST_LOG, then info)
    #[arg(long)]
    pub log_level: Option<String>,
    /// Environment file to load instead of ./.env
    #[arg(long)]
    pub env_file: Option<PathBuf>,
}

/// Load variables from `path`, or from `./.env` when no path is given. A
/// missing default file is fine; a missing explicit file is an error.
pub fn load_env_file(path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            dotenvy::from_path(path).with_context(|| format!("failed to load {}", path.display()))?;
        }
        None => {
            if let Err(e) = dotenvy::dotenv() {
                if !e.not_found() {
                    return Err(e).context("failed to load .env");
                }
            }
        }
    }
    Ok(())
}

/// Defaults, then the environment, then command-line flags.
pub fn build_settings<F>(args: &Args, lookup: F) -> Result<AppSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let mut settings = AppSettings::default();
    settings
        .apply_env(lookup)
        .context("invalid configuration in environment")?;
    if let Some(scheme) = args.scheme {
        settings.auth_scheme = scheme;
    }
    if let Some(backend) = args.backend {
        settings.chat_backend = backend;
    }
    Ok(settings)
}

/// Logs go to stderr so they do not interleave with replies.
pub fn init_logging(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).with_context(|| format!("invalid log level '{}'", level))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}
