//! Centralized application configuration.
//! Combines environment variables and CLI arguments; a CLI flag always wins
//! over its environment counterpart.

use anyhow::{Context, Result};
use clap::Parser;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: PathBuf,
    pub database_url: String,
    pub max_concurrent_ops: usize,
    pub admission_timeout_secs: u64,
    /// Age after which an `in_progress` session is swept. Zero disables the
    /// sweep.
    pub session_ttl_secs: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Resumable chunked-upload server")]
pub struct Args {
    /// Host to bind to (overrides UPLOAD_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides UPLOAD_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory for chunk and artifact storage (overrides UPLOAD_STORE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides UPLOAD_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Concurrent upload operation cap (overrides UPLOAD_STORE_MAX_CONCURRENT_OPS)
    #[arg(long)]
    pub max_concurrent_ops: Option<usize>,

    /// Seconds to wait for an admission slot (overrides UPLOAD_STORE_ADMISSION_TIMEOUT_SECS)
    #[arg(long)]
    pub admission_timeout_secs: Option<u64>,

    /// Stale-session TTL in seconds, 0 disables (overrides UPLOAD_STORE_SESSION_TTL_SECS)
    #[arg(long)]
    pub session_ttl_secs: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();

        let env_host = env::var("UPLOAD_STORE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = parse_env("UPLOAD_STORE_PORT", 8080u16)?;
        let env_storage =
            env::var("UPLOAD_STORE_STORAGE_DIR").unwrap_or_else(|_| "./data/uploads".into());
        let env_db = env::var("UPLOAD_STORE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/upload_store.db".into());
        let env_max_ops = parse_env("UPLOAD_STORE_MAX_CONCURRENT_OPS", 10usize)?;
        let env_admission_timeout = parse_env("UPLOAD_STORE_ADMISSION_TIMEOUT_SECS", 30u64)?;
        let env_session_ttl = parse_env("UPLOAD_STORE_SESSION_TTL_SECS", 24 * 60 * 60u64)?;

        let storage_dir = expand_home(&args.storage_dir.unwrap_or(env_storage));

        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir,
            database_url: args.database_url.unwrap_or(env_db),
            max_concurrent_ops: args.max_concurrent_ops.unwrap_or(env_max_ops),
            admission_timeout_secs: args.admission_timeout_secs.unwrap_or(env_admission_timeout),
            session_ttl_secs: args.session_ttl_secs.unwrap_or(env_session_ttl),
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_env<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

/// Expand a leading `~` against `$HOME` so storage paths like `~/uploads`
/// work from the command line.
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~") {
        if let Some(home) = env::var_os("HOME") {
            return PathBuf::from(home).join(rest.trim_start_matches('/'));
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_home_substitutes_tilde() {
        // SAFETY: test-local env mutation, no concurrent readers of HOME here.
        unsafe { env::set_var("HOME", "/home/tester") };
        assert_eq!(
            expand_home("~/uploads"),
            PathBuf::from("/home/tester/uploads")
        );
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
        assert_eq!(expand_home("relative"), PathBuf::from("relative"));
    }
}
