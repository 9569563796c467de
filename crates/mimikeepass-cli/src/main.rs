//! mimikeepass - a local KeePass secrets broker
//!
//! `serve` unlocks one or more databases interactively and then answers
//! lookups over an owner-only Unix socket; `password` is the one-shot
//! client; `ssh-askpass` adapts SSH's askpass protocol to daemon lookups so
//! password prompts resolve without retyping the master password.

use anyhow::{ensure, Context, Result};
use clap::{Parser, Subcommand};
use mimikeepass_api::EntryQuery;
use mimikeepass_askpass::{ask_pass, parse_password_auth_prompt};
use mimikeepass_daemon::{acquire_listeners, Daemon};
use mimikeepass_ipc::Client;
use mimikeepass_store::{unlock_store, StoreSet};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Askpass variable consulted when the daemon prompts for master passwords
const UNLOCK_ASKPASS_VAR: &str = "SSH_ASKPASS";

/// Askpass variable consulted by the ssh-askpass wrapper's fallback chain
const SSH_ASKPASS_VAR: &str = "MIMIKEEPASS_SSH_ASKPASS";

#[derive(Parser, Debug)]
#[command(name = "mimikeepass")]
#[command(about = "Local KeePass secrets broker", long_about = None)]
struct Cli {
    /// Log level when RUST_LOG is not set
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Unlock databases and serve lookups until idle
    Serve {
        /// KeePass database files, in lookup-precedence order
        files: Vec<PathBuf>,

        /// Socket path override (default: $MIMIKEEPASS_SOCKET, then the
        /// runtime directory)
        #[arg(long)]
        socket: Option<PathBuf>,

        /// Shut down after this many seconds with no client connected
        /// (0 or less disables idle shutdown)
        #[arg(long, default_value_t = 0.0)]
        idle: f64,
    },

    /// Look up one password from a running daemon
    Password {
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        username: Option<String>,
    },

    /// SSH askpass helper: answer password prompts from the daemon
    SshAskpass {
        /// The prompt text SSH passed us
        prompt: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve {
            files,
            socket,
            idle,
        } => serve(files, socket, idle).await,
        Command::Password {
            title,
            url,
            username,
        } => password(title, url, username).await,
        Command::SshAskpass { prompt } => ssh_askpass(&prompt).await,
    }
}

async fn serve(files: Vec<PathBuf>, socket: Option<PathBuf>, idle: f64) -> Result<()> {
    ensure!(!files.is_empty(), "no database files specified");

    let mut stores = Vec::with_capacity(files.len());
    for file in &files {
        let store = unlock_store(file, |text| ask_pass(text, UNLOCK_ASKPASS_VAR))
            .with_context(|| format!("failed to unlock {}", file.display()))?;
        stores.push(store);
    }

    let idle_timeout = (idle > 0.0).then(|| Duration::from_secs_f64(idle));
    let daemon = Daemon::new(StoreSet::new(stores), idle_timeout);

    let (listeners, _socket_guard) = acquire_listeners(socket.as_deref())?;

    info!(
        databases = files.len(),
        idle = ?idle_timeout,
        "mimikeepass daemon starting"
    );
    daemon.run(listeners).await?;
    Ok(())
}

async fn password(
    title: Option<String>,
    url: Option<String>,
    username: Option<String>,
) -> Result<()> {
    let mut client = Client::connect(None)
        .await
        .context("failed to connect to mimikeepass daemon")?;
    let query = EntryQuery {
        title,
        url,
        username,
        uuid: None,
    };

    match client.get_password(query).await? {
        Some(password) => {
            println!("{password}");
            Ok(())
        }
        None => std::process::exit(1),
    }
}

async fn ssh_askpass(prompt: &str) -> Result<()> {
    match resolve_password(prompt).await {
        Some(password) if !password.is_empty() => {
            println!("{password}");
            Ok(())
        }
        _ => std::process::exit(1),
    }
}

/// Resolution chain for one SSH prompt: daemon lookup by `ssh://host` and
/// username when the prompt is a password-authentication prompt, then the
/// bastion-style composite-username fallback, then the interactive askpass
/// chain. `SSH_ASKPASS_PROMPT` set means SSH is asking for something other
/// than a login password, so the daemon is skipped entirely.
async fn resolve_password(prompt: &str) -> Option<String> {
    if std::env::var_os("SSH_ASKPASS_PROMPT").is_some() {
        return ask_pass(prompt, SSH_ASKPASS_VAR);
    }

    if let Some(parsed) = parse_password_auth_prompt(prompt) {
        let url = parsed.url();
        if let Some(password) = daemon_lookup(&url, &parsed.username).await {
            return Some(password);
        }
        if let Some(fallback) = parsed.fallback_username() {
            if let Some(password) = daemon_lookup(&url, fallback).await {
                return Some(password);
            }
        }
    }

    ask_pass(prompt, SSH_ASKPASS_VAR)
}

/// One daemon lookup; any failure (daemon down, no match) is "no answer".
async fn daemon_lookup(url: &str, username: &str) -> Option<String> {
    let mut client = Client::connect(None).await.ok()?;
    client
        .get_password(EntryQuery {
            url: Some(url.to_string()),
            username: Some(username.to_string()),
            ..Default::default()
        })
        .await
        .ok()
        .flatten()
}
