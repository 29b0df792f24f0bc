//! CLI entry point for oidc-session.

pub mod auth;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// OIDC session CLI
#[derive(Parser, Debug)]
#[command(name = "oidc-session", version, about = "Sign in, print tokens, sign out")]
pub struct Cli {
    /// Directory for the persisted refresh token (default: platform data dir)
    #[arg(long, global = true, env = "OIDC_STORE_DIR")]
    pub store_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in through the browser (paste the redirect URL back)
    Login(LoginArgs),
    /// Print a valid access token, refreshing if needed
    Token,
    /// Show session status
    Status,
    /// Sign out locally and at the issuer
    Logout,
}

/// Arguments for `oidc-session login`.
#[derive(Parser, Debug)]
pub struct LoginArgs {
    /// Extra authorization parameter, `key=value` (repeatable)
    #[arg(short = 'p', long = "param", value_parser = parse_key_value)]
    pub params: Vec<(String, String)>,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.trim().to_string(), value.to_string()))
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))
}
