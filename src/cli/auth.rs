//! CLI command handlers for login, token, status, and logout.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::auth::{
    BrowserLauncher, BrowserResult, FileTokenStore, LoginOptions, PresentationOptions,
};
use crate::config::SessionConfig;
use crate::session::{Session, SessionPhase};

/// Terminal stand-in for a browser: prints the URL and, when interactive,
/// reads the redirect URL the user pastes back.
pub struct TerminalBrowser {
    interactive: bool,
}

impl TerminalBrowser {
    pub fn interactive() -> Self {
        Self { interactive: true }
    }

    pub fn print_only() -> Self {
        Self { interactive: false }
    }
}

#[async_trait]
impl BrowserLauncher for TerminalBrowser {
    async fn open(&self, url: &str, _options: &PresentationOptions) -> BrowserResult {
        println!("🔗 Visit: {url}");
        if !self.interactive {
            return BrowserResult::Dismiss;
        }
        println!("📋 After authorizing, paste the full redirect URL below (empty to cancel):");
        print!("> ");
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        let mut stdin = BufReader::new(tokio::io::stdin());
        if let Err(err) = stdin.read_line(&mut line).await {
            return BrowserResult::Error {
                description: Some(format!("could not read redirect URL: {err}")),
            };
        }
        let line = line.trim();
        if line.is_empty() {
            return BrowserResult::Cancel;
        }
        match reqwest::Url::parse(line) {
            Ok(redirect) => BrowserResult::from_redirect_url(&redirect),
            Err(err) => BrowserResult::Error {
                description: Some(format!("not a URL: {err}")),
            },
        }
    }
}

fn build_session(
    store_dir: Option<PathBuf>,
    browser: TerminalBrowser,
) -> Result<Session, Box<dyn std::error::Error>> {
    let config = SessionConfig::from_env()?;
    let store = match store_dir {
        Some(dir) => FileTokenStore::new(dir),
        None => FileTokenStore::new_default(),
    };
    Ok(Session::builder(config, Arc::new(browser))
        .with_store(Arc::new(store))
        .build()?)
}

/// Handle `oidc-session login`.
pub async fn handle_login(
    store_dir: Option<PathBuf>,
    params: Vec<(String, String)>,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = build_session(store_dir, TerminalBrowser::interactive())?;
    let options = LoginOptions {
        authorization_params: params.into_iter().collect(),
        ..LoginOptions::default()
    };
    session.login(options).await?;
    match session.state().phase {
        SessionPhase::Authenticated => println!("✅ Login successful!"),
        _ => println!("↩️  Login cancelled."),
    }
    Ok(())
}

/// Handle `oidc-session token`.
pub async fn handle_token(store_dir: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let session = build_session(store_dir, TerminalBrowser::print_only())?;
    let token = session.get_access_token_silently().await?;
    println!("{token}");
    Ok(())
}

/// Handle `oidc-session status`.
pub async fn handle_status(store_dir: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let session = build_session(store_dir, TerminalBrowser::print_only())?;
    session.start().await;
    let state = session.state();

    println!("🔐 Session Status\n");
    println!("  Issuer: {}", session.config().domain());
    match state.phase {
        SessionPhase::Authenticated => {
            println!("  State: ✅ {}", state.phase);
            if let Some(user) = &state.user {
                let display = user
                    .name
                    .as_deref()
                    .or(user.email.as_deref())
                    .unwrap_or(user.sub.as_str());
                println!("  User: {display} ({})", user.sub);
            }
        }
        phase => println!("  State: ❌ {phase}"),
    }
    if let Some(error) = &state.error {
        println!("  Last error: ⚠️  {}", error.message);
    }
    Ok(())
}

/// Handle `oidc-session logout`.
pub async fn handle_logout(store_dir: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let session = build_session(store_dir, TerminalBrowser::print_only())?;
    session.logout().await;
    println!("✅ Logged out");
    Ok(())
}
