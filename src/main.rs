//! oidc-session CLI binary entry point.

use clap::Parser;
use oidc_session::cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store_dir = cli.store_dir;

    let result = match cli.command {
        Commands::Login(args) => oidc_session::cli::auth::handle_login(store_dir, args.params).await,
        Commands::Token => oidc_session::cli::auth::handle_token(store_dir).await,
        Commands::Status => oidc_session::cli::auth::handle_status(store_dir).await,
        Commands::Logout => oidc_session::cli::auth::handle_logout(store_dir).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
