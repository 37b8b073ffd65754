use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod credentials;
mod environment;
mod error;
mod protocol;
mod settings;
mod setup;

use credentials::Resolver;
use environment::ProcessEnv;

/// Docker credential helper that reads registry logins from the environment
#[derive(Parser, Debug)]
#[command(name = "docker-credential-env", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print credentials for the server URL read from stdin
    Get,
    /// Store credentials (not supported unless IGNORE_DOCKER_LOGIN is set)
    Store,
    /// Erase credentials (not supported unless IGNORE_DOCKER_LOGIN is set)
    Erase,
    /// List credentials (not supported)
    List,
    /// Register this helper in the Docker client config
    Setup {
        /// `show`, `default`, or a registry hostname
        target: String,
    },
}

async fn run(cli: Cli, resolver: Resolver) -> Result<()> {
    let settings = resolver.settings();
    let stdin = std::io::stdin().lock();
    let stdout = std::io::stdout().lock();

    match cli.command {
        Commands::Get => protocol::get(&resolver, stdin, stdout).await,
        Commands::Store => protocol::store(&settings, stdin),
        Commands::Erase => protocol::erase(&settings, stdin),
        Commands::List => protocol::list(),
        Commands::Setup { target } => {
            let target = setup::SetupTarget::parse(&target)?;
            let path = setup::config_path(&ProcessEnv)?;
            let mut stdout = stdout;
            setup::run(&target, &path, &mut stdout)
        }
    }
}

#[tokio::main]
async fn main() {
    let resolver = Resolver::from_process_env();

    // stdout carries the protocol response, so logs go to stderr
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| resolver.settings().default_log_filter().into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli, resolver).await {
        if let Some(cause) = err.downcast_ref::<error::CredentialError>() {
            tracing::debug!(kind = ?cause.kind(), "Credential helper failed");
        }
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}
