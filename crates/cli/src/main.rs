//! Terrapin operator CLI.
//!
//! Talks to a running mirror: trigger a metadata sync, list cached provider
//! versions, check health.

mod api_client;

use anyhow::{Context, Result};
use api_client::ApiClient;
use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "terrapin")]
#[command(version, about = "Operator CLI for the Terrapin provider mirror", long_about = None)]
struct Cli {
    /// Base URL of the mirror server
    #[arg(
        short,
        long,
        env = "TERRAPIN_SERVER",
        default_value = "http://127.0.0.1:8080"
    )]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Trigger a full metadata sync
    Sync {
        /// Sync budget, e.g. 90s or 5m
        #[arg(long)]
        timeout: Option<String>,
    },
    /// List cached versions of a provider, addressed as host/namespace/type
    Versions {
        /// Provider address, e.g. registry.terraform.io/hashicorp/random
        provider: String,
    },
    /// Check the mirror's readiness
    Health,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let client = ApiClient::new(&cli.server)?;

    match cli.command {
        Commands::Sync { timeout } => {
            client.sync(timeout.as_deref()).await?;
            println!("sync accepted");
        }
        Commands::Versions { provider } => {
            let mut parts = provider.splitn(3, '/');
            let (hostname, namespace, type_name) =
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(h), Some(n), Some(t)) if !h.is_empty() && !n.is_empty() && !t.is_empty() => {
                        (h, n, t)
                    }
                    _ => anyhow::bail!(
                        "provider must be addressed as host/namespace/type, got {provider:?}"
                    ),
                };

            let versions = client
                .versions(hostname, namespace, type_name)
                .await
                .context("failed to list versions")?;

            if versions.is_empty() {
                println!("no versions cached for {provider}");
            } else {
                for version in versions {
                    println!("{version}");
                }
            }
        }
        Commands::Health => {
            client.health().await?;
            let server = client.server_version().await?;
            println!("{} {} ready", server.name, server.version);
        }
    }

    Ok(())
}
