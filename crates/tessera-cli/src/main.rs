// CLI for key generation, token minting and policy dry runs

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands {
    pub mod capability;
    pub mod config;
    pub mod keygen;
    pub mod policy;
    pub mod token;
}

mod output;

use commands::keygen::KeyKind;

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Tessera - token issuance and request authorization", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate key material for the configuration file
    Keygen {
        /// Key purpose
        #[arg(short, long, value_enum, default_value = "hmac")]
        kind: KeyKind,
    },

    /// Issue a token through the configured store chain
    Mint {
        /// Config file path
        #[arg(short, long, default_value = "tessera.toml")]
        config: PathBuf,

        /// Subject the token is issued to
        #[arg(short, long)]
        subject: String,

        /// Lifetime in seconds
        #[arg(short, long, default_value = "600")]
        ttl: u64,

        /// Extra attribute as key=value; repeatable
        #[arg(short, long = "attr", value_parser = commands::token::parse_attribute)]
        attributes: Vec<(String, String)>,
    },

    /// Validate a token identifier and print its contents
    Inspect {
        /// Config file path
        #[arg(short, long, default_value = "tessera.toml")]
        config: PathBuf,

        /// Token identifier
        token: String,
    },

    /// Issue a capability URI for a path
    Capability {
        /// Config file path
        #[arg(short, long, default_value = "tessera.toml")]
        config: PathBuf,

        /// Absolute path the capability grants access to
        #[arg(short, long)]
        path: String,

        /// Permission letters out of r, w and d
        #[arg(long, default_value = "r")]
        perms: String,

        /// Lifetime in seconds
        #[arg(short, long, default_value = "31536000")]
        ttl: u64,
    },

    /// Evaluate a rules file against a request
    Policy {
        /// Rules file (.toml or .json)
        #[arg(short, long)]
        rules: PathBuf,

        /// Authenticated user
        #[arg(short, long)]
        user: Option<String>,

        /// Group of the user; repeatable
        #[arg(short, long = "group")]
        groups: Vec<String>,

        /// HTTP method
        #[arg(short, long, default_value = "GET")]
        method: String,

        /// Request path
        #[arg(short, long)]
        path: String,

        /// Space the resource belongs to
        #[arg(long)]
        space: Option<String>,

        /// Peer address
        #[arg(long)]
        ip: Option<std::net::IpAddr>,
    },

    /// Load and validate a configuration file
    CheckConfig {
        /// Config file path
        config: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries JSON only
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Keygen { kind } => {
            commands::keygen::run(kind)?;
        }
        Commands::Mint {
            config,
            subject,
            ttl,
            attributes,
        } => {
            commands::token::mint(&config, &subject, ttl, attributes).await?;
        }
        Commands::Inspect { config, token } => {
            commands::token::inspect(&config, &token).await?;
        }
        Commands::Capability {
            config,
            path,
            perms,
            ttl,
        } => {
            commands::capability::run(&config, &path, &perms, ttl).await?;
        }
        Commands::Policy {
            rules,
            user,
            groups,
            method,
            path,
            space,
            ip,
        } => {
            let request = commands::policy::DryRun {
                user,
                groups,
                method,
                path,
                space,
                ip,
            };
            commands::policy::run(&rules, request).await?;
        }
        Commands::CheckConfig { config } => {
            commands::config::check(&config)?;
        }
    }

    Ok(())
}
