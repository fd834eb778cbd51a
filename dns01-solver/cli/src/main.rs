use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser};
use dns01_solver::{ChallengeRequest, GoogleDomainsSolver, Solver};
use fs_err as fs;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use config::Config;

mod config;

#[derive(Parser)]
enum Command {
    /// Publish the TXT record for a challenge
    Present {
        #[command(flatten)]
        challenge: ChallengeArgs,
    },
    /// Remove the TXT record for a challenge
    Cleanup {
        #[command(flatten)]
        challenge: ChallengeArgs,
    },
    /// Connect to the secret store and exit
    Check,
    /// Generate configuration template
    Cfg {
        /// Write to file
        #[arg(short, long)]
        write_to: Option<PathBuf>,
    },
}

#[derive(ClapArgs)]
struct ChallengeArgs {
    /// Namespace holding the provider secret
    #[arg(long)]
    namespace: String,
    /// Zone the record belongs to
    #[arg(long)]
    zone: String,
    /// Fully qualified name of the TXT record
    #[arg(long)]
    fqdn: String,
    /// Challenge digest, the TXT record value
    #[arg(long)]
    key: String,
    /// Provider config as a JSON object
    #[arg(long, conflicts_with = "provider_config_file")]
    provider_config: Option<String>,
    /// File holding the provider config JSON
    #[arg(long)]
    provider_config_file: Option<PathBuf>,
}

impl ChallengeArgs {
    fn into_request(self) -> Result<ChallengeRequest> {
        let raw = match (self.provider_config, self.provider_config_file) {
            (Some(raw), _) => Some(raw),
            (None, Some(path)) => Some(fs::read_to_string(path)?),
            (None, None) => None,
        };
        let config: Option<serde_json::Value> = raw
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .context("Failed to parse provider config")?;
        Ok(ChallengeRequest::builder()
            .resource_namespace(self.namespace)
            .resolved_zone(self.zone)
            .resolved_fqdn(self.fqdn)
            .key(self.key)
            .maybe_config(config)
            .build())
    }
}

#[derive(Parser)]
#[command(version)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

/// Fire `stop` on Ctrl-C.
fn cancel_on_ctrl_c(stop: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling");
            stop.cancel();
        }
    });
}

async fn build_solver(config: &Config, stop: CancellationToken) -> Result<GoogleDomainsSolver> {
    let mut solver = GoogleDomainsSolver::new(config.solver_config());
    solver
        .initialize(config.store_config(), stop)
        .await
        .context("Failed to initialize solver")?;
    Ok(solver)
}

#[tokio::main]
async fn main() -> Result<()> {
    {
        use tracing_subscriber::{fmt, EnvFilter};
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt().with_env_filter(filter).init();
    }

    let args = Args::parse();
    if let Command::Cfg { write_to } = &args.command {
        let toml_str = Config::default().to_commented_toml()?;
        match write_to {
            Some(path) => fs::write(path, toml_str)?,
            None => println!("{}", toml_str),
        }
        return Ok(());
    }

    let config = config::load(args.config.as_deref())?;
    let stop = CancellationToken::new();
    cancel_on_ctrl_c(stop.clone());
    let solver = build_solver(&config, stop).await?;

    match args.command {
        Command::Present { challenge } => {
            let request = challenge.into_request()?;
            solver.present(&request).await.context("Failed to present challenge")?;
            info!(fqdn = %request.resolved_fqdn, "challenge presented");
        }
        Command::Cleanup { challenge } => {
            let request = challenge.into_request()?;
            solver.cleanup(&request).await.context("Failed to clean up challenge")?;
            info!(fqdn = %request.resolved_fqdn, "challenge cleaned up");
        }
        Command::Check => {
            info!(solver = solver.name(), "secret store is reachable");
        }
        Command::Cfg { .. } => {}
    }
    Ok(())
}
