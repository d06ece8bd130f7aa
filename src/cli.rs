use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};

use crate::auth::TokenPhase;
use crate::bridge::Bridge;
use crate::config::Settings;
use crate::intents::IntentMap;
use crate::server::{self, BindOptions};

#[derive(Debug, Parser)]
#[command(
    name = "agent-bridge",
    version,
    about = "Bridge between a browser UI and a hosted conversational agent"
)]
pub struct Cli {
    #[command(flatten)]
    overrides: Overrides,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Args)]
struct Overrides {
    /// OAuth client secret file (`{"web": {...}}`).
    #[arg(long, global = true)]
    client_secret: Option<PathBuf>,
    /// Directory holding the persisted access token.
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP bridge.
    Serve(ServeArgs),
    /// Print the provider consent URL.
    AuthUrl,
    /// Exchange an authorization code and persist the resulting token.
    Exchange { code: String },
    /// Check a token (default: the persisted one) against the provider.
    CheckToken {
        #[arg(long)]
        token: Option<String>,
    },
    /// Replace the agent's intents with the contents of a JSON file.
    Sync { path: PathBuf },
    /// Detect the intent of a single utterance.
    Detect {
        utterance: String,
        #[arg(long)]
        session: Option<String>,
    },
}

#[derive(Debug, Clone, Args)]
struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,
    #[arg(long, default_value_t = 8008)]
    port: u16,
    /// Optional file path to write the resolved listener port.
    #[arg(long)]
    port_file: Option<PathBuf>,
}

impl Overrides {
    fn apply(self, settings: &mut Settings) {
        if let Some(path) = self.client_secret {
            settings.client_secret_path = path;
        }
        if let Some(dir) = self.state_dir {
            settings.state_dir = dir;
        }
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::from_env()?;
    cli.overrides.apply(&mut settings);
    let bridge = Bridge::from_settings(&settings)?;

    match cli.command {
        Commands::Serve(args) => {
            server::serve(
                BindOptions {
                    host: args.host,
                    port: args.port,
                    port_file: args.port_file,
                },
                bridge,
            )
            .await
        }
        Commands::AuthUrl => {
            println!("{}", bridge.get_authorization_url()?);
            Ok(())
        }
        Commands::Exchange { code } => {
            bridge.exchange_code(&code).await?;
            println!("token stored");
            Ok(())
        }
        Commands::CheckToken { token: Some(token) } => {
            if !bridge.is_token_valid(Some(token.as_str())).await {
                bail!("token rejected by the provider");
            }
            println!("token valid");
            Ok(())
        }
        Commands::CheckToken { token: None } => match bridge.authorize().await? {
            TokenPhase::Ready(_) => {
                println!("token valid");
                Ok(())
            }
            TokenPhase::AwaitingCode { authorization_url } => {
                bail!("no valid token; authorize at {authorization_url}")
            }
        },
        Commands::Sync { path } => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let intents: IntentMap = serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse intents from {}", path.display()))?;
            let report = bridge.sync_intents(&intents).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_complete() {
                bail!(
                    "sync finished with {} failed item(s)",
                    report.failure_count()
                );
            }
            Ok(())
        }
        Commands::Detect { utterance, session } => {
            let result = bridge.detect(&utterance, session.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
    }
}
