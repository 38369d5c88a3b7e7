use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use scrum_ims::cache::SyncCursorCache;
use scrum_ims::cmd::config::{self as config_cmd, ConfigArgs};
use scrum_ims::cmd::issues::{self, CommandOutput, IssuesArgs};
use scrum_ims::cmd::sync::{self, SyncArgs};
use scrum_ims::config::AppConfig;
use scrum_ims::context::AppContext;
use scrum_ims::error::AppResult;
use scrum_ims::infra::jira::{JiraConnector, JiraMappingConfiguration};

#[derive(Parser)]
#[command(
    name = "ims",
    author,
    version,
    about = "Sync Scrum game issues with an issue tracker"
)]
struct Cli {
    /// Mapping file to use instead of the configured default.
    #[arg(long, global = true)]
    mapping: Option<PathBuf>,
    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage CLI configuration.
    Config(ConfigArgs),
    /// Read and change tracker issues through the mapping.
    Issues(IssuesArgs),
    /// Print events recorded since the previous sync of each issue.
    Sync(SyncArgs),
}

#[tokio::main]
async fn main() {
    setup_logging();

    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

fn setup_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> AppResult<()> {
    let cli = Cli::parse();

    let output = match cli.command {
        Commands::Config(args) => return config_cmd::run(args.command),
        Commands::Issues(args) => {
            let context = jira_context(cli.mapping)?;
            issues::run(&context, args.command).await?
        }
        Commands::Sync(args) => {
            let context = jira_context(cli.mapping)?;
            let mut cursors = SyncCursorCache::load()?;
            sync::run(&context, args, &mut cursors).await?
        }
    };

    print_output(&output, cli.json)
}

fn jira_context(mapping: Option<PathBuf>) -> AppResult<AppContext<JiraMappingConfiguration>> {
    let config = AppConfig::load(mapping)?;

    if config.jira_base_url.is_none() {
        tracing::warn!("Jira base URL not configured; tracker requests will fail");
    }
    if config.jira_email.is_none() {
        tracing::warn!("Jira email not configured; tracker requests will fail");
    }
    if config.jira_token.is_none() {
        tracing::warn!("Jira token not configured; tracker requests will fail");
    }

    let mapping = JiraMappingConfiguration::load(config.mapping_path()?)?;
    let connector = Arc::new(JiraConnector::new(
        config.jira_base_url.clone(),
        config.jira_email.clone(),
        config.jira_token.clone(),
    ));

    Ok(AppContext::new(config, connector, mapping))
}

fn print_output(output: &CommandOutput, as_json: bool) -> AppResult<()> {
    println!("{}", output.render(as_json)?);
    Ok(())
}
