use std::time::Duration;

use appwrite_cli::commands;
use appwrite_cli::push::budget::DEFAULT_ATTEMPTS;
use appwrite_cli::push::PushOptions;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "appwrite",
    about = "Appwrite CLI: keep an Appwrite project in sync with appwrite.config.json",
    version
)]
struct Cli {
    /// Print debug logs and full error chains
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create appwrite.config.json and .appwrite/config.toml
    Init {
        /// Path to initialize (defaults to current directory)
        path: Option<String>,

        #[arg(long)]
        project_id: Option<String>,

        #[arg(long)]
        project_name: Option<String>,
    },
    /// Manage client configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Push local resources to the Appwrite project
    Push(PushArgs),
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Set a configuration value
    Set {
        /// Configuration key (endpoint, api_key, self_signed)
        key: String,
        /// Value to set
        value: String,
    },
    /// Get a configuration value
    Get {
        /// Configuration key to read
        key: String,
    },
    /// List all configuration values
    List,
}

#[derive(clap::Args)]
struct PushArgs {
    /// all, settings, function, site, table, collection, bucket, team or topic
    target: Option<String>,

    /// Push every local resource of the chosen kind without asking
    #[arg(long)]
    all: bool,

    /// Apply changes without asking for confirmation
    #[arg(short, long)]
    force: bool,

    #[arg(long = "function-id", value_name = "ID")]
    function_ids: Vec<String>,

    #[arg(long = "site-id", value_name = "ID")]
    site_ids: Vec<String>,

    #[arg(long = "table-id", value_name = "ID")]
    table_ids: Vec<String>,

    #[arg(long = "collection-id", value_name = "ID")]
    collection_ids: Vec<String>,

    #[arg(long = "bucket-id", value_name = "ID")]
    bucket_ids: Vec<String>,

    #[arg(long = "team-id", value_name = "ID")]
    team_ids: Vec<String>,

    #[arg(long = "topic-id", value_name = "ID")]
    topic_ids: Vec<String>,

    /// Don't wait for deployments to finish building
    #[arg(long = "async")]
    async_deploy: bool,

    /// Update resource settings only; skip creating deployments
    #[arg(long)]
    no_code: bool,

    /// Replace remote variables with the resource's .env file
    #[arg(long)]
    with_variables: bool,

    /// Maximum status checks per deployment, column or index
    #[arg(long, default_value_t = DEFAULT_ATTEMPTS, value_parser = clap::value_parser!(u32).range(1..))]
    attempts: u32,
}

impl PushArgs {
    fn options(self, verbose: bool) -> (Option<String>, PushOptions) {
        let options = PushOptions {
            force: self.force,
            all: self.all,
            verbose,
            async_deploy: self.async_deploy,
            code: !self.no_code,
            with_variables: self.with_variables,
            attempts: self.attempts,
            poll_interval: Duration::from_secs(2),
            function_ids: self.function_ids,
            site_ids: self.site_ids,
            table_ids: self.table_ids,
            collection_ids: self.collection_ids,
            bucket_ids: self.bucket_ids,
            team_ids: self.team_ids,
            topic_ids: self.topic_ids,
        };
        (self.target, options)
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "appwrite_cli=debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    println!(
        "{} {}",
        "appwrite".bold().magenta(),
        env!("CARGO_PKG_VERSION").dimmed()
    );
    println!();

    match cli.command {
        Commands::Init {
            path,
            project_id,
            project_name,
        } => commands::init::run(path, project_id, project_name).await,
        Commands::Config { action } => match action {
            ConfigAction::Set { key, value } => commands::config::set(key, value).await,
            ConfigAction::Get { key } => commands::config::get(key).await,
            ConfigAction::List => commands::config::list().await,
        },
        Commands::Push(args) => {
            let (target, options) = args.options(cli.verbose);
            commands::push::run(target, options).await
        }
    }
}
