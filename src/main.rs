use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

use meetup_notifier::admin::{self, MessageLevel};
use meetup_notifier::broadcast::BroadcastError;
use meetup_notifier::config;
use meetup_notifier::db;
use meetup_notifier::speakers;
use meetup_notifier::telegram::TelegramClient;

#[derive(Debug, Parser)]
#[command(author, version, about = "Meetup admin tasks: notification broadcasts and speaker bookkeeping")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send a stored notification to every registered client
    SendNotification {
        /// Notification record id
        #[arg(long)]
        id: i64,
    },
    /// Link clients to a lecture as its speakers
    AssignSpeakers {
        #[arg(long)]
        lecture: i64,
        /// Client record id (repeatable)
        #[arg(long = "client", required = true)]
        clients: Vec<i64>,
    },
    /// Print a sample configuration file
    ExampleConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if let Command::ExampleConfig = args.command {
        print!("{}", config::example());
        return Ok(());
    }

    let cfg = config::load(Some(&args.config))?
        .with_token_override(std::env::var("TELEGRAM_ACCESS_TOKEN").ok());
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| cfg.database_url());
    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    match args.command {
        Command::SendNotification { id } => {
            let outcome = match TelegramClient::new(&cfg.telegram) {
                Ok(client) => {
                    admin::send_notification(&pool, &client, id, cfg.telegram.concurrency).await?
                }
                Err(err) => match db::get_notification(&pool, id).await? {
                    Some(n) => admin::render_error(&n.title, &BroadcastError::Configuration(err)),
                    None => admin::render_not_found(id),
                },
            };
            match outcome.level {
                MessageLevel::Success => info!(notification_id = id, "{}", outcome.message),
                _ => warn!(notification_id = id, "{}", outcome.message),
            }
            println!("{outcome}");
        }
        Command::AssignSpeakers { lecture, clients } => {
            speakers::assign_speakers(&pool, lecture, &clients).await?;
            let names = db::lecture_speaker_names(&pool, lecture).await?;
            println!("Lecture {lecture} speakers: {}", names.join(", "));
        }
        Command::ExampleConfig => unreachable!("handled before config load"),
    }

    Ok(())
}
