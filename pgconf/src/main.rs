use anyhow::Context;
use clap::Parser;
use cli::{Cli, Command};

use pgconf::artifacts::Artifacts;
use pgconf::{config, db};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    // Loaded before the logger so RUST_LOG may come from the file.
    let mut unreadable = None;
    let loaded = match &args.env_file {
        Some(path) => config::load_dotenv_from(path)
            .map(Some)
            .with_context(|| format!("Cannot load {}", path.display()))?,
        None => config::load_dotenv().unwrap_or_else(|e| {
            unreadable = Some(e);
            None
        }),
    };
    env_logger::init();
    if let Some(e) = unreadable {
        log::warn!("Ignoring unreadable .env file: {}", e);
    }
    if let Some(path) = loaded {
        log::debug!("Loaded environment from {}", path.display());
    }

    match args.cmd {
        Command::Show { json } => {
            let conf = config::config()?;
            if json {
                println!("{}", serde_json::to_string_pretty(conf)?);
            } else {
                println!("{}", conf);
            }
        }
        Command::Check => {
            let conf = config::config()?;
            let pool = db::pool(conf).await?;
            db::check(&pool).await?;
            println!("Ok");
        }
        Command::Discover { root, json } => {
            let artifacts = Artifacts::discover(&root)?;
            if artifacts.is_empty() {
                log::warn!("No entity or migration files under {}", root.display());
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&artifacts)?);
            } else {
                for path in artifacts.entities.iter().chain(&artifacts.migrations) {
                    println!("{}", path.display());
                }
            }
        }
        Command::Migrate { root } => {
            let conf = config::config()?;
            let pool = db::pool(conf).await?;
            let applied = db::migrate(conf, &pool, &root).await?;
            println!("Applied {} migration(s)", applied);
        }
    }

    Ok(())
}
