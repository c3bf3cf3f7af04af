use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use commands::{ConfigCommand, ItemCommand, ListCommand};
use todosync::config::Config;
use todosync::db::{init_db, ListRepository};
use todosync::sync::SyncEngine;

#[derive(Parser)]
#[command(name = "todosync")]
#[command(version)]
#[command(about = "Shared todo lists from the command line", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage lists
    List(ListCommand),

    /// Add, check, finish and remove items
    Item(ItemCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::List(cmd)) => {
            let pool = init_db(&config.database_path.value).await?;
            let repo = ListRepository::new(pool);
            cmd.run(&repo, &config).await?;
            repo.close().await;
        }
        Some(Commands::Item(cmd)) => {
            let pool = init_db(&config.database_path.value).await?;
            let engine = SyncEngine::new(ListRepository::new(pool));
            cmd.run(&engine, &config).await?;
            engine.store().close().await;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(&config)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
