use clap::{Args, Subcommand};

use super::{find_list, OutputFormat};
use todosync::config::Config;
use todosync::db::ListRepository;

#[derive(Args)]
pub struct ListCommand {
    #[command(subcommand)]
    pub command: ListSubcommand,
}

#[derive(Subcommand)]
pub enum ListSubcommand {
    /// Create a new list
    Create {
        /// Name of the list
        name: String,
    },

    /// Rename a list
    Rename {
        /// List ID or name
        identifier: String,

        /// New name
        name: String,
    },

    /// Show all lists
    All {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show a list and its items
    Show {
        /// List ID or name
        identifier: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl ListCommand {
    pub async fn run(
        &self,
        repo: &ListRepository,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let owner = &config.owner.value;

        match &self.command {
            ListSubcommand::Create { name } => {
                let list = repo.create(name, owner).await?;
                println!("Created list:");
                println!("{}", list);
                Ok(())
            }

            ListSubcommand::Rename { identifier, name } => {
                let list = find_list(repo, owner, identifier).await?;
                if !repo.rename(&list.id, name).await? {
                    return Err(format!("List not found: {}", identifier).into());
                }
                println!("Renamed '{}' to '{}'", list.name, name.trim());
                Ok(())
            }

            ListSubcommand::All { format } => {
                let lists = repo.list_for_owner(owner).await?;

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&lists)?);
                    }
                    OutputFormat::Text => {
                        if lists.is_empty() {
                            println!("No lists found");
                            return Ok(());
                        }
                        println!("{:<36}  NAME", "ID");
                        println!("{}", "-".repeat(60));
                        for list in &lists {
                            println!("{:<36}  {}", list.id, list.name);
                        }
                        println!("\nTotal: {} list(s)", lists.len());
                    }
                }
                Ok(())
            }

            ListSubcommand::Show { identifier, format } => {
                let list = find_list(repo, owner, identifier).await?;
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&list)?);
                    }
                    OutputFormat::Text => {
                        print!("{}", list);
                    }
                }
                Ok(())
            }
        }
    }
}
