use clap::{Args, Subcommand};

use super::{find_list, resolve_item, OutputFormat};
use todosync::config::Config;
use todosync::db::ListRepository;
use todosync::models::{ChangeSet, Item};
use todosync::sync::{Operation, SyncEngine};

#[derive(Args)]
pub struct ItemCommand {
    #[command(subcommand)]
    pub command: ItemSubcommand,

    /// Output format for the resulting items
    #[arg(long, short, value_enum, default_value = "text", global = true)]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum ItemSubcommand {
    /// Append an item to a list
    Add {
        /// List ID or name
        list: String,

        /// Item text
        text: String,
    },

    /// Check (or uncheck) an item
    Check {
        /// List ID or name
        list: String,

        /// Item ID, ID prefix, or text
        item: String,

        /// Clear the checked flag instead
        #[arg(long)]
        uncheck: bool,
    },

    /// Mark items as done
    Done {
        /// List ID or name
        list: String,

        /// Item IDs, ID prefixes, or texts
        #[arg(required = true)]
        items: Vec<String>,
    },

    /// Remove items from a list
    Remove {
        /// List ID or name
        list: String,

        /// Item IDs, ID prefixes, or texts
        #[arg(required = true)]
        items: Vec<String>,
    },
}

impl ItemCommand {
    pub async fn run(
        &self,
        engine: &SyncEngine<ListRepository>,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let repo = engine.store();
        let owner = &config.owner.value;

        let (list, ops) = match &self.command {
            ItemSubcommand::Add { list, text } => {
                if text.trim().is_empty() {
                    return Err("Item text cannot be empty".into());
                }
                let list = find_list(repo, owner, list).await?;
                (list, vec![Operation::append(text.trim())])
            }

            ItemSubcommand::Check {
                list,
                item,
                uncheck,
            } => {
                let list = find_list(repo, owner, list).await?;
                let id = resolve_item(&list, item)?;
                let changes = ChangeSet::new().with_checked(!uncheck);
                (list, vec![Operation::modify(id, changes)])
            }

            ItemSubcommand::Done { list, items } => {
                let list = find_list(repo, owner, list).await?;
                let ops = items
                    .iter()
                    .map(|item| {
                        let id = resolve_item(&list, item)?;
                        Ok(Operation::modify(id, ChangeSet::new().with_done(true)))
                    })
                    .collect::<Result<Vec<_>, String>>()?;
                (list, ops)
            }

            ItemSubcommand::Remove { list, items } => {
                let list = find_list(repo, owner, list).await?;
                let ops = items
                    .iter()
                    .map(|item| resolve_item(&list, item).map(Operation::remove))
                    .collect::<Result<Vec<_>, String>>()?;
                (list, ops)
            }
        };

        let items = engine.apply(&list.id, ops).await?;
        print_items(&list.name, &items, &self.format)
    }
}

fn print_items(
    name: &str,
    items: &[Item],
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(items)?);
        }
        OutputFormat::Text => {
            println!("{}", name);
            if items.is_empty() {
                println!("  (no items)");
            }
            for item in items {
                let mark = if item.done {
                    "x"
                } else if item.checked {
                    "*"
                } else {
                    " "
                };
                println!("  [{}] {}  ({})", mark, item.text, item.id);
            }
        }
    }
    Ok(())
}
