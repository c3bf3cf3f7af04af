mod config_cmd;
mod item;
mod list;

pub use config_cmd::ConfigCommand;
pub use item::ItemCommand;
pub use list::ListCommand;

use clap::ValueEnum;

use todosync::db::ListRepository;
use todosync::models::TodoList;

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Finds a list by ID, falling back to a name lookup among the owner's lists.
async fn find_list(
    repo: &ListRepository,
    owner: &str,
    identifier: &str,
) -> Result<TodoList, Box<dyn std::error::Error>> {
    if let Some(list) = repo.get(identifier).await? {
        return Ok(list);
    }

    let summary = repo
        .list_for_owner(owner)
        .await?
        .into_iter()
        .find(|summary| summary.name == identifier);

    match summary {
        Some(summary) => match repo.get(&summary.id).await? {
            Some(list) => Ok(list),
            None => Err(format!("List not found: {}", identifier).into()),
        },
        None => Err(format!("List not found: {}", identifier).into()),
    }
}

/// Resolves an item by full ID, unique ID prefix, or exact text.
fn resolve_item(list: &TodoList, identifier: &str) -> Result<String, String> {
    if let Some(item) = list.item(identifier) {
        return Ok(item.id.clone());
    }

    let by_prefix: Vec<_> = list
        .items
        .iter()
        .filter(|item| item.id.starts_with(identifier))
        .collect();
    match by_prefix.len() {
        1 => return Ok(by_prefix[0].id.clone()),
        0 => {}
        n => {
            return Err(format!(
                "Item ID prefix '{}' is ambiguous ({} matches)",
                identifier, n
            ))
        }
    }

    let by_text: Vec<_> = list
        .items
        .iter()
        .filter(|item| item.text == identifier)
        .collect();
    match by_text.len() {
        1 => Ok(by_text[0].id.clone()),
        0 => Err(format!("Item not found in '{}': {}", list.name, identifier)),
        n => Err(format!(
            "Item text '{}' is ambiguous ({} matches), use its ID",
            identifier, n
        )),
    }
}
