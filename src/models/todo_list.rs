use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::item::Item;

/// A named list owning an ordered collection of items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoList {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub items: Vec<Item>,
    pub created_at: DateTime<Utc>,
}

impl TodoList {
    pub fn new(id: impl Into<String>, name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            owner: owner.into(),
            items: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }
}

impl fmt::Display for TodoList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        writeln!(f, "{}", "=".repeat(self.name.len()))?;
        writeln!(f, "ID: {}", self.id)?;
        writeln!(f, "Owner: {}", self.owner)?;

        if self.items.is_empty() {
            writeln!(f, "\n(no items)")?;
        } else {
            writeln!(f)?;
            for item in &self.items {
                let mark = if item.done {
                    "x"
                } else if item.checked {
                    "*"
                } else {
                    " "
                };
                writeln!(f, "  [{}] {}  ({})", mark, item.text, item.id)?;
            }
        }

        Ok(())
    }
}

/// The id/name/owner projection returned when listing lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSummary {
    pub id: String,
    pub name: String,
    pub owner: String,
}
