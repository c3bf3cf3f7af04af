mod item;
mod todo_list;

pub use item::{ChangeSet, Item, ItemField, NewItem, ValidationError};
pub use todo_list::{ListSummary, TodoList};
