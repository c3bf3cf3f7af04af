use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// A single entry in a todo list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub text: String,
    pub checked: bool,
    pub done: bool,
    pub last_modified: DateTime<Utc>,
}

/// Initial field values for an appended item.
///
/// `id` and `lastModified` are assigned by the server, so they are rejected
/// here along with any other unknown key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewItem {
    pub text: String,
    #[serde(default)]
    pub checked: bool,
    #[serde(default)]
    pub done: bool,
}

impl NewItem {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            checked: false,
            done: false,
        }
    }

    pub fn into_item(self, id: String, at: DateTime<Utc>) -> Item {
        Item {
            id,
            text: self.text,
            checked: self.checked,
            done: self.done,
            last_modified: at,
        }
    }
}

/// Item fields a client is allowed to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemField {
    Text,
    Checked,
    Done,
}

impl ItemField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemField::Text => "text",
            ItemField::Checked => "checked",
            ItemField::Done => "done",
        }
    }
}

impl fmt::Display for ItemField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemField {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ItemField::Text),
            "checked" => Ok(ItemField::Checked),
            "done" => Ok(ItemField::Done),
            _ => Err(ValidationError::UnknownField(s.to_string())),
        }
    }
}

/// Rejections raised while turning client input into operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("unknown operation type '{0}'")]
    UnknownOperation(String),

    #[error("field '{0}' cannot be modified")]
    UnknownField(String),

    #[error("field '{field}' must be a {expected}")]
    InvalidFieldType {
        field: ItemField,
        expected: &'static str,
    },

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// A field-level change set restricted to [`ItemField`].
///
/// Fields left as `None` keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_checked(mut self, checked: bool) -> Self {
        self.checked = Some(checked);
        self
    }

    pub fn with_done(mut self, done: bool) -> Self {
        self.done = Some(done);
        self
    }

    /// Builds a change set from raw JSON fields, rejecting anything outside
    /// the allow-list or carrying the wrong value type.
    pub fn from_fields(fields: Map<String, Value>) -> Result<Self, ValidationError> {
        let mut changes = Self::new();

        for (key, value) in fields {
            let field: ItemField = key.parse()?;
            match field {
                ItemField::Text => match value {
                    Value::String(text) => changes.text = Some(text),
                    _ => {
                        return Err(ValidationError::InvalidFieldType {
                            field,
                            expected: "string",
                        })
                    }
                },
                ItemField::Checked => {
                    changes.checked = Some(value.as_bool().ok_or(
                        ValidationError::InvalidFieldType {
                            field,
                            expected: "boolean",
                        },
                    )?)
                }
                ItemField::Done => {
                    changes.done = Some(value.as_bool().ok_or(
                        ValidationError::InvalidFieldType {
                            field,
                            expected: "boolean",
                        },
                    )?)
                }
            }
        }

        Ok(changes)
    }

    /// Writes the changed fields and the new timestamp onto `item`.
    pub fn apply_to(&self, item: &mut Item, at: DateTime<Utc>) {
        if let Some(text) = &self.text {
            item.text = text.clone();
        }
        if let Some(checked) = self.checked {
            item.checked = checked;
        }
        if let Some(done) = self.done {
            item.done = done;
        }
        item.last_modified = at;
    }
}
