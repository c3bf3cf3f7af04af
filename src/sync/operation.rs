//! Batch operations and their wire form.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::{ChangeSet, Item, NewItem, ValidationError};

/// One client operation against a list's items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Append(NewItem),
    Modify { id: String, changes: ChangeSet },
    Remove { id: String },
}

impl Operation {
    pub fn append(text: impl Into<String>) -> Self {
        Operation::Append(NewItem::new(text))
    }

    pub fn modify(id: impl Into<String>, changes: ChangeSet) -> Self {
        Operation::Modify {
            id: id.into(),
            changes,
        }
    }

    pub fn remove(id: impl Into<String>) -> Self {
        Operation::Remove { id: id.into() }
    }
}

/// An operation as received from a client, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireOperation {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl TryFrom<WireOperation> for Operation {
    type Error = ValidationError;

    fn try_from(wire: WireOperation) -> Result<Self, Self::Error> {
        match wire.kind.as_str() {
            "append" => serde_json::from_value(wire.payload)
                .map(Operation::Append)
                .map_err(|e| ValidationError::InvalidPayload(e.to_string())),
            "modify" => {
                let mut fields = into_object(wire.payload)?;
                let id = take_id(&mut fields)?;
                let changes = ChangeSet::from_fields(fields)?;
                Ok(Operation::Modify { id, changes })
            }
            "remove" => {
                let mut fields = into_object(wire.payload)?;
                let id = take_id(&mut fields)?;
                if let Some(extra) = fields.keys().next() {
                    return Err(ValidationError::InvalidPayload(format!(
                        "unexpected field '{}' in remove",
                        extra
                    )));
                }
                Ok(Operation::Remove { id })
            }
            other => Err(ValidationError::UnknownOperation(other.to_string())),
        }
    }
}

fn into_object(payload: Value) -> Result<Map<String, Value>, ValidationError> {
    match payload {
        Value::Object(map) => Ok(map),
        other => Err(ValidationError::InvalidPayload(format!(
            "expected an object, got {}",
            other
        ))),
    }
}

fn take_id(fields: &mut Map<String, Value>) -> Result<String, ValidationError> {
    match fields.remove("id") {
        Some(Value::String(id)) if !id.is_empty() => Ok(id),
        Some(_) => Err(ValidationError::InvalidPayload(
            "'id' must be a non-empty string".into(),
        )),
        None => Err(ValidationError::MissingField("id")),
    }
}

/// A batch submitted for one list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub list_id: String,
    pub ops: Vec<WireOperation>,
}

/// The list's items as read back after a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResponse {
    pub items: Vec<Item>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemField;
    use serde_json::json;

    fn wire(value: Value) -> WireOperation {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_parse_append() {
        let op = Operation::try_from(wire(json!({
            "type": "append",
            "payload": { "text": "milk", "checked": false, "done": false }
        })))
        .unwrap();
        assert_eq!(op, Operation::append("milk"));
    }

    #[test]
    fn test_parse_modify() {
        let op = Operation::try_from(wire(json!({
            "type": "modify",
            "payload": { "id": "a", "checked": true }
        })))
        .unwrap();
        assert_eq!(op, Operation::modify("a", ChangeSet::new().with_checked(true)));
    }

    #[test]
    fn test_parse_remove() {
        let op = Operation::try_from(wire(json!({
            "type": "remove",
            "payload": { "id": "a" }
        })))
        .unwrap();
        assert_eq!(op, Operation::remove("a"));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = Operation::try_from(wire(json!({ "type": "upsert", "payload": {} }))).unwrap_err();
        assert_eq!(err, ValidationError::UnknownOperation("upsert".into()));
    }

    #[test]
    fn test_modify_outside_allow_list_rejected() {
        let err = Operation::try_from(wire(json!({
            "type": "modify",
            "payload": { "id": "a", "lastModified": "2020-01-01T00:00:00Z" }
        })))
        .unwrap_err();
        assert_eq!(err, ValidationError::UnknownField("lastModified".into()));
    }

    #[test]
    fn test_modify_wrong_type_rejected() {
        let err = Operation::try_from(wire(json!({
            "type": "modify",
            "payload": { "id": "a", "checked": "true" }
        })))
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidFieldType {
                field: ItemField::Checked,
                expected: "boolean",
            }
        );
    }

    #[test]
    fn test_missing_id_rejected() {
        let err = Operation::try_from(wire(json!({ "type": "remove", "payload": {} }))).unwrap_err();
        assert_eq!(err, ValidationError::MissingField("id"));

        let err = Operation::try_from(wire(json!({ "type": "modify" }))).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidPayload(_)));
    }

    #[test]
    fn test_sync_request_wire_format() {
        let request: SyncRequest = serde_json::from_value(json!({
            "listId": "l1",
            "ops": [
                { "type": "append", "payload": { "text": "milk" } },
                { "type": "remove", "payload": { "id": "a" } }
            ]
        }))
        .unwrap();

        assert_eq!(request.list_id, "l1");
        assert_eq!(request.ops.len(), 2);
        assert_eq!(request.ops[1].kind, "remove");
    }
}
