//! WebSocket message handling.
//!
//! Every client message is a JSON object tagged by `api`; every reply echoes
//! that tag with either a `result` or an `error`.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};

use super::hub::ListChanged;
use super::routes::ListView;
use super::AppState;
use crate::db::ListError;
use crate::models::{ChangeSet, Item, ListSummary};
use crate::sync::{Operation, StoreError, SyncError, SyncRequest};

/// Messages accepted from clients.
#[derive(Debug, Deserialize)]
#[serde(tag = "api")]
enum ClientMessage {
    #[serde(rename = "lists")]
    Lists,
    #[serde(rename = "list")]
    List { id: String },
    #[serde(rename = "addlist")]
    AddList { name: String },
    #[serde(rename = "addTodoItem", rename_all = "camelCase")]
    AddTodoItem { todo_list_id: String, text: String },
    #[serde(rename = "toggleTodoItemChecked", rename_all = "camelCase")]
    ToggleTodoItemChecked {
        todo_list_id: String,
        id: String,
        checked: bool,
    },
    #[serde(rename = "markTodoItemsDone", rename_all = "camelCase")]
    MarkTodoItemsDone {
        todo_list_id: String,
        checked_todo_ids: Vec<String>,
    },
    #[serde(rename = "deleteTodoItems", rename_all = "camelCase")]
    DeleteTodoItems {
        todo_list_id: String,
        checked_todo_ids: Vec<String>,
    },
    #[serde(rename = "sync")]
    Sync(SyncRequest),
}

#[derive(Serialize)]
struct Reply<'a, T> {
    api: &'a str,
    result: T,
}

#[derive(Serialize)]
struct ErrorReply<'a> {
    api: &'a str,
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<usize>,
}

impl From<SyncError> for ErrorBody {
    fn from(e: SyncError) -> Self {
        Self {
            kind: e.kind(),
            index: e.index(),
            message: e.to_string(),
        }
    }
}

impl From<StoreError> for ErrorBody {
    fn from(e: StoreError) -> Self {
        tracing::warn!("Store error: {}", e);
        Self {
            kind: "store_unavailable",
            message: e.to_string(),
            index: None,
        }
    }
}

impl From<ListError> for ErrorBody {
    fn from(e: ListError) -> Self {
        match e {
            ListError::DuplicateName(_) => Self {
                kind: "duplicate_name",
                message: e.to_string(),
                index: None,
            },
            ListError::EmptyName => Self {
                kind: "validation",
                message: e.to_string(),
                index: None,
            },
            ListError::Store(store) => store.into(),
        }
    }
}

#[derive(Serialize)]
struct Created {
    id: String,
}

#[derive(Serialize)]
struct Todos {
    todos: Vec<Item>,
}

#[derive(Serialize)]
struct Changed {
    id: String,
    todos: Vec<Item>,
}

/// Per-connection state: its id and the list it is watching, if any.
pub struct Session {
    id: u64,
    watching: Option<(String, broadcast::Receiver<ListChanged>)>,
}

impl Session {
    pub fn new(id: u64) -> Self {
        Self { id, watching: None }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn watched_list(&self) -> Option<&str> {
        self.watching.as_ref().map(|(list_id, _)| list_id.as_str())
    }

    async fn watch(&mut self, state: &AppState, list_id: &str) {
        if self.watched_list() == Some(list_id) {
            return;
        }
        let receiver = state.hub.subscribe(list_id).await;
        self.watching = Some((list_id.to_string(), receiver));
    }

    /// Waits until another session changes the watched list.
    ///
    /// Never resolves while nothing is watched.
    async fn next_change(&mut self) -> String {
        loop {
            let Some((list_id, receiver)) = self.watching.as_mut() else {
                return std::future::pending().await;
            };

            match receiver.recv().await {
                Ok(changed) if changed.origin == self.id => continue,
                Ok(changed) => return changed.list_id,
                // Missed some notifications; one re-read covers all of them
                Err(RecvError::Lagged(_)) => return list_id.clone(),
                Err(RecvError::Closed) => self.watching = None,
            }
        }
    }
}

fn encode<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        tracing::error!("Failed to encode reply: {}", e);
        String::from(r#"{"error":{"kind":"internal","message":"failed to encode reply"}}"#)
    })
}

fn reply<T: Serialize>(api: &str, result: T) -> String {
    encode(&Reply { api, result })
}

fn error_reply(api: &str, error: impl Into<ErrorBody>) -> String {
    encode(&ErrorReply {
        api,
        error: error.into(),
    })
}

/// Handles one text message and returns the reply to send back.
pub async fn dispatch(state: &AppState, session: &mut Session, text: &str) -> String {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            return error_reply(
                "unknown",
                ErrorBody {
                    kind: "bad_request",
                    message: format!("invalid JSON: {}", e),
                    index: None,
                },
            )
        }
    };

    let api = value
        .get("api")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();

    let message: ClientMessage = match serde_json::from_value(value) {
        Ok(message) => message,
        Err(e) => {
            return error_reply(
                &api,
                ErrorBody {
                    kind: "bad_request",
                    message: e.to_string(),
                    index: None,
                },
            )
        }
    };

    match message {
        ClientMessage::Lists => match state.repo.list_for_owner(&state.owner).await {
            Ok(lists) => reply::<Vec<ListSummary>>(&api, lists),
            Err(e) => error_reply(&api, e),
        },
        ClientMessage::List { id } => match state.repo.get(&id).await {
            Ok(Some(list)) => {
                session.watch(state, &id).await;
                reply(&api, ListView::from(list))
            }
            Ok(None) => error_reply(&api, SyncError::NotFound { list_id: id }),
            Err(e) => error_reply(&api, e),
        },
        ClientMessage::AddList { name } => match state.repo.create(&name, &state.owner).await {
            Ok(list) => reply(&api, Created { id: list.id }),
            Err(e) => error_reply(&api, e),
        },
        ClientMessage::AddTodoItem { todo_list_id, text } => {
            let ops = vec![Operation::append(text)];
            run_batch(state, session, &api, &todo_list_id, ops).await
        }
        ClientMessage::ToggleTodoItemChecked {
            todo_list_id,
            id,
            checked,
        } => {
            let ops = vec![Operation::modify(id, ChangeSet::new().with_checked(checked))];
            run_batch(state, session, &api, &todo_list_id, ops).await
        }
        ClientMessage::MarkTodoItemsDone {
            todo_list_id,
            checked_todo_ids,
        } => {
            let ops = checked_todo_ids
                .into_iter()
                .map(|id| Operation::modify(id, ChangeSet::new().with_done(true)))
                .collect();
            run_batch(state, session, &api, &todo_list_id, ops).await
        }
        ClientMessage::DeleteTodoItems {
            todo_list_id,
            checked_todo_ids,
        } => {
            let ops = checked_todo_ids.into_iter().map(Operation::remove).collect();
            run_batch(state, session, &api, &todo_list_id, ops).await
        }
        ClientMessage::Sync(request) => {
            let result = state
                .engine
                .apply_wire(&request.list_id, request.ops)
                .await;
            finish_batch(state, session, &api, &request.list_id, result).await
        }
    }
}

async fn run_batch(
    state: &AppState,
    session: &Session,
    api: &str,
    list_id: &str,
    ops: Vec<Operation>,
) -> String {
    let result = state.engine.apply(list_id, ops).await;
    finish_batch(state, session, api, list_id, result).await
}

async fn finish_batch(
    state: &AppState,
    session: &Session,
    api: &str,
    list_id: &str,
    result: Result<Vec<Item>, SyncError>,
) -> String {
    // Earlier operations may have landed even when the batch failed part way
    if !matches!(result, Err(SyncError::NotFound { .. })) {
        state.hub.broadcast(list_id, session.id()).await;
    }

    match result {
        Ok(todos) => reply(api, Todos { todos }),
        Err(e) => {
            tracing::debug!(list_id, error = %e, "batch failed");
            error_reply(api, e)
        }
    }
}

/// Upgrades to a WebSocket session.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let mut session = Session::new(state.hub.next_session_id());
    let (mut sender, mut receiver) = socket.split();
    tracing::info!(session = session.id(), "Client connected");

    loop {
        let outgoing = tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => dispatch(&state, &mut session, text.as_str()).await,
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(session = session.id(), ?frame, "Client disconnected");
                    break;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    tracing::warn!(session = session.id(), "Client error: {}", e);
                    break;
                }
                None => break,
            },
            list_id = session.next_change() => match state.engine.read_items(&list_id).await {
                Ok(todos) => reply("listChanged", Changed { id: list_id, todos }),
                Err(e) => error_reply("listChanged", e),
            },
        };

        if sender.send(Message::Text(outgoing.into())).await.is_err() {
            break;
        }
    }

    tracing::debug!(session = session.id(), "Session closed");
}
