//! Tool facade: maps MCP tool calls onto the store, watch, send and contact
//! components and turns their errors into `{"error": {"kind", "message"}}`
//! tool results.

use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::protocol::{
    methods, InitializeResult, McpHandler, McpRequest, McpResponse, ToolCallResult,
};
use super::tools::get_tool_definitions;
use crate::automation::{
    validate_chat_id, validate_file, validate_text, SendDispatcher, SendRequest, SendTarget,
};
use crate::contacts::{AppleScriptContacts, ContactResolver};
use crate::error::{ErrorKind, IMessageError, Result};
use crate::store::{export, queries, Store};
use crate::types::{
    parse_since, AttachmentId, AutomationConfig, MessageId, MessageQuery, Service, StatusReport,
    StoreConfig,
};
use crate::watch::{WatchParams, WatchRegistry};

#[derive(Debug, Default, Deserialize)]
struct ReadMessagesParams {
    chat_id: Option<String>,
    search: Option<String>,
    since: Option<String>,
    #[serde(default)]
    chronological: bool,
    #[serde(default)]
    unread_only: bool,
    limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct LimitParams {
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ChatParams {
    chat_id: String,
}

#[derive(Debug, Deserialize)]
struct MessageParams {
    message_id: MessageId,
}

#[derive(Debug, Deserialize)]
struct DownloadParams {
    attachment_id: AttachmentId,
    destination_path: String,
}

#[derive(Debug, Deserialize)]
struct SendTextParams {
    destination: String,
    text: String,
    service: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GroupTextParams {
    chat_id: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct SendFileParams {
    destination: String,
    file_path: String,
    text: Option<String>,
    service: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GroupFileParams {
    chat_id: String,
    file_path: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContactParams {
    name: String,
}

#[derive(Debug, Deserialize)]
struct CheckParams {
    session_id: String,
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SessionParams {
    session_id: String,
}

/// Deserialize tool arguments; `null` counts as an empty object
fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params)
        .map_err(|e| IMessageError::InvalidArgument(format!("Invalid arguments: {}", e)))
}

fn parse_service(service: Option<&str>) -> Result<Option<Service>> {
    service
        .map(|s| s.parse::<Service>().map_err(IMessageError::InvalidArgument))
        .transpose()
}

/// MCP handler for the iMessage tools
#[derive(Clone)]
pub struct IMessageHandler {
    store: Store,
    watches: Arc<WatchRegistry>,
    sender: SendDispatcher,
    contacts: Arc<dyn ContactResolver>,
}

impl IMessageHandler {
    /// Handler wired to the real database and osascript
    pub fn new(store_config: StoreConfig, automation: AutomationConfig) -> Self {
        let contacts = Arc::new(AppleScriptContacts::new(automation.osascript.clone()));
        Self::with_components(
            Store::new(store_config),
            SendDispatcher::new(automation),
            contacts,
        )
    }

    pub fn with_components(
        store: Store,
        sender: SendDispatcher,
        contacts: Arc<dyn ContactResolver>,
    ) -> Self {
        Self {
            store,
            watches: Arc::new(WatchRegistry::new()),
            sender,
            contacts,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn watches(&self) -> &WatchRegistry {
        &self.watches
    }

    /// Dispatch a tool call by name
    pub fn handle_tool_call(&self, name: &str, params: Value) -> ToolCallResult {
        let start = Instant::now();
        let result = match name {
            "check_status" => self.tool_check_status(params),
            "read_messages" => self.tool_read_messages(params),
            "list_chats" => self.tool_list_chats(params),
            "get_chat_participants" => self.tool_get_chat_participants(params),
            "get_unread_messages" => self.tool_get_unread_messages(params),
            "get_attachments" => self.tool_get_attachments(params),
            "download_attachment" => self.tool_download_attachment(params),
            "send_imessage" => self.tool_send_imessage(params),
            "send_to_group" => self.tool_send_to_group(params),
            "send_file" => self.tool_send_file(params),
            "send_file_to_group" => self.tool_send_file_to_group(params),
            "lookup_contact" => self.tool_lookup_contact(params),
            "start_watching" => self.tool_start_watching(params),
            "check_new_messages" => self.tool_check_new_messages(params),
            "stop_watching" => self.tool_stop_watching(params),
            _ => {
                return ToolCallResult::kind_error(
                    ErrorKind::InvalidArgument,
                    format!("Unknown tool: {}", name),
                )
            }
        };

        debug!(
            tool = name,
            elapsed_ms = start.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "Tool call finished"
        );

        match result {
            Ok(value) => ToolCallResult::json(&value),
            Err(err) => {
                warn!(tool = name, kind = %err.kind(), "Tool call failed: {}", err);
                ToolCallResult::from_error(&err)
            }
        }
    }

    /// Readiness of the database and Messages.app
    pub fn status(&self) -> StatusReport {
        let mut errors = Vec::new();

        let database_accessible = match self.store.probe() {
            Ok(()) => true,
            Err(e) => {
                errors.push(e.to_string());
                false
            }
        };

        let messages_app_running = match self.sender.is_app_running() {
            Ok(running) => running,
            Err(e) => {
                errors.push(e.to_string());
                false
            }
        };

        StatusReport {
            platform: std::env::consts::OS.to_string(),
            database_path: self.store.db_path().display().to_string(),
            database_accessible,
            messages_app_running,
            ready: database_accessible && messages_app_running,
            active_watch_sessions: self.watches.active_count(),
            errors,
        }
    }

    fn tool_check_status(&self, _params: Value) -> Result<Value> {
        Ok(json!(self.status()))
    }

    fn tool_read_messages(&self, params: Value) -> Result<Value> {
        let params: ReadMessagesParams = parse_params(params)?;
        let since = params.since.as_deref().map(parse_since).transpose()?;
        let query = MessageQuery {
            chat_id: params.chat_id,
            search: params.search.filter(|s| !s.is_empty()),
            since,
            chronological: params.chronological,
            unread_only: params.unread_only,
            limit: params.limit,
        };

        let messages = self
            .store
            .with_connection(|conn, schema| queries::read_messages(conn, schema, &query))?;
        Ok(json!({"count": messages.len(), "messages": messages}))
    }

    fn tool_list_chats(&self, params: Value) -> Result<Value> {
        let params: LimitParams = parse_params(params)?;
        let chats = self
            .store
            .with_connection(|conn, schema| queries::list_chats(conn, schema, params.limit))?;
        Ok(json!({"count": chats.len(), "chats": chats}))
    }

    fn tool_get_chat_participants(&self, params: Value) -> Result<Value> {
        let params: ChatParams = parse_params(params)?;
        let chat_id = validate_chat_id(&params.chat_id)?;
        let participants = self.store.with_connection(|conn, schema| {
            queries::get_chat_participants(conn, schema, &chat_id)
        })?;
        Ok(json!({
            "chat_id": chat_id,
            "count": participants.len(),
            "participants": participants,
        }))
    }

    fn tool_get_unread_messages(&self, params: Value) -> Result<Value> {
        let params: LimitParams = parse_params(params)?;
        let messages = self.store.with_connection(|conn, schema| {
            queries::get_unread_messages(conn, schema, params.limit)
        })?;
        Ok(json!({"count": messages.len(), "messages": messages}))
    }

    fn tool_get_attachments(&self, params: Value) -> Result<Value> {
        let params: MessageParams = parse_params(params)?;
        let attachments = self.store.with_connection(|conn, schema| {
            queries::get_attachments(conn, schema, params.message_id)
        })?;
        Ok(json!({
            "message_id": params.message_id,
            "count": attachments.len(),
            "attachments": attachments,
        }))
    }

    fn tool_download_attachment(&self, params: Value) -> Result<Value> {
        let params: DownloadParams = parse_params(params)?;
        let destination = export::destination_path(&params.destination_path)?;

        let attachment = self.store.with_connection(|conn, schema| {
            queries::get_attachment(conn, schema, params.attachment_id)
        })?;
        let (source, bytes) = export::copy_attachment(&attachment, &destination)?;

        Ok(json!({
            "success": true,
            "attachment_id": params.attachment_id,
            "source": source,
            "destination": destination,
            "bytes": bytes,
            "mime_type": attachment.mime_type,
        }))
    }

    fn resolve_chat(&self, chat_id: &str) -> Result<String> {
        let chat_id = validate_chat_id(chat_id)?;
        self.store.chat_send_target(&chat_id)
    }

    fn tool_send_imessage(&self, params: Value) -> Result<Value> {
        let params: SendTextParams = parse_params(params)?;
        let service = parse_service(params.service.as_deref())?;
        let request = SendRequest::text(SendTarget::Buddy(params.destination), params.text)
            .with_service(service);
        Ok(json!(self.sender.send(&request)?))
    }

    fn tool_send_to_group(&self, params: Value) -> Result<Value> {
        let params: GroupTextParams = parse_params(params)?;
        validate_text(&params.text)?;
        let chat = self.resolve_chat(&params.chat_id)?;
        let request = SendRequest::text(SendTarget::Chat(chat), params.text);
        Ok(json!(self.sender.send(&request)?))
    }

    fn tool_send_file(&self, params: Value) -> Result<Value> {
        let params: SendFileParams = parse_params(params)?;
        let service = parse_service(params.service.as_deref())?;
        let request = SendRequest::file(
            SendTarget::Buddy(params.destination),
            params.file_path,
            params.text,
        )
        .with_service(service);
        Ok(json!(self.sender.send(&request)?))
    }

    fn tool_send_file_to_group(&self, params: Value) -> Result<Value> {
        let params: GroupFileParams = parse_params(params)?;
        validate_file(&params.file_path)?;
        let chat = self.resolve_chat(&params.chat_id)?;
        let request = SendRequest::file(SendTarget::Chat(chat), params.file_path, params.text);
        Ok(json!(self.sender.send(&request)?))
    }

    fn tool_lookup_contact(&self, params: Value) -> Result<Value> {
        let params: ContactParams = parse_params(params)?;
        let contacts = self.contacts.lookup(&params.name)?;
        Ok(json!({
            "query": params.name,
            "count": contacts.len(),
            "contacts": contacts,
        }))
    }

    fn tool_start_watching(&self, params: Value) -> Result<Value> {
        let params: WatchParams = parse_params(params)?;
        let session = self.watches.start(&self.store, params)?;
        Ok(json!(session))
    }

    fn tool_check_new_messages(&self, params: Value) -> Result<Value> {
        let params: CheckParams = parse_params(params)?;
        let result = self
            .watches
            .check(&self.store, &params.session_id, params.limit)?;
        Ok(json!(result))
    }

    fn tool_stop_watching(&self, params: Value) -> Result<Value> {
        let params: SessionParams = parse_params(params)?;
        let session = self.watches.stop(&params.session_id)?;
        Ok(json!(session))
    }
}

impl McpHandler for IMessageHandler {
    fn handle_request(&self, request: McpRequest) -> McpResponse {
        match request.method.as_str() {
            methods::INITIALIZE => {
                let result = InitializeResult::default();
                McpResponse::success(request.id, json!(result))
            }
            methods::INITIALIZED => {
                // Notification, the transport drops the response
                McpResponse::success(request.id, json!({}))
            }
            methods::PING => McpResponse::success(request.id, json!({})),
            methods::LIST_TOOLS => {
                let tools = get_tool_definitions();
                McpResponse::success(request.id, json!({"tools": tools}))
            }
            methods::CALL_TOOL => {
                let name = match request.params.get("name").and_then(|v| v.as_str()) {
                    Some(name) => name,
                    None => {
                        return McpResponse::from_error(
                            request.id,
                            IMessageError::InvalidArgument(
                                "tools/call requires a string `name`".to_string(),
                            ),
                        )
                    }
                };
                let arguments = request
                    .params
                    .get("arguments")
                    .cloned()
                    .unwrap_or(json!({}));

                let tool_result = self.handle_tool_call(name, arguments);
                McpResponse::success(request.id, json!(tool_result))
            }
            _ => McpResponse::error(
                request.id,
                -32601,
                format!("Method not found: {}", request.method),
            ),
        }
    }
}
