//! MCP tool definitions for imessage-mcp

use serde_json::json;

use super::protocol::ToolDefinition;

/// All tool definitions, as (name, description, input schema)
pub const TOOL_DEFINITIONS: &[(&str, &str, &str)] = &[
    // Status
    (
        "check_status",
        "Check whether Messages.app is running and the message database is readable",
        r#"{
            "type": "object",
            "properties": {}
        }"#,
    ),
    // Reading
    (
        "read_messages",
        "Read iMessage/SMS messages with optional filters. Use chronological=true for conversation threads.",
        r#"{
            "type": "object",
            "properties": {
                "chat_id": {"type": "string", "description": "Restrict to one chat (chat_identifier from list_chats)"},
                "search": {"type": "string", "description": "Case-insensitive substring of the message text"},
                "since": {"type": "string", "description": "Only messages strictly after this time (ISO 8601)"},
                "chronological": {"type": "boolean", "default": false, "description": "Oldest first instead of newest first"},
                "unread_only": {"type": "boolean", "default": false, "description": "Only unread incoming messages"},
                "limit": {"type": "integer", "minimum": 1, "maximum": 1000, "default": 50}
            }
        }"#,
    ),
    (
        "list_chats",
        "List conversations, most recently active first",
        r#"{
            "type": "object",
            "properties": {
                "limit": {"type": "integer", "minimum": 1, "maximum": 1000, "default": 50}
            }
        }"#,
    ),
    (
        "get_chat_participants",
        "List the handles taking part in a chat",
        r#"{
            "type": "object",
            "properties": {
                "chat_id": {"type": "string", "description": "chat_identifier from list_chats"}
            },
            "required": ["chat_id"]
        }"#,
    ),
    (
        "get_unread_messages",
        "Get unread incoming messages, newest first. Does not mark them as read.",
        r#"{
            "type": "object",
            "properties": {
                "limit": {"type": "integer", "minimum": 1, "maximum": 1000, "default": 50}
            }
        }"#,
    ),
    // Attachments
    (
        "get_attachments",
        "List attachments of a message",
        r#"{
            "type": "object",
            "properties": {
                "message_id": {"type": "integer", "description": "Message ID"}
            },
            "required": ["message_id"]
        }"#,
    ),
    (
        "download_attachment",
        "Copy an attachment file to a local path. Never overwrites an existing file.",
        r#"{
            "type": "object",
            "properties": {
                "attachment_id": {"type": "integer", "description": "Attachment ID"},
                "destination_path": {"type": "string", "description": "Absolute file path to write to (~ is expanded)"}
            },
            "required": ["attachment_id", "destination_path"]
        }"#,
    ),
    // Sending
    (
        "send_imessage",
        "Send a text message to a phone number or email address",
        r#"{
            "type": "object",
            "properties": {
                "destination": {"type": "string", "description": "Phone number (e.g. +14155551234) or email"},
                "text": {"type": "string", "description": "Message text"},
                "service": {"type": "string", "enum": ["imessage", "sms"], "default": "imessage"}
            },
            "required": ["destination", "text"]
        }"#,
    ),
    (
        "send_to_group",
        "Send a text message to an existing group chat",
        r#"{
            "type": "object",
            "properties": {
                "chat_id": {"type": "string", "description": "chat_identifier or guid of the group"},
                "text": {"type": "string", "description": "Message text"}
            },
            "required": ["chat_id", "text"]
        }"#,
    ),
    (
        "send_file",
        "Send a file to a phone number or email address, with an optional caption",
        r#"{
            "type": "object",
            "properties": {
                "destination": {"type": "string", "description": "Phone number or email"},
                "file_path": {"type": "string", "description": "Absolute path of the file to send"},
                "text": {"type": "string", "description": "Optional caption sent before the file"},
                "service": {"type": "string", "enum": ["imessage", "sms"], "default": "imessage"}
            },
            "required": ["destination", "file_path"]
        }"#,
    ),
    (
        "send_file_to_group",
        "Send a file to an existing group chat, with an optional caption",
        r#"{
            "type": "object",
            "properties": {
                "chat_id": {"type": "string", "description": "chat_identifier or guid of the group"},
                "file_path": {"type": "string", "description": "Absolute path of the file to send"},
                "text": {"type": "string", "description": "Optional caption sent before the file"}
            },
            "required": ["chat_id", "file_path"]
        }"#,
    ),
    // Contacts
    (
        "lookup_contact",
        "Find contacts whose name contains the query, with their phones and emails",
        r#"{
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "First, last or full name"}
            },
            "required": ["name"]
        }"#,
    ),
    // Watching
    (
        "start_watching",
        "Start a watch session. Later checks return only messages that arrive after this call.",
        r#"{
            "type": "object",
            "properties": {
                "owner": {"type": "string", "description": "Label for the caller that owns the session"},
                "chat_id": {"type": "string", "description": "Only watch this chat (chat_identifier)"}
            }
        }"#,
    ),
    (
        "check_new_messages",
        "Return messages that arrived since the last check of a watch session and advance its cursor",
        r#"{
            "type": "object",
            "properties": {
                "session_id": {"type": "string", "description": "ID returned by start_watching"},
                "limit": {"type": "integer", "minimum": 1, "maximum": 1000, "default": 50}
            },
            "required": ["session_id"]
        }"#,
    ),
    (
        "stop_watching",
        "Stop a watch session",
        r#"{
            "type": "object",
            "properties": {
                "session_id": {"type": "string", "description": "ID returned by start_watching"}
            },
            "required": ["session_id"]
        }"#,
    ),
];

/// Get all tool definitions as ToolDefinition structs
pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    TOOL_DEFINITIONS
        .iter()
        .map(|(name, description, schema)| ToolDefinition {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: serde_json::from_str(schema).unwrap_or(json!({})),
        })
        .collect()
}
