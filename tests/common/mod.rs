//! Shared fixtures for integration tests: a throwaway chat.db on disk

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::{params, Connection};
use tempfile::TempDir;

use imessage_mcp::automation::{ScriptFailure, ScriptRunner, SendDispatcher};
use imessage_mcp::contacts::AppleScriptContacts;
use imessage_mcp::mcp::IMessageHandler;
use imessage_mcp::store::Store;
use imessage_mcp::types::{AutomationConfig, StoreConfig};

pub const SCHEMA: &str = include_str!("../fixtures/chat_schema.sql");

/// Chat ids seeded by [`FixtureDb::seeded`]
pub const ALICE: &str = "+15550001";
pub const GROUP: &str = "chat42";
pub const GROUP_GUID: &str = "iMessage;+;chat42";

/// Seconds after the Apple epoch, stored as nanoseconds
pub fn ns(secs: i64) -> i64 {
    secs * 1_000_000_000
}

/// A chat.db file in a temporary directory plus a writer connection
pub struct FixtureDb {
    pub dir: TempDir,
    pub path: PathBuf,
    pub writer: Connection,
}

impl FixtureDb {
    /// Empty database with the full schema
    pub fn empty() -> Self {
        Self::with_schema(SCHEMA)
    }

    pub fn with_schema(schema: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");
        let writer = Connection::open(&path).unwrap();
        writer.execute_batch(schema).unwrap();
        Self { dir, path, writer }
    }

    /// Two chats: Alice one-to-one ("hi" at t=100, "there" at t=200) and a
    /// group with Alice and Bob
    pub fn seeded() -> Self {
        let db = Self::empty();
        db.writer
            .execute_batch(
                r#"
                INSERT INTO handle (ROWID, id, service) VALUES
                    (1, '+15550001', 'iMessage'),
                    (2, 'bob@example.com', 'iMessage');
                INSERT INTO chat (ROWID, guid, style, chat_identifier, service_name, display_name) VALUES
                    (1, 'iMessage;-;+15550001', 45, '+15550001', 'iMessage', ''),
                    (2, 'iMessage;+;chat42', 43, 'chat42', 'iMessage', 'Climbing');
                INSERT INTO chat_handle_join (chat_id, handle_id) VALUES (1, 1), (2, 1), (2, 2);
                "#,
            )
            .unwrap();
        db.insert_message(1, 1, 1, Some("hi"), 100, false, true);
        db.insert_message(2, 1, 1, Some("there"), 200, false, false);
        db
    }

    /// Insert a message linked to `chat`; timestamps are Apple-epoch seconds
    #[allow(clippy::too_many_arguments)]
    pub fn insert_message(
        &self,
        id: i64,
        chat: i64,
        handle: i64,
        text: Option<&str>,
        at_secs: i64,
        from_me: bool,
        read: bool,
    ) {
        self.writer
            .execute(
                "INSERT INTO message (ROWID, guid, text, handle_id, date, is_from_me, is_read, is_sent, is_delivered)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, 1)",
                params![id, format!("msg-{}", id), text, handle, ns(at_secs), from_me, read],
            )
            .unwrap();
        self.writer
            .execute(
                "INSERT INTO chat_message_join (chat_id, message_id, message_date) VALUES (?1, ?2, ?3)",
                params![chat, id, ns(at_secs)],
            )
            .unwrap();
    }

    /// Attach a file on disk to a message
    pub fn insert_attachment(&self, id: i64, message_id: i64, filename: &str, mime: &str) {
        self.writer
            .execute(
                "INSERT INTO attachment (ROWID, guid, filename, mime_type, transfer_state, transfer_name, total_bytes)
                 VALUES (?1, ?2, ?3, ?4, 5, ?5, 0)",
                params![id, format!("att-{}", id), filename, mime, filename.rsplit('/').next()],
            )
            .unwrap();
        self.writer
            .execute(
                "INSERT INTO message_attachment_join (message_id, attachment_id) VALUES (?1, ?2)",
                params![message_id, id],
            )
            .unwrap();
        self.writer
            .execute(
                "UPDATE message SET cache_has_attachments = 1 WHERE ROWID = ?1",
                params![message_id],
            )
            .unwrap();
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            db_path: self.path.clone(),
            ..Default::default()
        }
    }

    pub fn store(&self) -> Store {
        Store::new(self.store_config())
    }
}

/// Script runner that answers the app-running probe and records every script
#[derive(Default)]
pub struct RecordingRunner {
    pub not_running: bool,
    pub stdout: String,
    pub fail_with: Option<String>,
    pub scripts: parking_lot::Mutex<Vec<String>>,
}

impl ScriptRunner for RecordingRunner {
    fn run(&self, script: &str) -> Result<String, ScriptFailure> {
        self.scripts.lock().push(script.to_string());
        if script.contains("System Events") {
            return Ok((!self.not_running).to_string());
        }
        match &self.fail_with {
            Some(stderr) => Err(ScriptFailure::Exit {
                code: Some(1),
                stderr: stderr.clone(),
            }),
            None => Ok(self.stdout.clone()),
        }
    }
}

/// Handler over the fixture database with a recording script runner
pub fn handler(db: &FixtureDb, runner: Arc<RecordingRunner>) -> IMessageHandler {
    let sender = SendDispatcher::with_runner(AutomationConfig::default(), runner.clone());
    let contacts = Arc::new(AppleScriptContacts::with_runner(runner));
    IMessageHandler::with_components(db.store(), sender, contacts)
}
