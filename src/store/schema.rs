//! Schema introspection for chat.db
//!
//! The database belongs to Messages.app and its layout shifts between macOS
//! releases. Columns are discovered once per connection so queries can select
//! `NULL` for optional columns that a given store does not carry.

use std::collections::HashSet;

use rusqlite::{Connection, OptionalExtension};

use crate::error::{IMessageError, Result};
use crate::types::DateScale;

/// Tables read by this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Message,
    Chat,
    Handle,
    Attachment,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Message => "message",
            Table::Chat => "chat",
            Table::Handle => "handle",
            Table::Attachment => "attachment",
        }
    }
}

/// Join tables that must exist for any query to work
const JOIN_TABLES: &[&str] = &[
    "chat_message_join",
    "chat_handle_join",
    "message_attachment_join",
];

const REQUIRED_COLUMNS: &[(Table, &[&str])] = &[
    (
        Table::Message,
        &["guid", "text", "date", "is_from_me", "is_read", "handle_id"],
    ),
    (Table::Chat, &["chat_identifier"]),
    (Table::Handle, &["id"]),
    (Table::Attachment, &["filename"]),
];

/// Column sets of the store, as seen by one connection
#[derive(Debug, Clone)]
pub struct StoreSchema {
    message: HashSet<String>,
    chat: HashSet<String>,
    handle: HashSet<String>,
    attachment: HashSet<String>,
    /// Unit of `message.date`
    pub date_scale: DateScale,
}

impl StoreSchema {
    /// Read the table layout and validate the columns every query needs
    pub fn introspect(conn: &Connection) -> Result<Self> {
        for table in JOIN_TABLES {
            if !table_exists(conn, table)? {
                return Err(IMessageError::Unavailable(format!(
                    "Messages database has no {} table; unsupported schema",
                    table
                )));
            }
        }

        let schema = Self {
            message: table_columns(conn, Table::Message)?,
            chat: table_columns(conn, Table::Chat)?,
            handle: table_columns(conn, Table::Handle)?,
            attachment: table_columns(conn, Table::Attachment)?,
            date_scale: DateScale::default(),
        };

        for (table, columns) in REQUIRED_COLUMNS {
            for column in *columns {
                if !schema.has(*table, column) {
                    return Err(IMessageError::Unavailable(format!(
                        "Messages database column {}.{} is missing; unsupported schema",
                        table.name(),
                        column
                    )));
                }
            }
        }

        let sample: Option<i64> = conn
            .query_row(
                "SELECT date FROM message WHERE date != 0 ORDER BY ROWID DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        Ok(Self {
            date_scale: DateScale::detect(sample),
            ..schema
        })
    }

    fn columns(&self, table: Table) -> &HashSet<String> {
        match table {
            Table::Message => &self.message,
            Table::Chat => &self.chat,
            Table::Handle => &self.handle,
            Table::Attachment => &self.attachment,
        }
    }

    /// Whether `table` carries `column` (case-insensitive, like SQLite)
    pub fn has(&self, table: Table, column: &str) -> bool {
        self.columns(table).contains(&column.to_ascii_lowercase())
    }

    /// Select expression for a possibly-missing column, always aliased to
    /// `column` so row mapping can read it by name
    pub fn select(&self, table: Table, alias: &str, column: &str) -> String {
        self.select_as(table, alias, column, column)
    }

    /// Like [`select`](Self::select) with an explicit result name
    pub fn select_as(&self, table: Table, alias: &str, column: &str, name: &str) -> String {
        if self.has(table, column) {
            format!("{}.{} AS {}", alias, column, name)
        } else {
            format!("NULL AS {}", name)
        }
    }

    /// Column reference or `NULL` literal, without an alias
    pub fn expr(&self, table: Table, alias: &str, column: &str) -> String {
        if self.has(table, column) {
            format!("{}.{}", alias, column)
        } else {
            "NULL".to_string()
        }
    }
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn table_columns(conn: &Connection, table: Table) -> Result<HashSet<String>> {
    if !table_exists(conn, table.name())? {
        return Err(IMessageError::Unavailable(format!(
            "Messages database has no {} table; unsupported schema",
            table.name()
        )));
    }

    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table.name()))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>("name"))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(columns
        .into_iter()
        .map(|c| c.to_ascii_lowercase())
        .collect())
}
