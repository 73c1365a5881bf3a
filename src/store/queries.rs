//! Read queries against chat.db

use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};

use super::body::{self, BODY_FUNCTION, FOLD_FUNCTION};
use super::schema::{StoreSchema, Table};
use crate::error::{IMessageError, Result};
use crate::types::*;

/// Separator for `group_concat` lists; never appears in handles
const LIST_SEPARATOR: char = '\u{1f}';

const MESSAGE_JOINS: &str = "FROM message m
    LEFT JOIN handle h ON h.ROWID = m.handle_id
    LEFT JOIN chat_message_join cmj ON cmj.message_id = m.ROWID
    LEFT JOIN chat c ON c.ROWID = cmj.chat_id";

fn message_columns(schema: &StoreSchema) -> String {
    format!(
        "m.ROWID AS id, m.guid AS guid,
         {body}(m.text, {attributed}) AS body,
         m.date AS date, m.is_from_me AS is_from_me, m.is_read AS is_read,
         {is_sent}, {is_delivered}, {has_attachments},
         {assoc_guid}, {assoc_type},
         h.id AS sender, c.chat_identifier AS chat_identifier,
         {chat_name}, {chat_style}",
        body = BODY_FUNCTION,
        attributed = schema.expr(Table::Message, "m", "attributedBody"),
        is_sent = schema.select(Table::Message, "m", "is_sent"),
        is_delivered = schema.select(Table::Message, "m", "is_delivered"),
        has_attachments =
            schema.select_as(Table::Message, "m", "cache_has_attachments", "has_attachments"),
        assoc_guid = schema.select(Table::Message, "m", "associated_message_guid"),
        assoc_type = schema.select(Table::Message, "m", "associated_message_type"),
        chat_name = schema.select_as(Table::Chat, "c", "display_name", "chat_name"),
        chat_style = schema.select_as(Table::Chat, "c", "style", "chat_style"),
    )
}

fn flag(row: &Row, column: &str) -> rusqlite::Result<bool> {
    Ok(row.get::<_, Option<i64>>(column)?.unwrap_or(0) != 0)
}

/// Parse a message from a database row.
///
/// Returns the message and whether its attachment list needs loading.
fn message_from_row(row: &Row) -> rusqlite::Result<(Message, bool)> {
    let chat_id: Option<String> = row.get("chat_identifier")?;
    let chat_style: Option<i64> = row.get("chat_style")?;
    let has_attachments: Option<i64> = row.get("has_attachments")?;
    let is_from_me = flag(row, "is_from_me")?;

    let is_group = chat_id
        .as_deref()
        .map(|id| ChatKind::from_store(chat_style, id) == ChatKind::Group)
        .unwrap_or(false);

    let reaction = Reaction::from_store(
        row.get("associated_message_type")?,
        row.get("associated_message_guid")?,
    );

    let message = Message {
        id: row.get("id")?,
        guid: row.get("guid")?,
        chat_id,
        chat_name: body::normalize(row.get("chat_name")?),
        sender: row.get("sender")?,
        text: row.get("body")?,
        timestamp: apple_to_datetime(row.get("date")?),
        direction: if is_from_me {
            Direction::Outbound
        } else {
            Direction::Inbound
        },
        is_read: flag(row, "is_read")?,
        is_sent: flag(row, "is_sent")?,
        is_delivered: flag(row, "is_delivered")?,
        is_group,
        attachment_ids: Vec::new(),
        reaction,
    };

    // Missing cache column means we cannot tell, so look it up
    Ok((message, has_attachments.map_or(true, |v| v != 0)))
}

fn query_messages(
    conn: &Connection,
    sql: &str,
    params: &[Box<dyn ToSql>],
) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(sql)?;
    let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), message_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut lookup = conn.prepare_cached(
        "SELECT attachment_id FROM message_attachment_join
         WHERE message_id = ? ORDER BY attachment_id",
    )?;

    let mut messages = Vec::with_capacity(rows.len());
    for (mut message, needs_attachments) in rows {
        if needs_attachments {
            message.attachment_ids = lookup
                .query_map([message.id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
        }
        messages.push(message);
    }
    Ok(messages)
}

/// Escape `%`, `_` and the escape character itself for a LIKE pattern
pub fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Fail with `NotFound` unless a chat with this identifier exists
pub fn ensure_chat(conn: &Connection, chat_id: &str) -> Result<()> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM chat WHERE chat_identifier = ?",
        [chat_id],
        |row| row.get(0),
    )?;
    if count == 0 {
        return Err(IMessageError::NotFound(format!("Chat not found: {}", chat_id)));
    }
    Ok(())
}

/// Guid of a chat addressed by identifier or guid, for use as an AppleScript `chat id`
pub fn get_chat_guid(conn: &Connection, chat_id: &str) -> Result<String> {
    conn.query_row(
        "SELECT guid FROM chat WHERE chat_identifier = ?1 OR guid = ?1
         ORDER BY (guid = ?1) DESC, ROWID DESC LIMIT 1",
        [chat_id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| IMessageError::NotFound(format!("Chat not found: {}", chat_id)))
}

/// Fail with `NotFound` unless a message with this id exists
pub fn ensure_message(conn: &Connection, message_id: MessageId) -> Result<()> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM message WHERE ROWID = ?",
        [message_id],
        |row| row.get(0),
    )?;
    if count == 0 {
        return Err(IMessageError::NotFound(format!(
            "Message not found: {}",
            message_id
        )));
    }
    Ok(())
}

/// Read messages matching the query.
///
/// Newest first unless `chronological`; `since` is strictly-after. A message
/// linked to several chats is returned once.
pub fn read_messages(
    conn: &Connection,
    schema: &StoreSchema,
    query: &MessageQuery,
) -> Result<Vec<Message>> {
    let mut conditions: Vec<String> = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(chat_id) = query.chat_id.as_deref() {
        ensure_chat(conn, chat_id)?;
        conditions.push("c.chat_identifier = ?".to_string());
        params.push(Box::new(chat_id.to_string()));
    }

    if let Some(since) = query.since {
        conditions.push("m.date > ?".to_string());
        params.push(Box::new(schema.date_scale.to_store(since)));
    }

    if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
        conditions.push(format!(
            "{}({}(m.text, {})) LIKE ? ESCAPE '\\'",
            FOLD_FUNCTION,
            BODY_FUNCTION,
            schema.expr(Table::Message, "m", "attributedBody")
        ));
        params.push(Box::new(format!(
            "%{}%",
            escape_like(&search.to_lowercase())
        )));
    }

    if query.unread_only {
        conditions.push("m.is_read = 0 AND m.is_from_me = 0".to_string());
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    let order = if query.chronological { "ASC" } else { "DESC" };

    let sql = format!(
        "SELECT {} {} {} GROUP BY m.ROWID ORDER BY m.date {order}, m.ROWID {order} LIMIT ?",
        message_columns(schema),
        MESSAGE_JOINS,
        where_clause,
        order = order,
    );
    params.push(Box::new(clamp_limit(query.limit)));

    query_messages(conn, &sql, &params)
}

/// Inbound messages not yet read, newest first
pub fn get_unread_messages(
    conn: &Connection,
    schema: &StoreSchema,
    limit: Option<i64>,
) -> Result<Vec<Message>> {
    read_messages(
        conn,
        schema,
        &MessageQuery {
            unread_only: true,
            limit,
            ..Default::default()
        },
    )
}

/// Messages with a rowid strictly greater than `after`, oldest first
pub fn messages_after(
    conn: &Connection,
    schema: &StoreSchema,
    after: MessageId,
    chat_id: Option<&str>,
    limit: Option<i64>,
) -> Result<Vec<Message>> {
    let mut params: Vec<Box<dyn ToSql>> = vec![Box::new(after)];
    let chat_condition = match chat_id {
        Some(chat_id) => {
            params.push(Box::new(chat_id.to_string()));
            "AND c.chat_identifier = ?"
        }
        None => "",
    };
    params.push(Box::new(clamp_limit(limit)));

    let sql = format!(
        "SELECT {} {} WHERE m.ROWID > ? {} GROUP BY m.ROWID ORDER BY m.ROWID ASC LIMIT ?",
        message_columns(schema),
        MESSAGE_JOINS,
        chat_condition,
    );

    query_messages(conn, &sql, &params)
}

/// Position of the newest message, or the zero cursor on an empty store
pub fn latest_cursor(conn: &Connection) -> Result<WatchCursor> {
    let row: Option<(i64, Option<i64>)> = conn
        .query_row(
            "SELECT ROWID, date FROM message ORDER BY ROWID DESC LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    Ok(match row {
        Some((message_id, date)) => WatchCursor {
            message_id,
            timestamp: apple_to_datetime(date),
        },
        None => WatchCursor::default(),
    })
}

/// List conversations, most recently active first
pub fn list_chats(conn: &Connection, schema: &StoreSchema, limit: Option<i64>) -> Result<Vec<Chat>> {
    let sql = format!(
        "SELECT c.ROWID AS id, c.chat_identifier AS chat_identifier,
                {display_name}, {service}, {style},
                (SELECT COUNT(*) FROM chat_message_join cmj
                 WHERE cmj.chat_id = c.ROWID) AS message_count,
                (SELECT MAX(m.date) FROM message m
                 JOIN chat_message_join cmj ON cmj.message_id = m.ROWID
                 WHERE cmj.chat_id = c.ROWID) AS last_message_date,
                (SELECT group_concat(h.id, char(31)) FROM chat_handle_join chj
                 JOIN handle h ON h.ROWID = chj.handle_id
                 WHERE chj.chat_id = c.ROWID) AS participants
         FROM chat c
         WHERE c.chat_identifier IS NOT NULL
         ORDER BY last_message_date DESC, c.ROWID DESC
         LIMIT ?",
        display_name = schema.select(Table::Chat, "c", "display_name"),
        service = schema.select(Table::Chat, "c", "service_name"),
        style = schema.select(Table::Chat, "c", "style"),
    );

    let mut stmt = conn.prepare(&sql)?;
    let chats = stmt
        .query_map([clamp_limit(limit)], |row| {
            let chat_id: String = row.get("chat_identifier")?;
            let participants: Option<String> = row.get("participants")?;
            let mut participants: Vec<String> = participants
                .map(|p| p.split(LIST_SEPARATOR).map(str::to_string).collect())
                .unwrap_or_default();
            participants.sort();
            participants.dedup();

            Ok(Chat {
                id: row.get("id")?,
                kind: ChatKind::from_store(row.get("style")?, &chat_id),
                chat_id,
                display_name: body::normalize(row.get("display_name")?),
                service: row.get("service_name")?,
                participants,
                message_count: row.get("message_count")?,
                last_message_at: apple_to_datetime(row.get("last_message_date")?),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(chats)
}

/// Handles taking part in a chat
pub fn get_chat_participants(
    conn: &Connection,
    schema: &StoreSchema,
    chat_id: &str,
) -> Result<Vec<Participant>> {
    ensure_chat(conn, chat_id)?;

    let sql = format!(
        "SELECT DISTINCT h.id AS handle, {service}
         FROM handle h
         JOIN chat_handle_join chj ON h.ROWID = chj.handle_id
         JOIN chat c ON c.ROWID = chj.chat_id
         WHERE c.chat_identifier = ?
         ORDER BY h.id",
        service = schema.select(Table::Handle, "h", "service"),
    );

    let mut stmt = conn.prepare(&sql)?;
    let participants = stmt
        .query_map([chat_id], |row| {
            Ok(Participant {
                handle: row.get("handle")?,
                service: row.get("service")?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(participants)
}

fn attachment_select(schema: &StoreSchema) -> String {
    format!(
        "SELECT a.ROWID AS id, {guid}, maj.message_id AS message_id, a.filename AS filename,
                {mime_type}, {uti}, {transfer_name}, {total_bytes}, {transfer_state}
         FROM attachment a
         JOIN message_attachment_join maj ON a.ROWID = maj.attachment_id",
        guid = schema.select(Table::Attachment, "a", "guid"),
        mime_type = schema.select(Table::Attachment, "a", "mime_type"),
        uti = schema.select(Table::Attachment, "a", "uti"),
        transfer_name = schema.select(Table::Attachment, "a", "transfer_name"),
        total_bytes = schema.select(Table::Attachment, "a", "total_bytes"),
        transfer_state = schema.select(Table::Attachment, "a", "transfer_state"),
    )
}

fn attachment_from_row(row: &Row) -> rusqlite::Result<Attachment> {
    let filename: Option<String> = row.get("filename")?;
    Ok(Attachment {
        id: row.get("id")?,
        guid: row.get("guid")?,
        message_id: row.get("message_id")?,
        path: filename.map(|f| shellexpand::tilde(&f).into_owned()),
        mime_type: row.get("mime_type")?,
        uti: row.get("uti")?,
        transfer_name: row.get("transfer_name")?,
        size_bytes: row.get("total_bytes")?,
        transfer_status: TransferStatus::from_store(row.get("transfer_state")?),
    })
}

/// Attachments of one message
pub fn get_attachments(
    conn: &Connection,
    schema: &StoreSchema,
    message_id: MessageId,
) -> Result<Vec<Attachment>> {
    ensure_message(conn, message_id)?;

    let sql = format!(
        "{} WHERE maj.message_id = ? ORDER BY a.ROWID",
        attachment_select(schema)
    );
    let mut stmt = conn.prepare(&sql)?;
    let attachments = stmt
        .query_map(params![message_id], attachment_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(attachments)
}

/// A single attachment by id
pub fn get_attachment(
    conn: &Connection,
    schema: &StoreSchema,
    attachment_id: AttachmentId,
) -> Result<Attachment> {
    let sql = format!("{} WHERE a.ROWID = ? LIMIT 1", attachment_select(schema));
    conn.query_row(&sql, params![attachment_id], attachment_from_row)
        .optional()?
        .ok_or_else(|| IMessageError::NotFound(format!("Attachment not found: {}", attachment_id)))
}
