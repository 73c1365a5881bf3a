//! Watch sessions: cursor-based polling for new messages
//!
//! Each session remembers the last message it delivered. A check returns the
//! rows after that cursor and advances it to the highest id returned. The
//! cursor read-modify-write runs under the session's own lock, so two racing
//! checks on one session can never both start from the same stale cursor.
//!
//! Sessions live in memory only and are gone after a restart.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{IMessageError, Result};
use crate::store::{queries, Store};
use crate::types::{Message, MessageId, WatchCursor};

/// Source of new messages for watch sessions
pub trait MessageFeed: Send + Sync {
    /// Position of the newest message in the store
    fn latest_cursor(&self) -> Result<WatchCursor>;

    /// Messages with id strictly greater than `after`, ascending by id
    fn messages_after(
        &self,
        after: MessageId,
        chat_id: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<Message>>;

    /// Fail with `NotFound` unless the chat exists
    fn ensure_chat(&self, chat_id: &str) -> Result<()>;
}

impl MessageFeed for Store {
    fn latest_cursor(&self) -> Result<WatchCursor> {
        self.with_connection(|conn, _| queries::latest_cursor(conn))
    }

    fn messages_after(
        &self,
        after: MessageId,
        chat_id: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<Message>> {
        self.with_connection(|conn, schema| {
            queries::messages_after(conn, schema, after, chat_id, limit)
        })
    }

    fn ensure_chat(&self, chat_id: &str) -> Result<()> {
        self.with_connection(|conn, _| queries::ensure_chat(conn, chat_id))
    }
}

/// Parameters for starting a session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchParams {
    /// Free-form label of the caller that owns the session
    pub owner: Option<String>,
    /// Restrict the session to one chat
    pub chat_id: Option<String>,
}

/// Snapshot of a watch session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchSession {
    pub id: String,
    pub owner: Option<String>,
    pub chat_id: Option<String>,
    pub cursor: WatchCursor,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Total messages delivered by this session
    pub delivered: u64,
}

/// Outcome of a check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub session_id: String,
    pub count: usize,
    pub messages: Vec<Message>,
    pub cursor: WatchCursor,
}

/// Table of watch sessions
#[derive(Default)]
pub struct WatchRegistry {
    sessions: DashMap<String, Arc<Mutex<WatchSession>>>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session whose cursor is the newest message right now
    pub fn start(&self, feed: &dyn MessageFeed, params: WatchParams) -> Result<WatchSession> {
        if let Some(chat_id) = params.chat_id.as_deref() {
            feed.ensure_chat(chat_id)?;
        }
        let cursor = feed.latest_cursor()?;

        let session = WatchSession {
            id: Uuid::new_v4().to_string(),
            owner: params.owner,
            chat_id: params.chat_id,
            cursor,
            active: true,
            created_at: Utc::now(),
            last_checked_at: None,
            delivered: 0,
        };

        tracing::info!(
            "Watch session {} started at message {}",
            session.id,
            cursor.message_id
        );
        self.sessions
            .insert(session.id.clone(), Arc::new(Mutex::new(session.clone())));
        Ok(session)
    }

    fn session(&self, session_id: &str) -> Result<Arc<Mutex<WatchSession>>> {
        // Clone the Arc so the map shard is not held across the store read
        self.sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                IMessageError::InvalidState(format!(
                    "Unknown watch session: {}. Call start_watching first.",
                    session_id
                ))
            })
    }

    /// Return messages newer than the session cursor and advance it
    pub fn check(
        &self,
        feed: &dyn MessageFeed,
        session_id: &str,
        limit: Option<i64>,
    ) -> Result<CheckResult> {
        let session = self.session(session_id)?;
        let mut session = session.lock();

        if !session.active {
            return Err(IMessageError::InvalidState(format!(
                "Watch session {} is stopped",
                session_id
            )));
        }

        let before = session.cursor;
        let messages: Vec<Message> = feed
            .messages_after(before.message_id, session.chat_id.as_deref(), limit)?
            .into_iter()
            .filter(|m| m.id > before.message_id)
            .collect();

        if let Some(newest) = messages.iter().max_by_key(|m| m.id) {
            session.cursor = WatchCursor {
                message_id: newest.id,
                timestamp: newest.timestamp.max(before.timestamp),
            };
        }
        session.last_checked_at = Some(Utc::now());
        session.delivered += messages.len() as u64;

        if !messages.is_empty() {
            tracing::debug!(
                "Watch session {} delivered {} message(s), cursor {} -> {}",
                session_id,
                messages.len(),
                before.message_id,
                session.cursor.message_id
            );
        }

        Ok(CheckResult {
            session_id: session.id.clone(),
            count: messages.len(),
            messages,
            cursor: session.cursor,
        })
    }

    /// Stop a session and drop it from the table
    ///
    /// A check racing with the stop may still hold the session; it sees
    /// `active == false` and fails with `InvalidState`.
    pub fn stop(&self, session_id: &str) -> Result<WatchSession> {
        let handle = self.session(session_id)?;
        let mut session = handle.lock();

        if !session.active {
            return Err(IMessageError::InvalidState(format!(
                "Watch session {} is already stopped",
                session_id
            )));
        }
        session.active = false;
        self.sessions.remove(session_id);

        tracing::info!("Watch session {} stopped", session_id);
        Ok(session.clone())
    }

    /// Snapshot of one session
    pub fn get(&self, session_id: &str) -> Result<WatchSession> {
        Ok(self.session(session_id)?.lock().clone())
    }

    /// Snapshot of all sessions, oldest first
    pub fn list(&self) -> Vec<WatchSession> {
        let handles: Vec<_> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        let mut sessions: Vec<WatchSession> = handles.iter().map(|s| s.lock().clone()).collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    /// Number of sessions still active
    pub fn active_count(&self) -> usize {
        self.list().iter().filter(|s| s.active).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Direction;

    #[derive(Default)]
    struct FakeFeed {
        messages: Mutex<Vec<Message>>,
    }

    impl FakeFeed {
        fn push(&self, id: MessageId, chat: &str) {
            self.messages.lock().push(Message {
                id,
                guid: Some(format!("g{}", id)),
                chat_id: Some(chat.to_string()),
                chat_name: None,
                sender: Some("+15550001".into()),
                text: Some(format!("message {}", id)),
                timestamp: DateTime::from_timestamp(1_700_000_000 + id, 0),
                direction: Direction::Inbound,
                is_read: false,
                is_sent: false,
                is_delivered: true,
                is_group: false,
                attachment_ids: vec![],
                reaction: None,
            });
        }
    }

    impl MessageFeed for FakeFeed {
        fn latest_cursor(&self) -> Result<WatchCursor> {
            Ok(self
                .messages
                .lock()
                .iter()
                .max_by_key(|m| m.id)
                .map(|m| WatchCursor {
                    message_id: m.id,
                    timestamp: m.timestamp,
                })
                .unwrap_or_default())
        }

        fn messages_after(
            &self,
            after: MessageId,
            chat_id: Option<&str>,
            limit: Option<i64>,
        ) -> Result<Vec<Message>> {
            let mut out: Vec<Message> = self
                .messages
                .lock()
                .iter()
                .filter(|m| m.id > after)
                .filter(|m| chat_id.map_or(true, |c| m.chat_id.as_deref() == Some(c)))
                .cloned()
                .collect();
            out.sort_by_key(|m| m.id);
            out.truncate(limit.unwrap_or(50) as usize);
            Ok(out)
        }

        fn ensure_chat(&self, chat_id: &str) -> Result<()> {
            if chat_id == "missing" {
                return Err(IMessageError::NotFound(chat_id.to_string()));
            }
            Ok(())
        }
    }

    #[test]
    fn test_start_sets_cursor_to_latest() {
        let feed = FakeFeed::default();
        feed.push(1, "a");
        feed.push(2, "a");

        let registry = WatchRegistry::new();
        let session = registry.start(&feed, WatchParams::default()).unwrap();
        assert_eq!(session.cursor.message_id, 2);

        let result = registry.check(&feed, &session.id, None).unwrap();
        assert_eq!(result.count, 0);
        assert_eq!(result.cursor.message_id, 2);
    }

    #[test]
    fn test_check_advances_cursor() {
        let feed = FakeFeed::default();
        feed.push(1, "a");
        let registry = WatchRegistry::new();
        let session = registry.start(&feed, WatchParams::default()).unwrap();

        feed.push(2, "a");
        feed.push(3, "b");
        let result = registry.check(&feed, &session.id, None).unwrap();
        let ids: Vec<_> = result.messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(result.cursor.message_id, 3);

        // Nothing new: empty and cursor unchanged
        let result = registry.check(&feed, &session.id, None).unwrap();
        assert!(result.messages.is_empty());
        assert_eq!(result.cursor.message_id, 3);
        assert_eq!(registry.get(&session.id).unwrap().delivered, 2);
    }

    #[test]
    fn test_limit_leaves_remainder_for_next_check() {
        let feed = FakeFeed::default();
        let registry = WatchRegistry::new();
        let session = registry.start(&feed, WatchParams::default()).unwrap();
        assert_eq!(session.cursor, WatchCursor::default());

        for id in 1..=5 {
            feed.push(id, "a");
        }
        let first = registry.check(&feed, &session.id, Some(3)).unwrap();
        assert_eq!(first.cursor.message_id, 3);
        let second = registry.check(&feed, &session.id, Some(3)).unwrap();
        let ids: Vec<_> = second.messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![4, 5]);
    }

    #[test]
    fn test_chat_filtered_session() {
        let feed = FakeFeed::default();
        let registry = WatchRegistry::new();
        let session = registry
            .start(
                &feed,
                WatchParams {
                    owner: Some("agent-1".into()),
                    chat_id: Some("b".into()),
                },
            )
            .unwrap();

        feed.push(1, "a");
        feed.push(2, "b");
        let result = registry.check(&feed, &session.id, None).unwrap();
        assert_eq!(result.count, 1);
        assert_eq!(result.messages[0].id, 2);

        let err = registry
            .start(
                &feed,
                WatchParams {
                    owner: None,
                    chat_id: Some("missing".into()),
                },
            )
            .unwrap_err();
        assert!(matches!(err, IMessageError::NotFound(_)));
    }

    #[test]
    fn test_stop_then_check_is_invalid_state() {
        let feed = FakeFeed::default();
        let registry = WatchRegistry::new();
        let session = registry.start(&feed, WatchParams::default()).unwrap();
        assert_eq!(registry.active_count(), 1);

        let stopped = registry.stop(&session.id).unwrap();
        assert!(!stopped.active);
        assert_eq!(registry.active_count(), 0);
        assert!(registry.list().is_empty());

        assert!(matches!(
            registry.check(&feed, &session.id, None),
            Err(IMessageError::InvalidState(_))
        ));
        assert!(matches!(
            registry.stop(&session.id),
            Err(IMessageError::InvalidState(_))
        ));
        assert!(matches!(
            registry.check(&feed, "no-such-session", None),
            Err(IMessageError::InvalidState(_))
        ));
    }

    #[test]
    fn test_stopped_sessions_are_dropped() {
        let feed = FakeFeed::default();
        let registry = WatchRegistry::new();
        let kept = registry.start(&feed, WatchParams::default()).unwrap();

        for _ in 0..1000 {
            let session = registry.start(&feed, WatchParams::default()).unwrap();
            registry.stop(&session.id).unwrap();
        }

        let sessions = registry.list();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, kept.id);
    }

    #[test]
    fn test_sessions_are_independent() {
        let feed = FakeFeed::default();
        let registry = WatchRegistry::new();
        let a = registry.start(&feed, WatchParams::default()).unwrap();
        feed.push(1, "a");
        let b = registry.start(&feed, WatchParams::default()).unwrap();
        feed.push(2, "a");

        assert_eq!(registry.check(&feed, &a.id, None).unwrap().count, 2);
        assert_eq!(registry.check(&feed, &b.id, None).unwrap().count, 1);
        assert_eq!(registry.list().len(), 2);
    }
}
