//! Core types for imessage-mcp

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{IMessageError, Result};

/// Store-assigned message rowid
pub type MessageId = i64;

/// Store-assigned attachment rowid
pub type AttachmentId = i64;

/// Seconds between the Unix epoch and the Apple epoch (2001-01-01T00:00:00Z)
pub const APPLE_EPOCH_OFFSET_SECS: i64 = 978_307_200;

/// Default number of rows returned by list-style reads
pub const DEFAULT_LIMIT: i64 = 50;

/// Upper bound on rows returned by a single read
pub const MAX_LIMIT: i64 = 1000;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Raw values at or above this magnitude are nanoseconds, below are seconds
const NANOSECOND_THRESHOLD: i64 = 100_000_000_000;

/// Clamp an optional caller-supplied limit into `1..=MAX_LIMIT`
pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// Unit used by the store's `date` columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateScale {
    /// macOS 10.13 and later
    #[default]
    Nanoseconds,
    /// Legacy stores
    Seconds,
}

impl DateScale {
    /// Guess the scale from a sample value taken from the store
    pub fn detect(sample: Option<i64>) -> Self {
        match sample {
            Some(v) if v != 0 && v.abs() < NANOSECOND_THRESHOLD => DateScale::Seconds,
            _ => DateScale::Nanoseconds,
        }
    }

    /// Convert an instant into the store-native representation
    pub fn to_store(self, dt: DateTime<Utc>) -> i64 {
        let secs = dt.timestamp() - APPLE_EPOCH_OFFSET_SECS;
        match self {
            DateScale::Seconds => secs,
            DateScale::Nanoseconds => secs
                .saturating_mul(NANOS_PER_SEC)
                .saturating_add(i64::from(dt.timestamp_subsec_nanos())),
        }
    }
}

/// Convert a store-native Apple timestamp into UTC.
///
/// Zero means "unset" in chat.db and maps to `None`.
pub fn apple_to_datetime(raw: Option<i64>) -> Option<DateTime<Utc>> {
    let raw = raw.filter(|v| *v != 0)?;
    let (secs, nanos) = if raw.abs() >= NANOSECOND_THRESHOLD {
        (raw.div_euclid(NANOS_PER_SEC), raw.rem_euclid(NANOS_PER_SEC) as u32)
    } else {
        (raw, 0)
    };
    Utc.timestamp_opt(secs + APPLE_EPOCH_OFFSET_SECS, nanos)
        .single()
}

/// Parse a caller-supplied `since` value.
///
/// Accepts RFC 3339, naive date-times and bare dates; naive forms are UTC.
pub fn parse_since(input: &str) -> Result<DateTime<Utc>> {
    let s = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    Err(IMessageError::InvalidArgument(format!(
        "since must be an ISO-8601 date or date-time, got {:?}",
        input
    )))
}

/// Direction of a message relative to the local account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Tapback kinds, in store order (type code modulo 1000)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Love,
    Like,
    Dislike,
    Laugh,
    Emphasize,
    Question,
}

impl ReactionKind {
    fn from_offset(offset: i64) -> Option<Self> {
        match offset {
            0 => Some(ReactionKind::Love),
            1 => Some(ReactionKind::Like),
            2 => Some(ReactionKind::Dislike),
            3 => Some(ReactionKind::Laugh),
            4 => Some(ReactionKind::Emphasize),
            5 => Some(ReactionKind::Question),
            _ => None,
        }
    }
}

/// A tapback attached to another message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub kind: ReactionKind,
    /// True when the tapback removes an earlier one (3000-range codes)
    pub removed: bool,
    /// Guid of the message reacted to, as stored (may carry a `p:0/` prefix)
    pub target_guid: Option<String>,
}

impl Reaction {
    /// Decode `associated_message_type`; 2000-2005 add, 3000-3005 remove
    pub fn from_store(code: Option<i64>, target_guid: Option<String>) -> Option<Self> {
        let code = code?;
        if !(2000..4000).contains(&code) {
            return None;
        }
        let kind = ReactionKind::from_offset(code % 1000)?;
        Some(Self {
            kind,
            removed: code >= 3000,
            target_guid,
        })
    }
}

/// A normalized message row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub guid: Option<String>,
    /// Chat identifier (phone, email or `chat...` group id)
    pub chat_id: Option<String>,
    pub chat_name: Option<String>,
    /// Handle of the other party; `None` for outbound messages without a handle
    pub sender: Option<String>,
    /// Body text; `None` for attachment-only messages
    pub text: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub direction: Direction,
    pub is_read: bool,
    pub is_sent: bool,
    pub is_delivered: bool,
    pub is_group: bool,
    #[serde(default)]
    pub attachment_ids: Vec<AttachmentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reaction: Option<Reaction>,
}

/// Chat kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Individual,
    Group,
}

impl ChatKind {
    /// `style` 43 is a group, 45 a one-to-one chat; older stores lack the
    /// column, so fall back to the `chat...` identifier convention.
    pub fn from_store(style: Option<i64>, chat_identifier: &str) -> Self {
        match style {
            Some(43) => ChatKind::Group,
            Some(_) => ChatKind::Individual,
            None if chat_identifier.starts_with("chat") => ChatKind::Group,
            None => ChatKind::Individual,
        }
    }
}

/// A conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    pub chat_id: String,
    pub display_name: Option<String>,
    pub kind: ChatKind,
    pub service: Option<String>,
    #[serde(default)]
    pub participants: Vec<String>,
    pub message_count: i64,
    pub last_message_at: Option<DateTime<Utc>>,
}

/// A chat participant handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub handle: String,
    pub service: Option<String>,
}

/// Transfer state of an attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Transferring,
    Complete,
    Failed,
    Unknown,
}

impl TransferStatus {
    pub fn from_store(state: Option<i64>) -> Self {
        match state {
            Some(0) => TransferStatus::Pending,
            Some(1..=4) => TransferStatus::Transferring,
            Some(5) => TransferStatus::Complete,
            Some(6) => TransferStatus::Failed,
            _ => TransferStatus::Unknown,
        }
    }
}

/// A file attached to a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: AttachmentId,
    pub guid: Option<String>,
    pub message_id: MessageId,
    /// Absolute path on the local disk, `~` expanded
    pub path: Option<String>,
    pub mime_type: Option<String>,
    pub uti: Option<String>,
    pub transfer_name: Option<String>,
    pub size_bytes: Option<i64>,
    pub transfer_status: TransferStatus,
}

/// An address-book entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    #[serde(default)]
    pub phones: Vec<String>,
    #[serde(default)]
    pub emails: Vec<String>,
}

/// Filter parameters for message reads
#[derive(Debug, Clone, Default)]
pub struct MessageQuery {
    pub chat_id: Option<String>,
    /// Case-insensitive substring on body text
    pub search: Option<String>,
    /// Strictly-after bound on the message timestamp
    pub since: Option<DateTime<Utc>>,
    /// Oldest first when true, newest first otherwise
    pub chronological: bool,
    pub unread_only: bool,
    pub limit: Option<i64>,
}

/// Last-seen position of a watch session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WatchCursor {
    pub message_id: MessageId,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Messaging service used for sends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    #[default]
    #[serde(alias = "iMessage")]
    IMessage,
    #[serde(alias = "SMS")]
    Sms,
}

impl Service {
    /// The AppleScript `service type` constant
    pub fn script_name(self) -> &'static str {
        match self {
            Service::IMessage => "iMessage",
            Service::Sms => "SMS",
        }
    }
}

impl std::str::FromStr for Service {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "imessage" => Ok(Service::IMessage),
            "sms" => Ok(Service::Sms),
            _ => Err(format!("Unknown service: {}", s)),
        }
    }
}

/// Configuration for the message store reader
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to chat.db
    pub db_path: PathBuf,
    /// SQLite busy timeout in milliseconds
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_busy_timeout() -> u64 {
    5000
}

/// Default location of the Messages database for the current user
pub fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("~"))
        .join("Library/Messages/chat.db")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

/// Configuration for the AppleScript bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// Path or name of the osascript binary
    #[serde(default = "default_osascript")]
    pub osascript: String,
    /// Service used when a send does not name one
    #[serde(default)]
    pub default_service: Service,
}

fn default_osascript() -> String {
    "osascript".to_string()
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            osascript: default_osascript(),
            default_service: Service::default(),
        }
    }
}

/// Readiness report for `check_status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub platform: String,
    pub database_path: String,
    pub database_accessible: bool,
    pub messages_app_running: bool,
    pub ready: bool,
    pub active_watch_sessions: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apple_epoch_conversion() {
        let dt = apple_to_datetime(Some(0));
        assert!(dt.is_none());

        // One day after the Apple epoch, in nanoseconds
        let dt = apple_to_datetime(Some(86_400 * NANOS_PER_SEC)).unwrap();
        assert_eq!(dt.to_rfc3339(), "2001-01-02T00:00:00+00:00");

        // Legacy stores use seconds
        let dt = apple_to_datetime(Some(86_400)).unwrap();
        assert_eq!(dt.to_rfc3339(), "2001-01-02T00:00:00+00:00");
    }

    #[test]
    fn test_date_scale_to_store() {
        let dt = Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 10).unwrap();
        assert_eq!(DateScale::Seconds.to_store(dt), 10);
        assert_eq!(DateScale::Nanoseconds.to_store(dt), 10 * NANOS_PER_SEC);
        assert_eq!(DateScale::detect(Some(700_000_000)), DateScale::Seconds);
        assert_eq!(
            DateScale::detect(Some(700_000_000 * NANOS_PER_SEC)),
            DateScale::Nanoseconds
        );
        assert_eq!(DateScale::detect(None), DateScale::Nanoseconds);
    }

    #[test]
    fn test_parse_since_forms() {
        let a = parse_since("2024-01-15T10:00:00Z").unwrap();
        let b = parse_since("2024-01-15T10:00:00").unwrap();
        let c = parse_since("2024-01-15 10:00:00").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);

        let d = parse_since("2024-01-15").unwrap();
        assert_eq!(d.to_rfc3339(), "2024-01-15T00:00:00+00:00");

        let e = parse_since("2024-01-15T12:00:00+02:00").unwrap();
        assert_eq!(e.to_rfc3339(), "2024-01-15T10:00:00+00:00");

        assert!(matches!(
            parse_since("yesterday"),
            Err(IMessageError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_reaction_decoding() {
        assert_eq!(Reaction::from_store(Some(0), None), None);
        assert_eq!(Reaction::from_store(None, None), None);

        let r = Reaction::from_store(Some(2001), Some("p:0/ABC".into())).unwrap();
        assert_eq!(r.kind, ReactionKind::Like);
        assert!(!r.removed);

        let r = Reaction::from_store(Some(3003), None).unwrap();
        assert_eq!(r.kind, ReactionKind::Laugh);
        assert!(r.removed);

        // Sticker tapbacks and other codes are not mapped
        assert_eq!(Reaction::from_store(Some(2007), None), None);
        assert_eq!(Reaction::from_store(Some(1000), None), None);
    }

    #[test]
    fn test_chat_kind() {
        assert_eq!(ChatKind::from_store(Some(43), "x"), ChatKind::Group);
        assert_eq!(ChatKind::from_store(Some(45), "chat1"), ChatKind::Individual);
        assert_eq!(ChatKind::from_store(None, "chat123"), ChatKind::Group);
        assert_eq!(ChatKind::from_store(None, "+15550001"), ChatKind::Individual);
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None), DEFAULT_LIMIT);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(-5)), 1);
        assert_eq!(clamp_limit(Some(10_000)), MAX_LIMIT);
    }

    #[test]
    fn test_service_parse() {
        assert_eq!("iMessage".parse::<Service>(), Ok(Service::IMessage));
        assert_eq!("SMS".parse::<Service>(), Ok(Service::Sms));
        assert!("fax".parse::<Service>().is_err());
    }
}
