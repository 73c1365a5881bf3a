//! Message body recovery
//!
//! Since macOS Ventura, Messages frequently leaves `message.text` NULL and
//! keeps the body only inside `attributedBody`, an `NSAttributedString`
//! archived with the legacy typedstream format. The plain string sits right
//! after the `NSString` class marker, behind a `+` tag and a length prefix.

use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::ValueRef;
use rusqlite::Connection;

use crate::error::Result;

/// Name of the SQL function registered on store connections
pub const BODY_FUNCTION: &str = "message_body";

/// Unicode lowercase; SQLite's own `lower` and `LIKE` only fold ASCII
pub const FOLD_FUNCTION: &str = "fold_case";

/// Object replacement character Messages uses as an attachment placeholder
const OBJECT_REPLACEMENT: char = '\u{FFFC}';

const NSSTRING_MARKER: &[u8] = b"NSString";

/// The `+` tag must appear within the class header that follows the marker
const MAX_HEADER_LEN: usize = 8;

/// Extract the plain text from an archived `attributedBody` blob
pub fn decode_attributed_body(blob: &[u8]) -> Option<String> {
    let marker = blob
        .windows(NSSTRING_MARKER.len())
        .position(|w| w == NSSTRING_MARKER)?;
    let rest = &blob[marker + NSSTRING_MARKER.len()..];

    let header = &rest[..rest.len().min(MAX_HEADER_LEN)];
    let tag = header.iter().position(|&b| b == b'+')?;
    let rest = &rest[tag + 1..];

    let (len, skip): (usize, usize) = match *rest.first()? {
        0x81 => {
            let bytes = rest.get(1..3)?;
            (u16::from_le_bytes([bytes[0], bytes[1]]) as usize, 3)
        }
        0x82 => {
            let bytes = rest.get(1..5)?;
            (
                u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize,
                5,
            )
        }
        n => (n as usize, 1),
    };

    let text = rest.get(skip..skip.checked_add(len)?)?;
    Some(String::from_utf8_lossy(text).into_owned())
}

/// Normalize a body: drop attachment placeholders, empty becomes `None`
pub fn normalize(text: Option<String>) -> Option<String> {
    let text = text?;
    let cleaned: String = text.chars().filter(|c| *c != OBJECT_REPLACEMENT).collect();
    if cleaned.trim().is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Resolve the visible body from the `text` column and the archived blob
pub fn resolve(text: Option<String>, attributed_body: Option<&[u8]>) -> Option<String> {
    normalize(text).or_else(|| normalize(attributed_body.and_then(decode_attributed_body)))
}

/// Register `message_body(text, attributedBody)` so filters such as text
/// search see the same body the caller is shown
pub fn register(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        BODY_FUNCTION,
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx: &Context<'_>| {
            let text = match ctx.get_raw(0) {
                ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
                _ => None,
            };
            let blob = match ctx.get_raw(1) {
                ValueRef::Blob(b) => Some(b),
                _ => None,
            };
            Ok(resolve(text, blob))
        },
    )?;

    conn.create_scalar_function(
        FOLD_FUNCTION,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx: &Context<'_>| {
            Ok(match ctx.get_raw(0) {
                ValueRef::Text(t) => Some(String::from_utf8_lossy(t).to_lowercase()),
                _ => None,
            })
        },
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Shape of a real archive, trimmed to the parts the decoder reads
    pub(crate) fn archive(text: &str) -> Vec<u8> {
        let mut blob = b"\x04\x0bstreamtyped\x81\xe8\x03\x84\x01@\x84\x84\x84\x12NSAttributedString\x00\x84\x84\x08NSObject\x00\x85\x92\x84\x84\x84\x08".to_vec();
        blob.extend_from_slice(NSSTRING_MARKER);
        blob.extend_from_slice(b"\x01\x94\x84\x01+");
        let bytes = text.as_bytes();
        if bytes.len() < 0x80 {
            blob.push(bytes.len() as u8);
        } else {
            blob.push(0x81);
            blob.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
        }
        blob.extend_from_slice(bytes);
        blob.extend_from_slice(b"\x86\x84\x02iI\x01");
        blob
    }

    #[test]
    fn test_decode_short_body() {
        assert_eq!(
            decode_attributed_body(&archive("hello there")).as_deref(),
            Some("hello there")
        );
    }

    #[test]
    fn test_decode_long_body() {
        let long = "x".repeat(300);
        assert_eq!(decode_attributed_body(&archive(&long)), Some(long));
    }

    #[test]
    fn test_decode_utf8_body() {
        assert_eq!(
            decode_attributed_body(&archive("olá 👋")).as_deref(),
            Some("olá 👋")
        );
    }

    #[test]
    fn test_decode_garbage() {
        assert_eq!(decode_attributed_body(b""), None);
        assert_eq!(decode_attributed_body(b"no marker here"), None);
        // Truncated after the length prefix
        let mut blob = NSSTRING_MARKER.to_vec();
        blob.extend_from_slice(b"\x01+\x20abc");
        assert_eq!(decode_attributed_body(&blob), None);
    }

    #[test]
    fn test_resolve_prefers_text_column() {
        let blob = archive("from blob");
        assert_eq!(
            resolve(Some("from column".into()), Some(&blob)).as_deref(),
            Some("from column")
        );
        assert_eq!(resolve(None, Some(&blob)).as_deref(), Some("from blob"));
        assert_eq!(
            resolve(Some("\u{FFFC}".into()), Some(&blob)).as_deref(),
            Some("from blob")
        );
        assert_eq!(resolve(Some("\u{FFFC}".into()), None), None);
    }

    #[test]
    fn test_sql_function() {
        let conn = Connection::open_in_memory().unwrap();
        register(&conn).unwrap();
        let blob = archive("Lunch tomorrow?");
        let body: Option<String> = conn
            .query_row("SELECT message_body(NULL, ?)", [blob], |row| row.get(0))
            .unwrap();
        assert_eq!(body.as_deref(), Some("Lunch tomorrow?"));

        let body: Option<String> = conn
            .query_row("SELECT message_body('plain', NULL)", [], |row| row.get(0))
            .unwrap();
        assert_eq!(body.as_deref(), Some("plain"));
    }

    #[test]
    fn test_fold_case_function() {
        let conn = Connection::open_in_memory().unwrap();
        register(&conn).unwrap();
        let folded: Option<String> = conn
            .query_row("SELECT fold_case('À L ÉCOLE Ünd')", [], |row| row.get(0))
            .unwrap();
        assert_eq!(folded.as_deref(), Some("à l école ünd"));

        let folded: Option<String> = conn
            .query_row("SELECT fold_case(NULL)", [], |row| row.get(0))
            .unwrap();
        assert_eq!(folded, None);
    }
}
