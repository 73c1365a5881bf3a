//! Validation of send destinations
//!
//! Messages accepts a phone number or an Apple ID email for one-to-one sends.
//! Anything else would only fail later inside AppleScript with an opaque
//! error, so it is rejected up front as an invalid argument.

use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{IMessageError, Result};

static PHONE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?[0-9]{7,15}$").unwrap());

static PHONE_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\-.()]").unwrap());

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^[^\s@"\\]+@[^\s@"\\.]+(\.[^\s@"\\.]+)+$"#).unwrap());

/// Kind of a validated destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationKind {
    Phone,
    Email,
}

/// Normalize a phone number or email; fails with `InvalidArgument`
pub fn validate_destination(input: &str) -> Result<(String, DestinationKind)> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(IMessageError::InvalidArgument(
            "destination is required".to_string(),
        ));
    }

    if trimmed.contains('@') {
        if EMAIL.is_match(trimmed) {
            return Ok((trimmed.to_lowercase(), DestinationKind::Email));
        }
    } else {
        let compact = PHONE_SEPARATORS.replace_all(trimmed, "");
        if PHONE.is_match(&compact) {
            return Ok((compact.into_owned(), DestinationKind::Phone));
        }
    }

    Err(IMessageError::InvalidArgument(format!(
        "destination {:?} is not a phone number (e.g. +14155551234) or email address",
        input
    )))
}

/// Validate a chat identifier or chat guid
pub fn validate_chat_id(input: &str) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(IMessageError::InvalidArgument("chat_id is required".to_string()));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(IMessageError::InvalidArgument(
            "chat_id contains control characters".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

/// Validate message text
pub fn validate_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(IMessageError::InvalidArgument("text must not be empty".to_string()));
    }
    Ok(())
}

/// Expand `~`, require an existing regular file and return its absolute path
pub fn validate_file(input: &str) -> Result<PathBuf> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(IMessageError::InvalidArgument("file_path is required".to_string()));
    }

    let path = PathBuf::from(shellexpand::tilde(trimmed).into_owned());
    if !path.is_absolute() {
        return Err(IMessageError::InvalidArgument(format!(
            "file_path must be absolute: {}",
            input
        )));
    }
    if !path.is_file() {
        return Err(IMessageError::InvalidArgument(format!(
            "file_path does not exist or is not a regular file: {}",
            path.display()
        )));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_numbers() {
        let (d, kind) = validate_destination("+1 (415) 555-1234").unwrap();
        assert_eq!(d, "+14155551234");
        assert_eq!(kind, DestinationKind::Phone);

        assert!(validate_destination("5551234").is_ok());
        assert!(validate_destination("+invalid").is_err());
        assert!(validate_destination("+12").is_err());
        assert!(validate_destination("+1234567890123456").is_err());
    }

    #[test]
    fn test_emails() {
        let (d, kind) = validate_destination(" Jane.Doe@Example.com ").unwrap();
        assert_eq!(d, "jane.doe@example.com");
        assert_eq!(kind, DestinationKind::Email);

        assert!(validate_destination("jane@").is_err());
        assert!(validate_destination("jane@example").is_err());
        assert!(validate_destination("ja ne@example.com").is_err());
        assert!(validate_destination("jane\"@example.com").is_err());
    }

    #[test]
    fn test_invalid_destination_kind() {
        let err = validate_destination("+invalid").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_chat_id_and_text() {
        assert_eq!(validate_chat_id(" chat42 ").unwrap(), "chat42");
        assert!(validate_chat_id("").is_err());
        assert!(validate_chat_id("chat\n42").is_err());
        assert!(validate_text("  ").is_err());
        assert!(validate_text("hi").is_ok());
    }

    #[test]
    fn test_file_validation() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("photo.jpg");
        std::fs::write(&file, b"jpeg").unwrap();

        assert_eq!(validate_file(file.to_str().unwrap()).unwrap(), file);
        assert!(validate_file(dir.path().to_str().unwrap()).is_err());
        assert!(validate_file("relative/photo.jpg").is_err());
        assert!(validate_file("/definitely/not/here.jpg").is_err());
    }
}
