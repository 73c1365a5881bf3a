//! AppleScript sources for Messages.app
//!
//! Every caller-provided string goes through [`escape`] before it is embedded
//! in a script literal.

use std::path::Path;

use crate::types::Service;

/// Escape a value for use inside an AppleScript string literal
pub fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Returns `true`/`false` on stdout
pub const MESSAGES_RUNNING: &str = r#"tell application "System Events"
    return (name of processes) contains "Messages"
end tell"#;

fn buddy_prelude(recipient: &str, service: Service) -> String {
    format!(
        r#"    set targetService to 1st service whose service type = {service}
    set targetBuddy to buddy "{recipient}" of targetService"#,
        service = service.script_name(),
        recipient = escape(recipient),
    )
}

fn chat_prelude(chat: &str) -> String {
    format!(r#"    set targetChat to chat id "{}""#, escape(chat))
}

fn send_text_line(target: &str, text: &str) -> String {
    format!(r#"    send "{}" to {}"#, escape(text), target)
}

fn send_file_lines(target: &str, path: &Path) -> String {
    format!(
        r#"    set theFile to POSIX file "{}"
    send theFile to {}"#,
        escape(&path.to_string_lossy()),
        target
    )
}

fn wrap(lines: &[String]) -> String {
    format!(
        "tell application \"Messages\"\n{}\nend tell",
        lines.join("\n")
    )
}

/// Send text to a phone number or email
pub fn send_text_to_buddy(recipient: &str, text: &str, service: Service) -> String {
    wrap(&[
        buddy_prelude(recipient, service),
        send_text_line("targetBuddy", text),
    ])
}

/// Send text to an existing chat
pub fn send_text_to_chat(chat: &str, text: &str) -> String {
    wrap(&[chat_prelude(chat), send_text_line("targetChat", text)])
}

/// Send a file, optionally preceded by a caption, to a phone number or email
pub fn send_file_to_buddy(
    recipient: &str,
    path: &Path,
    caption: Option<&str>,
    service: Service,
) -> String {
    let mut lines = vec![buddy_prelude(recipient, service)];
    if let Some(caption) = caption {
        lines.push(send_text_line("targetBuddy", caption));
    }
    lines.push(send_file_lines("targetBuddy", path));
    wrap(&lines)
}

/// Send a file, optionally preceded by a caption, to an existing chat
pub fn send_file_to_chat(chat: &str, path: &Path, caption: Option<&str>) -> String {
    let mut lines = vec![chat_prelude(chat)];
    if let Some(caption) = caption {
        lines.push(send_text_line("targetChat", caption));
    }
    lines.push(send_file_lines("targetChat", path));
    wrap(&lines)
}
