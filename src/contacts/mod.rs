//! Address-book lookup through Contacts.app

use std::sync::Arc;

use tracing::debug;

use crate::automation::{classify_failure, script::escape, OsascriptRunner, ScriptRunner};
use crate::error::{IMessageError, Result};
use crate::types::Contact;

/// Resolves names to phone numbers and emails
pub trait ContactResolver: Send + Sync {
    fn lookup(&self, name: &str) -> Result<Vec<Contact>>;
}

/// One contact per line: `name<TAB>phone;phone<TAB>email;email`
fn lookup_script(query: &str) -> String {
    format!(
        r#"tell application "Contacts"
    set output to ""
    set AppleScript's text item delimiters to ";"
    repeat with p in (every person whose name contains "{query}")
        set phoneList to (value of phones of p) as text
        set emailList to (value of emails of p) as text
        set output to output & (name of p) & tab & phoneList & tab & emailList & linefeed
    end repeat
    set AppleScript's text item delimiters to ""
    return output
end tell"#,
        query = escape(query)
    )
}

fn split_list(field: Option<&str>) -> Vec<String> {
    field
        .unwrap_or_default()
        .split(';')
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != "missing value")
        .map(str::to_string)
        .collect()
}

/// Parse the script output into contacts, skipping blank lines
pub fn parse_contacts(output: &str) -> Vec<Contact> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split('\t');
            let name = fields.next()?.trim();
            if name.is_empty() {
                return None;
            }
            Some(Contact {
                name: name.to_string(),
                phones: split_list(fields.next()),
                emails: split_list(fields.next()),
            })
        })
        .collect()
}

/// Contacts.app via AppleScript
#[derive(Clone)]
pub struct AppleScriptContacts {
    runner: Arc<dyn ScriptRunner>,
}

impl AppleScriptContacts {
    pub fn new(osascript: impl Into<String>) -> Self {
        Self {
            runner: Arc::new(OsascriptRunner::new(osascript)),
        }
    }

    pub fn with_runner(runner: Arc<dyn ScriptRunner>) -> Self {
        Self { runner }
    }
}

impl ContactResolver for AppleScriptContacts {
    fn lookup(&self, name: &str) -> Result<Vec<Contact>> {
        let query = name.trim();
        if query.is_empty() {
            return Err(IMessageError::InvalidArgument(
                "name must not be empty".to_string(),
            ));
        }

        let output = self
            .runner
            .run(&lookup_script(query))
            .map_err(|failure| classify_failure(&failure, "Contacts"))?;

        let contacts = parse_contacts(&output);
        debug!("Contact lookup {:?} matched {}", query, contacts.len());
        Ok(contacts)
    }
}
