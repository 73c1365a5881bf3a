//! Outbound sends through Messages.app
//!
//! A send is validated, checked against a running Messages.app, and then
//! performed with exactly one script run. Nothing is retried: a retry after
//! an ambiguous failure could deliver the message twice.

pub mod destination;
pub mod runner;
pub mod script;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{IMessageError, Result};
use crate::types::{AutomationConfig, Service};

pub use destination::{
    validate_chat_id, validate_destination, validate_file, validate_text, DestinationKind,
};
pub use runner::{classify_failure, OsascriptRunner, ScriptFailure, ScriptRunner};

/// Who a send goes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendTarget {
    /// A phone number or email
    Buddy(String),
    /// An existing chat, by guid or identifier
    Chat(String),
}

impl SendTarget {
    fn describe(&self) -> &str {
        match self {
            SendTarget::Buddy(r) => r,
            SendTarget::Chat(c) => c,
        }
    }
}

/// What a send carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendContent {
    Text(String),
    File {
        path: String,
        caption: Option<String>,
    },
}

/// A single outbound send
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub target: SendTarget,
    pub content: SendContent,
    /// Only meaningful for buddy sends; defaults to the configured service
    pub service: Option<Service>,
}

impl SendRequest {
    pub fn text(target: SendTarget, text: impl Into<String>) -> Self {
        Self {
            target,
            content: SendContent::Text(text.into()),
            service: None,
        }
    }

    pub fn file(target: SendTarget, path: impl Into<String>, caption: Option<String>) -> Self {
        Self {
            target,
            content: SendContent::File {
                path: path.into(),
                caption,
            },
            service: None,
        }
    }

    pub fn with_service(mut self, service: Option<Service>) -> Self {
        self.service = service;
        self
    }
}

/// Confirmation that Messages.app accepted a send
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendReceipt {
    pub success: bool,
    /// Normalized destination the message was sent to
    pub recipient: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<Service>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    pub sent_at: DateTime<Utc>,
}

/// A validated send, ready to be turned into a script
struct PreparedSend {
    recipient: String,
    chat: bool,
    text: Option<String>,
    file: Option<PathBuf>,
    service: Option<Service>,
}

/// Performs sends through a [`ScriptRunner`]
#[derive(Clone)]
pub struct SendDispatcher {
    runner: Arc<dyn ScriptRunner>,
    config: AutomationConfig,
}

impl SendDispatcher {
    /// Dispatcher backed by the configured osascript binary
    pub fn new(config: AutomationConfig) -> Self {
        let runner = Arc::new(OsascriptRunner::new(config.osascript.clone()));
        Self { runner, config }
    }

    pub fn with_runner(config: AutomationConfig, runner: Arc<dyn ScriptRunner>) -> Self {
        Self { runner, config }
    }

    pub fn config(&self) -> &AutomationConfig {
        &self.config
    }

    /// Whether Messages.app is running
    pub fn is_app_running(&self) -> Result<bool> {
        match self.runner.run(script::MESSAGES_RUNNING) {
            Ok(out) => Ok(out.trim().eq_ignore_ascii_case("true")),
            Err(failure) => Err(classify_failure(&failure, "Messages")),
        }
    }

    fn prepare(&self, request: &SendRequest) -> Result<PreparedSend> {
        let (recipient, chat) = match &request.target {
            SendTarget::Buddy(raw) => (validate_destination(raw)?.0, false),
            SendTarget::Chat(raw) => (validate_chat_id(raw)?, true),
        };

        let (text, file) = match &request.content {
            SendContent::Text(text) => {
                destination::validate_text(text)?;
                (Some(text.clone()), None)
            }
            SendContent::File { path, caption } => {
                let path = validate_file(path)?;
                let caption = caption.as_ref().filter(|c| !c.trim().is_empty()).cloned();
                (caption, Some(path))
            }
        };

        let service = if chat {
            None
        } else {
            Some(request.service.unwrap_or(self.config.default_service))
        };

        Ok(PreparedSend {
            recipient,
            chat,
            text,
            file,
            service,
        })
    }

    fn render(prepared: &PreparedSend) -> String {
        let service = prepared.service.unwrap_or_default();
        match (&prepared.file, prepared.chat) {
            (None, false) => script::send_text_to_buddy(
                &prepared.recipient,
                prepared.text.as_deref().unwrap_or_default(),
                service,
            ),
            (None, true) => script::send_text_to_chat(
                &prepared.recipient,
                prepared.text.as_deref().unwrap_or_default(),
            ),
            (Some(path), false) => script::send_file_to_buddy(
                &prepared.recipient,
                path,
                prepared.text.as_deref(),
                service,
            ),
            (Some(path), true) => {
                script::send_file_to_chat(&prepared.recipient, path, prepared.text.as_deref())
            }
        }
    }

    /// Validate, check Messages.app, then send exactly once
    pub fn send(&self, request: &SendRequest) -> Result<SendReceipt> {
        let prepared = self.prepare(request)?;

        if !self.is_app_running()? {
            return Err(IMessageError::Unavailable(
                "Messages.app is not running. Please open it first.".to_string(),
            ));
        }

        let source = Self::render(&prepared);
        debug!(
            target_kind = if prepared.chat { "chat" } else { "buddy" },
            has_file = prepared.file.is_some(),
            "Running send script"
        );

        if let Err(failure) = self.runner.run(&source) {
            let err = classify_failure(&failure, request.target.describe());
            warn!("Send to {} failed: {}", prepared.recipient, err);
            return Err(err);
        }

        info!("Sent message to {}", prepared.recipient);
        Ok(SendReceipt {
            success: true,
            recipient: prepared.recipient,
            service: prepared.service,
            file: prepared.file,
            sent_at: Utc::now(),
        })
    }
}
