//! iMessage CLI
//!
//! Command-line access to the same store, send and watch operations the MCP
//! server exposes.

use std::time::Duration;

use clap::{Parser, Subcommand};

use imessage_mcp::automation::{validate_chat_id, SendDispatcher, SendRequest, SendTarget};
use imessage_mcp::contacts::{AppleScriptContacts, ContactResolver};
use imessage_mcp::error::Result;
use imessage_mcp::mcp::IMessageHandler;
use imessage_mcp::store::{export, queries, Store};
use imessage_mcp::types::*;
use imessage_mcp::watch::{WatchParams, WatchRegistry};

#[derive(Parser)]
#[command(name = "imessage-cli")]
#[command(about = "Read and send iMessages from the command line")]
#[command(version)]
struct Cli {
    /// Messages database path
    #[arg(
        long,
        env = "IMESSAGE_DB_PATH",
        default_value = "~/Library/Messages/chat.db"
    )]
    db_path: String,

    /// osascript binary
    #[arg(long, env = "IMESSAGE_OSASCRIPT", default_value = "osascript")]
    osascript: String,

    /// Print JSON instead of one line per record
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show database and Messages.app readiness
    Status,
    /// Read messages
    Read {
        /// Restrict to one chat
        #[arg(short, long)]
        chat: Option<String>,
        /// Substring to search for
        #[arg(short, long)]
        search: Option<String>,
        /// Only messages after this time (ISO 8601)
        #[arg(long)]
        since: Option<String>,
        /// Oldest first
        #[arg(long)]
        chronological: bool,
        /// Only unread incoming messages
        #[arg(short, long)]
        unread: bool,
        /// Maximum number to return
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },
    /// List conversations
    Chats {
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },
    /// Show the participants of a chat
    Participants { chat: String },
    /// Show unread incoming messages
    Unread {
        #[arg(short, long, default_value = "50")]
        limit: i64,
    },
    /// List the attachments of a message
    Attachments { message_id: MessageId },
    /// Copy an attachment to a file
    Download {
        attachment_id: AttachmentId,
        destination: String,
    },
    /// Send a text message to a phone number or email
    Send {
        destination: String,
        text: String,
        /// imessage or sms
        #[arg(long)]
        service: Option<Service>,
    },
    /// Send a text message to a group chat
    SendGroup { chat: String, text: String },
    /// Send a file to a phone number, email, or with --group a chat
    SendFile {
        destination: String,
        file: String,
        /// Caption sent before the file
        #[arg(short, long)]
        text: Option<String>,
        /// Treat the destination as a chat id
        #[arg(short, long)]
        group: bool,
    },
    /// Look up a contact by name
    Contact { name: String },
    /// Print new messages as they arrive
    Watch {
        /// Only watch this chat
        #[arg(short, long)]
        chat: Option<String>,
        /// Poll interval in seconds
        #[arg(short, long, default_value = "2")]
        interval: u64,
    },
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

fn print_message(message: &Message) {
    let when = message
        .timestamp
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());
    let who = match message.direction {
        Direction::Outbound => "me".to_string(),
        Direction::Inbound => message.sender.clone().unwrap_or_else(|| "?".to_string()),
    };
    let text = match (&message.text, message.attachment_ids.len()) {
        (Some(text), _) => truncate(&text.replace('\n', " "), 80),
        (None, 0) => String::new(),
        (None, n) => format!("[{} attachment(s)]", n),
    };
    println!("#{} {} {}: {}", message.id, when, who, text);
}

fn print_messages(messages: &[Message], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(messages)?);
    } else {
        messages.iter().for_each(print_message);
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    // Expand ~ in path
    let db_path = shellexpand::tilde(&cli.db_path).to_string();
    let store_config = StoreConfig {
        db_path: db_path.into(),
        ..Default::default()
    };
    let automation = AutomationConfig {
        osascript: cli.osascript.clone(),
        ..Default::default()
    };

    let store = Store::new(store_config.clone());

    match cli.command {
        Commands::Status => {
            let report = IMessageHandler::new(store_config, automation).status();
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Read {
            chat,
            search,
            since,
            chronological,
            unread,
            limit,
        } => {
            let query = MessageQuery {
                chat_id: chat,
                search,
                since: since.as_deref().map(parse_since).transpose()?,
                chronological,
                unread_only: unread,
                limit: Some(limit),
            };
            let messages =
                store.with_connection(|conn, schema| queries::read_messages(conn, schema, &query))?;
            print_messages(&messages, cli.json)?;
        }

        Commands::Chats { limit } => {
            let chats =
                store.with_connection(|conn, schema| queries::list_chats(conn, schema, Some(limit)))?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&chats)?);
            } else {
                for chat in chats {
                    let name = chat
                        .display_name
                        .clone()
                        .unwrap_or_else(|| chat.participants.join(", "));
                    println!(
                        "{} [{:?}] {} ({} messages)",
                        chat.chat_id,
                        chat.kind,
                        truncate(&name, 50),
                        chat.message_count
                    );
                }
            }
        }

        Commands::Participants { chat } => {
            let participants = store.with_connection(|conn, schema| {
                queries::get_chat_participants(conn, schema, &chat)
            })?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&participants)?);
            } else {
                for p in participants {
                    println!("{} {}", p.handle, p.service.unwrap_or_default());
                }
            }
        }

        Commands::Unread { limit } => {
            let messages = store.with_connection(|conn, schema| {
                queries::get_unread_messages(conn, schema, Some(limit))
            })?;
            print_messages(&messages, cli.json)?;
        }

        Commands::Attachments { message_id } => {
            let attachments = store.with_connection(|conn, schema| {
                queries::get_attachments(conn, schema, message_id)
            })?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&attachments)?);
            } else {
                for a in attachments {
                    println!(
                        "#{} {} {} {:?}",
                        a.id,
                        a.mime_type.as_deref().unwrap_or("?"),
                        a.path.as_deref().unwrap_or("-"),
                        a.transfer_status
                    );
                }
            }
        }

        Commands::Download {
            attachment_id,
            destination,
        } => {
            let destination = export::destination_path(&destination)?;
            let attachment = store.with_connection(|conn, schema| {
                queries::get_attachment(conn, schema, attachment_id)
            })?;
            let (_, bytes) = export::copy_attachment(&attachment, &destination)?;
            println!("Copied {} bytes to {}", bytes, destination.display());
        }

        Commands::Send {
            destination,
            text,
            service,
        } => {
            let sender = SendDispatcher::new(automation);
            let request =
                SendRequest::text(SendTarget::Buddy(destination), text).with_service(service);
            let receipt = sender.send(&request)?;
            println!("Sent to {}", receipt.recipient);
        }

        Commands::SendGroup { chat, text } => {
            let sender = SendDispatcher::new(automation);
            let chat = store.chat_send_target(&validate_chat_id(&chat)?)?;
            let receipt = sender.send(&SendRequest::text(SendTarget::Chat(chat), text))?;
            println!("Sent to {}", receipt.recipient);
        }

        Commands::SendFile {
            destination,
            file,
            text,
            group,
        } => {
            let sender = SendDispatcher::new(automation);
            let target = if group {
                let chat = store.chat_send_target(&validate_chat_id(&destination)?)?;
                SendTarget::Chat(chat)
            } else {
                SendTarget::Buddy(destination)
            };
            let receipt = sender.send(&SendRequest::file(target, file, text))?;
            println!("Sent file to {}", receipt.recipient);
        }

        Commands::Contact { name } => {
            let contacts = AppleScriptContacts::new(cli.osascript).lookup(&name)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&contacts)?);
            } else if contacts.is_empty() {
                println!("No contacts match {:?}", name);
            } else {
                for c in contacts {
                    println!("{}: {} {}", c.name, c.phones.join(", "), c.emails.join(", "));
                }
            }
        }

        Commands::Watch { chat, interval } => {
            let registry = WatchRegistry::new();
            let session = registry.start(
                &store,
                WatchParams {
                    owner: Some("imessage-cli".to_string()),
                    chat_id: chat,
                },
            )?;
            eprintln!(
                "Watching from message #{} (Ctrl-C to stop)",
                session.cursor.message_id
            );

            loop {
                std::thread::sleep(Duration::from_secs(interval.max(1)));
                let result = registry.check(&store, &session.id, None)?;
                print_messages(&result.messages, cli.json)?;
            }
        }
    }

    Ok(())
}
