//! REPL (Read-Eval-Print Loop) for interactive chat
//!
//! One session per REPL. Each line is either a slash command or a message
//! sent through the orchestrator; tokens print as they arrive and Ctrl-C
//! during a reply issues a stop for the session.

pub mod commands;
pub mod display;
pub mod input;

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::attachments;
use crate::chat::{ChatEvent, ChatOrchestrator, SendRequest};
use crate::config::system_prompt_preset;
use crate::session::{SessionId, SessionUpdate};
use crate::types::Attachment;

use self::commands::{is_command, Command};
pub use self::display::DisplayManager;
use self::input::{Input, InputHandler};

/// REPL startup options
#[derive(Debug, Clone, Default)]
pub struct ReplConfig {
    /// Input history file; none keeps history in memory only
    pub history_path: Option<PathBuf>,
    pub show_progress: bool,
    pub web_search: bool,
}

impl ReplConfig {
    /// ~/.localchat/history
    pub fn default_history_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".localchat").join("history"))
    }
}

/// REPL session coordinator
pub struct ReplSession {
    orchestrator: ChatOrchestrator,
    session_id: SessionId,
    input: InputHandler,
    display: DisplayManager,
    web_search: bool,
    pending: Vec<Attachment>,
}

impl ReplSession {
    pub fn new(orchestrator: ChatOrchestrator, session_id: SessionId, config: ReplConfig) -> Result<Self> {
        let input = match config.history_path {
            Some(path) => InputHandler::with_history(path)?,
            None => InputHandler::new()?,
        };

        Ok(ReplSession {
            orchestrator,
            session_id,
            input,
            display: DisplayManager::new(config.show_progress),
            web_search: config.web_search,
            pending: Vec::new(),
        })
    }

    /// Run until `/quit` or Ctrl-D
    pub async fn run(&mut self) -> Result<()> {
        let session = self.orchestrator.store().get(self.session_id).await?;
        self.display
            .show_banner(env!("CARGO_PKG_VERSION"), &session, self.web_search);

        loop {
            let input = tokio::task::block_in_place(|| self.input.read_line())?;

            match input {
                Input::Eof => break,
                Input::Interrupted => {
                    println!("Use /quit to exit");
                }
                Input::Line(line) if line.is_empty() => {}
                Input::Line(line) if is_command(&line) => match self.execute(commands::parse(&line)).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => self.display.show_error(&e.to_string()),
                },
                Input::Line(line) => self.send(line).await,
            }
        }

        self.input.save_history()
    }

    /// Send one message and render the reply
    async fn send(&mut self, text: String) {
        let request = SendRequest::new(self.session_id, text)
            .with_web_search(self.web_search)
            .with_attachments(std::mem::take(&mut self.pending));

        let mut stream = match self.orchestrator.send(request).await {
            Ok(stream) => stream,
            Err(e) => {
                self.display.show_error(&e.user_message());
                return;
            }
        };

        self.display.start_waiting();
        let mut stopping = false;

        loop {
            let event = tokio::select! {
                event = stream.next_event() => event,
                signal = tokio::signal::ctrl_c(), if !stopping => {
                    stopping = true;
                    match signal {
                        Ok(()) => {
                            self.orchestrator.stop(self.session_id);
                        }
                        Err(e) => tracing::warn!(error = %e, "Ctrl-C handler unavailable"),
                    }
                    continue;
                }
            };

            match event {
                Some(ChatEvent::Token { token }) => self.display.stream_token(&token),
                Some(ChatEvent::Done { .. }) => {
                    self.display.end_response();
                    break;
                }
                Some(ChatEvent::Error { error, .. }) => {
                    self.display.show_error(&error);
                    break;
                }
                // Cancelled: whatever was printed is what was kept
                None => {
                    self.display.show_stopped();
                    break;
                }
            }
        }
    }

    /// Execute a command; false ends the REPL
    async fn execute(&mut self, command: Command) -> Result<bool> {
        let store = self.orchestrator.store().clone();

        match command {
            Command::Help => commands::show_help(),
            Command::Quit => return Ok(false),
            Command::Clear => {
                store.clear_history(self.session_id).await?;
                self.pending.clear();
                self.display.show_info("Conversation cleared.");
            }
            Command::System { prompt: None } => {
                let session = store.get(self.session_id).await?;
                println!("{}", session.system_prompt);
            }
            Command::System { prompt: Some(prompt) } => {
                let resolved = system_prompt_preset(&prompt).unwrap_or(prompt.as_str()).to_string();
                store
                    .update(self.session_id, SessionUpdate::system_prompt(resolved))
                    .await?;
                self.display.show_info("System prompt updated.");
            }
            Command::Model { id: None } => {
                let session = store.get(self.session_id).await?;
                let provider = self.orchestrator.provider_for(self.session_id).await?;
                match provider.list_models().await {
                    Ok(models) => self
                        .display
                        .show_models(&models, session.settings.model.as_deref()),
                    Err(e) => self.display.show_error(&e.user_message()),
                }
            }
            Command::Model { id: Some(id) } => {
                store.update(self.session_id, SessionUpdate::model(id.clone())).await?;
                self.display.show_info(&format!("Now using {}", id));
            }
            Command::History => {
                let session = store.get(self.session_id).await?;
                self.display.show_history(&session);
            }
            Command::Attach { path: None } => {
                if self.pending.is_empty() {
                    self.display.show_warning("Usage: /attach <path>");
                } else {
                    let names: Vec<&str> = self.pending.iter().map(|a| a.name.as_str()).collect();
                    self.display.show_info(&format!("Pending: {}", names.join(", ")));
                }
            }
            Command::Attach { path: Some(path) } => match attachments::from_path(Path::new(&path)) {
                Ok(attachment) => {
                    self.display
                        .show_info(&format!("Attached {} ({})", attachment.name, attachment.media_type));
                    self.pending.push(attachment);
                }
                Err(e) => self.display.show_error(&e.user_message()),
            },
            Command::Search { enable } => {
                self.web_search = enable.unwrap_or(!self.web_search);
                let state = if self.web_search { "on" } else { "off" };
                self.display.show_info(&format!("Web search {}", state));
            }
            Command::Unknown { input } => {
                self.display.show_warning(&format!("Unknown command: {} (try /help)", input));
            }
        }

        Ok(true)
    }
}
