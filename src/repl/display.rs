//! Display manager for REPL terminal UI
//!
//! Tokens go to stdout as they arrive; a spinner covers the wait for the
//! first one.

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::time::Duration;

use crate::context::TokenCounter;
use crate::models::ModelDescriptor;
use crate::session::Session;
use crate::types::Role;

/// Display manager for REPL UI
pub struct DisplayManager {
    spinner: Option<ProgressBar>,
    show_progress: bool,
    tick_interval: Duration,
}

impl DisplayManager {
    pub fn new(show_progress: bool) -> Self {
        DisplayManager {
            spinner: None,
            show_progress,
            tick_interval: Duration::from_millis(100),
        }
    }

    /// Show welcome banner
    pub fn show_banner(&self, version: &str, session: &Session, web_search: bool) {
        let width = 64;
        let model = session.settings.model.as_deref().unwrap_or("none selected");
        let search = if web_search { "on" } else { "off" };

        println!("\n{}", "=".repeat(width).cyan());
        println!("{}", format!("  localchat {}", version).bold().cyan());
        println!(
            "{}",
            format!(
                "  Provider: {} | Model: {} | Web search: {}",
                session.settings.provider, model, search
            )
            .dimmed()
        );
        println!("{}\n", "=".repeat(width).cyan());
        println!(
            "Type a message (or {} for commands, {} to quit)\n",
            "/help".green(),
            "/quit".green()
        );
    }

    /// Spinner shown until the first token arrives
    pub fn start_waiting(&mut self) {
        self.finish_waiting();
        if !self.show_progress {
            return;
        }

        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message("Thinking...");
        pb.enable_steady_tick(self.tick_interval);
        self.spinner = Some(pb);
    }

    pub fn finish_waiting(&mut self) {
        if let Some(pb) = self.spinner.take() {
            pb.finish_and_clear();
        }
    }

    /// Display streaming tokens
    pub fn stream_token(&mut self, token: &str) {
        self.finish_waiting();
        print!("{}", token);
        let _ = io::stdout().flush();
    }

    pub fn end_response(&mut self) {
        self.finish_waiting();
        println!("\n");
    }

    pub fn show_stopped(&mut self) {
        self.finish_waiting();
        println!("\n{}\n", "[stopped]".yellow());
    }

    pub fn show_error(&mut self, error: &str) {
        self.finish_waiting();
        println!("{} {}", "Error:".red().bold(), error.red());
    }

    pub fn show_warning(&self, warning: &str) {
        println!("{} {}", "Warning:".yellow().bold(), warning.yellow());
    }

    pub fn show_info(&self, info: &str) {
        println!("{} {}", "Info:".cyan(), info);
    }

    /// Print the conversation so far
    pub fn show_history(&self, session: &Session) {
        if session.messages.is_empty() {
            println!("{}", "No messages yet.".dimmed());
            return;
        }

        println!("\n{}", session.title.bold().cyan());
        println!("{}", "-".repeat(60).cyan());
        for message in &session.messages {
            let label = match message.role {
                Role::User => "you".green().bold(),
                Role::Assistant => "assistant".cyan().bold(),
                Role::System => "system".dimmed(),
            };
            println!("{}: {}", label, message.content);
            for attachment in &message.attachments {
                println!("  {} {}", "+".dimmed(), attachment.name.dimmed());
            }
        }
        let tokens = TokenCounter::new().estimate_messages(&session.messages);
        println!(
            "{}",
            format!("{} messages, ~{} tokens", session.messages.len(), tokens).dimmed()
        );
        println!();
    }

    pub fn show_models(&self, models: &[ModelDescriptor], current: Option<&str>) {
        if models.is_empty() {
            println!("{}", "No models available.".yellow());
            return;
        }
        for model in models {
            let marker = if Some(model.id.as_str()) == current { "*" } else { " " };
            println!("  {} {}", marker.green(), model);
        }
    }
}
