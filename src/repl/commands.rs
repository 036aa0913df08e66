//! Slash commands understood by the chat REPL
//!
//! Anything not starting with `/` is a message for the model.

use colored::*;

/// REPL command types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    /// Drop the conversation history
    Clear,
    /// Show the prompt, or replace it with a preset or literal text
    System { prompt: Option<String> },
    /// List models, or switch to one
    Model { id: Option<String> },
    History,
    /// Attach a file to the next message
    Attach { path: Option<String> },
    /// Toggle web search; bare `/search` flips it
    Search { enable: Option<bool> },
    Quit,
    Unknown { input: String },
}

pub fn is_command(input: &str) -> bool {
    input.trim().starts_with('/')
}

/// Parse a slash command; the argument keeps its inner whitespace
pub fn parse(input: &str) -> Command {
    let trimmed = input.trim();
    let Some(body) = trimmed.strip_prefix('/') else {
        return Command::Unknown { input: input.to_string() };
    };

    let (name, rest) = match body.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (body, ""),
    };
    let argument = (!rest.is_empty()).then(|| rest.to_string());

    match name.to_lowercase().as_str() {
        "help" | "h" | "?" => Command::Help,
        "clear" | "reset" => Command::Clear,
        "system" => Command::System { prompt: argument },
        "model" => Command::Model { id: argument },
        "history" => Command::History,
        "attach" => Command::Attach { path: argument },
        "search" => {
            let enable = match rest.to_lowercase().as_str() {
                "" => None,
                "on" | "1" | "true" => Some(true),
                "off" | "0" | "false" => Some(false),
                _ => return Command::Unknown { input: input.to_string() },
            };
            Command::Search { enable }
        }
        "quit" | "exit" | "q" => Command::Quit,
        _ => Command::Unknown { input: input.to_string() },
    }
}

/// Display help information
pub fn show_help() {
    println!("\n{}", "Available Commands:".bold().cyan());
    println!("{}", "=".repeat(60).cyan());

    let commands = [
        ("/help", "Show this help message"),
        ("/clear", "Forget the conversation so far"),
        ("/system [preset|text]", "Show or replace the system prompt"),
        ("/model [id]", "List models or switch model"),
        ("/history", "Show the conversation"),
        ("/attach <path>", "Attach a file to the next message"),
        ("/search [on|off]", "Toggle web search grounding"),
        ("/quit", "Exit"),
    ];

    for (cmd, desc) in commands {
        println!("  {:<24} {}", cmd.green(), desc);
    }

    println!("\n{}", "Ctrl-C while the model is answering stops the reply.".dimmed());
    println!();
}
