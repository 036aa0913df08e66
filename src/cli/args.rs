//! Command-line argument parsing for localchat
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::providers::ProviderKind;

/// localchat - chat with local or OpenAI-compatible language models
#[derive(Parser, Debug)]
#[command(name = "localchat")]
#[command(version)]
#[command(about = "Streaming terminal chat for local and OpenAI-compatible models", long_about = None)]
pub struct Args {
    /// Configuration file path (default: ~/.localchat/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level: -v (info), -vv (debug), -vvv (trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand (defaults to `chat`)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Start an interactive chat session
    Chat {
        /// Provider to talk to: local or remote
        #[arg(short, long)]
        provider: Option<ProviderKind>,

        /// Model id
        #[arg(short, long)]
        model: Option<String>,

        /// System prompt preset name or literal prompt text
        #[arg(short, long)]
        system: Option<String>,

        /// Ground answers with web search results
        #[arg(long)]
        search: bool,
    },

    /// List models offered by a provider
    Models {
        #[arg(short, long)]
        provider: Option<ProviderKind>,
    },

    /// Show metadata for one model
    Info {
        /// Model id
        model: String,

        #[arg(short, long)]
        provider: Option<ProviderKind>,
    },

    /// Check that a provider is reachable
    Test {
        #[arg(short, long)]
        provider: Option<ProviderKind>,
    },

    /// List built-in system prompts and remote provider presets
    Presets,

    /// Display current configuration, or write a starter file with --init
    Config {
        /// Write a default config file to the config path
        #[arg(long)]
        init: bool,

        /// Remote provider preset to point the new file at (see `presets`)
        #[arg(long, requires = "init")]
        preset: Option<String>,

        /// Overwrite an existing file
        #[arg(long, requires = "init")]
        force: bool,
    },
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    Debug,
    Trace,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                2 => Verbosity::Debug,
                _ => Verbosity::Trace,
            }
        }
    }

    /// Subcommand to run; bare `localchat` starts a chat
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Chat {
            provider: None,
            model: None,
            system: None,
            search: false,
        })
    }
}

impl Verbosity {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "quiet",
            Verbosity::Normal => "normal",
            Verbosity::Verbose => "verbose",
            Verbosity::Debug => "debug",
            Verbosity::Trace => "trace",
        }
    }

    /// Default log directive when `RUST_LOG` is unset
    pub fn filter_directive(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "localchat=error",
            Verbosity::Normal => "localchat=warn",
            Verbosity::Verbose => "localchat=info",
            Verbosity::Debug => "localchat=debug",
            Verbosity::Trace => "localchat=trace",
        }
    }

    /// Check if should show the waiting spinner
    pub fn show_progress(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(parse(&["localchat"]).verbosity(), Verbosity::Normal);
        assert_eq!(parse(&["localchat", "-q"]).verbosity(), Verbosity::Quiet);
        assert_eq!(parse(&["localchat", "-v"]).verbosity(), Verbosity::Verbose);
        assert_eq!(parse(&["localchat", "-vv"]).verbosity(), Verbosity::Debug);
        assert_eq!(parse(&["localchat", "-vvvv"]).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_quiet_wins_over_verbose() {
        assert_eq!(parse(&["localchat", "-q", "-vv"]).verbosity(), Verbosity::Quiet);
    }

    #[test]
    fn test_default_command_is_chat() {
        let args = parse(&["localchat"]);
        assert!(matches!(args.command(), Commands::Chat { provider: None, search: false, .. }));
    }

    #[test]
    fn test_chat_options() {
        let args = parse(&[
            "localchat", "chat", "--provider", "remote", "-m", "gpt-4o", "-s", "concise", "--search",
        ]);
        assert_eq!(
            args.command(),
            Commands::Chat {
                provider: Some(ProviderKind::Remote),
                model: Some("gpt-4o".to_string()),
                system: Some("concise".to_string()),
                search: true,
            }
        );
    }

    #[test]
    fn test_provider_aliases() {
        let args = parse(&["localchat", "models", "-p", "ollama"]);
        assert_eq!(args.command(), Commands::Models { provider: Some(ProviderKind::Local) });
        assert!(Args::try_parse_from(["localchat", "models", "-p", "nowhere"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = parse(&["localchat", "info", "llama3.1:8b", "-v", "--config", "/tmp/c.toml"]);
        assert_eq!(args.verbosity(), Verbosity::Verbose);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(args.command(), Commands::Info { ref model, .. } if model == "llama3.1:8b"));
    }

    #[test]
    fn test_config_init_options() {
        assert_eq!(
            parse(&["localchat", "config"]).command(),
            Commands::Config { init: false, preset: None, force: false }
        );
        assert_eq!(
            parse(&["localchat", "config", "--init", "--preset", "groq"]).command(),
            Commands::Config { init: true, preset: Some("groq".to_string()), force: false }
        );
        assert!(Args::try_parse_from(["localchat", "config", "--preset", "groq"]).is_err());
    }

    #[test]
    fn test_verbosity_methods() {
        assert!(!Verbosity::Quiet.show_progress());
        assert!(Verbosity::Normal.show_progress());
        assert_eq!(Verbosity::Debug.filter_directive(), "localchat=debug");
        assert_eq!(Verbosity::Trace.as_str(), "trace");
    }
}
