//! CLI module for localchat
//!
//! Handles command-line argument parsing. Configuration lives in
//! `crate::config`; the interactive loop in `crate::repl`.

pub mod args;

pub use args::{Args, Commands, Verbosity};
