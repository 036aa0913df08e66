//! localchat - Main CLI Entry Point

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use indicatif::ProgressBar;
use std::sync::Arc;
use std::time::Duration;

use localchat::{
    chat::ChatOrchestrator,
    cli::{Args, Commands, Verbosity},
    config::{Config, PROVIDER_PRESETS, SYSTEM_PROMPT_PRESETS},
    providers::{ConfiguredProviders, ConnectionStatus, ProviderFactory, ProviderHandle, ProviderKind},
    repl::{ReplConfig, ReplSession},
    search::DuckDuckGoSearch,
    session::{SessionSettings, SessionStore, DEFAULT_TITLE},
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbosity());

    let command = args.command();
    // Runs before loading so a missing or broken file can be replaced
    if let Commands::Config { init: true, preset, force } = &command {
        return init_config(&args, preset.as_deref(), *force);
    }

    let config = Config::load(args.config.clone())?;
    tracing::debug!(provider = %config.defaults.provider, "Configuration loaded");

    match command {
        Commands::Chat {
            provider,
            model,
            system,
            search,
        } => run_chat(&args, config, provider, model, system, search).await?,
        Commands::Models { provider } => list_models(&config, provider).await?,
        Commands::Info { model, provider } => show_model_info(&config, provider, &model).await?,
        Commands::Test { provider } => test_connection(&config, provider).await?,
        Commands::Presets => show_presets(),
        Commands::Config { .. } => show_config(&args, &config)?,
    }

    Ok(())
}

/// Logs go to stderr; `RUST_LOG` wins over the -v/-q flags
fn init_logging(verbosity: Verbosity) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(verbosity.filter_directive()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn provider_for(config: &Config, kind: Option<ProviderKind>) -> Result<ProviderHandle> {
    let kind = kind.unwrap_or(config.defaults.provider);
    let settings = SessionSettings::for_provider(kind, config);
    Ok(ConfiguredProviders::new(config.clone()).provider_for(&settings)?)
}

async fn run_chat(
    args: &Args,
    config: Config,
    provider: Option<ProviderKind>,
    model: Option<String>,
    system: Option<String>,
    search: bool,
) -> Result<()> {
    let kind = provider.unwrap_or(config.defaults.provider);
    let mut settings = SessionSettings::for_provider(kind, &config);
    if model.is_some() {
        settings.model = model;
    }

    let providers = ConfiguredProviders::new(config.clone());

    // No model configured: take the first one the provider offers
    if settings.model.is_none() {
        let adapter = providers.provider_for(&settings)?;
        match adapter.list_models().await {
            Ok(models) => match models.first() {
                Some(first) => {
                    println!("{} {}", "Using model".dimmed(), first.id.cyan());
                    settings.model = Some(first.id.clone());
                }
                None => eprintln!(
                    "{}: no models available; pick one with /model <id>",
                    "Warning".yellow()
                ),
            },
            Err(e) => eprintln!("{}: {}", "Warning".yellow(), e.user_message()),
        }
    }

    let system_prompt = match system {
        Some(prompt) => localchat::config::system_prompt_preset(&prompt)
            .map(str::to_string)
            .unwrap_or(prompt),
        None => config.default_system_prompt(),
    };

    let store = SessionStore::new();
    let session = store.create(DEFAULT_TITLE, &system_prompt, settings).await;

    let mut orchestrator = ChatOrchestrator::new(store, Arc::new(providers), &config);
    match DuckDuckGoSearch::new() {
        Ok(backend) => orchestrator = orchestrator.with_search(Arc::new(backend)),
        Err(e) => tracing::warn!(error = %e, "Web search unavailable"),
    }

    let repl_config = ReplConfig {
        history_path: ReplConfig::default_history_path(),
        show_progress: args.verbosity().show_progress(),
        web_search: search,
    };

    let mut repl = ReplSession::new(orchestrator, session.id, repl_config)?;
    repl.run().await
}

async fn list_models(config: &Config, kind: Option<ProviderKind>) -> Result<()> {
    let provider = provider_for(config, kind)?;

    println!("\nChecking {} models at {}...\n", provider.kind(), provider.base_url());

    match provider.list_models().await {
        Ok(models) => {
            if models.is_empty() {
                println!("No models available.");
                if provider.kind() == ProviderKind::Local {
                    println!("\nPull a model with:");
                    println!("  ollama pull llama3.1:8b");
                }
            } else {
                println!("Available models:");
                for model in models {
                    println!("  • {}", model);
                }
            }
            println!();
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e.user_message());
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn show_model_info(config: &Config, kind: Option<ProviderKind>, model: &str) -> Result<()> {
    let provider = provider_for(config, kind)?;

    match provider.get_model_info(model).await {
        Ok(info) => {
            println!("\n{}", info.name.bold().cyan());
            println!("  Id:           {}", info.id);
            println!("  Provider:     {}", info.provider);
            if let Some(params) = &info.parameter_count {
                println!("  Parameters:   {}", params);
            }
            if let Some(quant) = &info.quantization {
                println!("  Quantization: {}", quant);
            }
            if let Some(ctx) = info.context_length {
                println!("  Context:      {} tokens", ctx);
            }
            if let Some(size) = info.size_bytes {
                println!("  Size:         {}", localchat::models::format_size(size));
            }
            println!();
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e.user_message());
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn test_connection(config: &Config, kind: Option<ProviderKind>) -> Result<()> {
    let provider = provider_for(config, kind)?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_message(format!("Connecting to {}...", provider.base_url()));
    spinner.enable_steady_tick(Duration::from_millis(100));
    let status = provider.validate_connection().await;
    spinner.finish_and_clear();

    match status {
        ConnectionStatus::Connected => {
            println!("{} {} at {}", "✓".green(), provider.kind(), provider.base_url());
            Ok(())
        }
        ConnectionStatus::Failed(reason) => {
            println!("{} {} at {}: {}", "✗".red(), provider.kind(), provider.base_url(), reason);
            std::process::exit(1);
        }
    }
}

fn show_presets() {
    println!("\n{}", "System prompts:".bold().cyan());
    for (name, prompt) in SYSTEM_PROMPT_PRESETS {
        println!("  {:<10} {}", name.green(), prompt.dimmed());
    }

    println!("\n{}", "Remote providers:".bold().cyan());
    for preset in PROVIDER_PRESETS {
        let key_note = if preset.requires_key { "API key required" } else { "no key" };
        println!(
            "  {:<11} {:<13} {} ({})",
            preset.key.green(),
            preset.name,
            preset.base_url,
            key_note.dimmed()
        );
    }
    println!();
}

fn show_config(args: &Args, config: &Config) -> Result<()> {
    let path = args.config.clone().or_else(Config::default_path);

    let mut shown = config.clone();
    if shown.remote.api_key.is_some() {
        shown.remote.api_key = Some("********".to_string());
    }

    println!("\n{}", "localchat configuration".bold().cyan());
    if let Some(path) = path {
        let state = if path.exists() { "" } else { " (not found, using defaults)" };
        println!("{}", format!("# {}{}", path.display(), state).dimmed());
    }
    println!("{}", toml::to_string_pretty(&shown)?);
    println!("Verbosity: {}", args.verbosity().as_str());

    Ok(())
}

fn init_config(args: &Args, preset: Option<&str>, force: bool) -> Result<()> {
    let path = args
        .config
        .clone()
        .or_else(Config::default_path)
        .ok_or_else(|| anyhow::anyhow!("No home directory; pass --config <path>"))?;

    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }

    let mut config = Config::default();
    if let Some(key) = preset {
        let preset = config.apply_provider_preset(key)?;
        println!("Remote provider: {} ({})", preset.name.cyan(), preset.base_url);
        if preset.requires_key {
            println!(
                "{} set LOCALCHAT_API_KEY or add api_key under [remote]",
                "Note:".yellow()
            );
        }
    }

    config.save(&path)?;
    println!("{} Wrote {}", "✓".green(), path.display());
    Ok(())
}
