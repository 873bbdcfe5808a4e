//! stompdeck - command-line control surface for the effects engine
//!
//! Subcommands:
//! - `stompdeck state` - Show the decoded program
//! - `stompdeck load <name>` - Load a preset and wait for the engine to confirm
//! - `stompdeck set <plugin> <param> <value>` - Write a parameter
//! - `stompdeck watch` - Follow the engine until Ctrl-C

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use stompconf::StompConfig;
use stompdeck::{
    Deck, HttpTransport, PollMode, Snapshot, StatusStrip, Transport, UpdateOrigin,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "stompdeck")]
#[command(about = "Control surface for a live effects engine")]
#[command(version)]
struct Cli {
    /// Config file (takes the place of ./stompdeck.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the active preset, chains and parameters
    State,

    /// List presets in display order
    Presets,

    /// Load a preset
    Load { name: String },

    /// Set a parameter (numeric, or a file selection for file parameters)
    Set {
        plugin: String,
        param: String,
        value: String,
    },

    /// Select a file for a file-type parameter
    File {
        plugin: String,
        param: String,
        value: String,
    },

    /// Flip a plugin's enabled flag
    Toggle { plugin: String },

    /// Save over a preset (the active one when no name is given)
    Save { name: Option<String> },

    /// Save the current state as a new preset
    SaveAs { name: String },

    /// Delete a preset
    Delete { name: String },

    /// Replace a chain's plugins, in order
    Chain { chain: String, items: Vec<String> },

    /// Release (unload) a plugin instance
    Release { plugin: String },

    /// One status-strip reading
    Status,

    /// Follow the engine until Ctrl-C
    Watch {
        /// live or research; remembered for next time
        #[arg(short, long)]
        mode: Option<PollMode>,
    },

    /// Print the effective configuration and where it came from
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, sources) = StompConfig::load_with_sources_from(cli.config.as_deref())
        .context("failed to load configuration")?;

    // RUST_LOG is already folded into log_level by the loader
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.infra.telemetry.log_level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Commands::Config = cli.command {
        print!("{}", config.to_toml());
        println!();
        for file in &sources.files {
            println!("# loaded: {}", file.display());
        }
        for var in &sources.env_overrides {
            println!("# env: {var}");
        }
        return Ok(());
    }

    if let Commands::Status = cli.command {
        let transport = HttpTransport::from_config(&config.infra.engine)?;
        return status(&transport).await;
    }

    let deck = Deck::from_config(&config).context("failed to create engine client")?;

    match cli.command {
        Commands::State => {
            deck.refresh(UpdateOrigin::Programmatic).await?;
            print_state(&deck.snapshot());
        }
        Commands::Presets => {
            deck.refresh(UpdateOrigin::Programmatic).await?;
            let snapshot = deck.snapshot();
            for name in &snapshot.presets {
                let marker = if snapshot.program.preset.as_deref() == Some(name.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!("{marker} {name}");
            }
        }
        Commands::Load { name } => {
            deck.select_preset(&name, UpdateOrigin::User)
                .await
                .with_context(|| format!("failed to load preset {name:?}"))?;
            println!("{}", deck.status());
        }
        Commands::Set {
            plugin,
            param,
            value,
        } => {
            deck.refresh(UpdateOrigin::Programmatic).await?;
            let confirmation = deck
                .commit_param(&plugin, &param, &value)
                .await
                .with_context(|| format!("failed to set {plugin}.{param}"))?;
            println!(
                "{plugin}.{param} = {} ({})",
                deck.snapshot().program.param(&plugin, &param).unwrap_or("?"),
                if confirmation.is_confirmed() { "confirmed" } else { "unconfirmed" }
            );
        }
        Commands::File {
            plugin,
            param,
            value,
        } => {
            deck.set_file_param(&plugin, &param, &value, UpdateOrigin::User)
                .await
                .with_context(|| format!("failed to set {plugin}.{param}"))?;
            println!("{}", deck.status());
        }
        Commands::Toggle { plugin } => {
            deck.refresh(UpdateOrigin::Programmatic).await?;
            let enabled = deck
                .toggle_plugin(&plugin)
                .await
                .with_context(|| format!("failed to toggle {plugin}"))?;
            println!("{plugin}: {}", if enabled { "on" } else { "off" });
        }
        Commands::Save { name } => {
            deck.refresh(UpdateOrigin::Programmatic).await?;
            let saved = deck.save_preset(name.as_deref()).await?;
            println!("saved {saved}");
        }
        Commands::SaveAs { name } => {
            let saved = deck.save_preset_as(&name).await?;
            println!("saved as {saved}");
        }
        Commands::Delete { name } => {
            deck.delete_preset(&name).await?;
            println!("deleted {name}");
        }
        Commands::Chain { chain, items } => {
            deck.set_chain(&chain, &items)
                .await
                .with_context(|| format!("failed to set chain {chain}"))?;
            let snapshot = deck.snapshot();
            println!("{chain}: {}", snapshot.program.chain(&chain).unwrap_or_default().join(" "));
        }
        Commands::Release { plugin } => {
            deck.release_plugin(&plugin).await?;
            println!("released {plugin}");
        }
        Commands::Watch { mode } => watch(deck, mode).await?,
        Commands::Status | Commands::Config => {}
    }

    Ok(())
}

async fn status(transport: &HttpTransport) -> Result<()> {
    let (system, preset) = futures::future::try_join(transport.system(), transport.current_preset())
        .await
        .context("failed to reach engine")?;

    println!("{}", StatusStrip::from(&system));
    println!("preset: {}", preset.as_deref().unwrap_or("-"));
    for error in &system.errors {
        println!("  ! {error}");
    }
    Ok(())
}

fn print_state(snapshot: &Snapshot) {
    println!("preset: {}", snapshot.program.preset.as_deref().unwrap_or("-"));
    for (chain, members) in &snapshot.program.chains {
        println!("chain {chain}: {}", members.join(" "));
    }
    for (slot, plugin) in &snapshot.program.slots {
        println!("slot {slot}: {plugin}");
    }
    for (plugin, params) in &snapshot.program.params {
        println!("{plugin}");
        for (name, value) in params {
            println!("  {name} = {value}");
        }
    }
    for (name, section) in [
        ("program", &snapshot.program_section),
        ("config", &snapshot.config_section),
        ("presets", &snapshot.presets_section),
    ] {
        if let Some(error) = &section.error {
            println!("! {name} dump failed: {error}");
        }
    }
}

async fn watch(deck: Deck, mode: Option<PollMode>) -> Result<()> {
    let deck = Arc::new(deck);
    match mode {
        Some(mode) => {
            deck.set_poll_mode(mode).await?;
            deck.refresh(UpdateOrigin::Programmatic).await?;
        }
        None => {
            deck.start().await?;
        }
    }
    info!(mode = %deck.poll_mode(), "watching, Ctrl-C to stop");

    let mut snapshots = deck.subscribe();
    let mut strips = deck.status_strip();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                println!(
                    "[{}] preset {} ({} chains)",
                    snapshot.origin,
                    snapshot.program.preset.as_deref().unwrap_or("-"),
                    snapshot.program.chains.len()
                );
            }
            changed = strips.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(strip) = strips.borrow_and_update().clone() {
                    println!("{strip}");
                }
            }
        }
    }

    deck.shutdown();
    Ok(())
}
