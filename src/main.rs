//! blockfetch - rebuild a remote file from local data plus the ranges that changed

use blockfetch::backup::compute_backup_path;
use blockfetch::cancel::CancelFlag;
use blockfetch::cli::{Cli, Commands, ConfigArgs, FetchArgs, MakeArgs};
use blockfetch::config::Config;
use blockfetch::format;
use blockfetch::progress::ProgressTracker;
use blockfetch::recipe::{generate_recipe, write_recipe, RECIPE_EXTENSION};
use blockfetch::source::{load_recipe, open_source, resolve_data_location};
use blockfetch::sync::SyncEngine;
use blockfetch::uri::Location;
use clap::Parser;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    init_tracing(cli.verbose, cli.json);

    // Ctrl+C stops the pipeline at the next chunk or block
    let cancel = CancelFlag::new();
    let shutdown = setup_shutdown_handler(cancel.clone());

    match cli.command {
        Commands::Fetch(args) => {
            let config = args.to_config()?;
            tracing::info!(recipe = %args.recipe, "Starting fetch");
            tokio::task::spawn_blocking(move || run_fetch(args, config, cancel)).await??;
        }

        Commands::Make(args) => {
            tokio::task::spawn_blocking(move || run_make(args)).await??;
        }

        Commands::Config(args) => {
            handle_config_command(args)?;
        }
    }

    drop(shutdown);
    Ok(())
}

fn init_tracing(verbose: u8, json: bool) {
    let filter = match verbose {
        0 => EnvFilter::new("blockfetch=info"),
        1 => EnvFilter::new("blockfetch=debug"),
        2 => EnvFilter::new("blockfetch=trace"),
        _ => EnvFilter::new("trace"),
    };

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty())
            .init();
    }
}

fn setup_shutdown_handler(cancel: CancelFlag) -> tokio::sync::oneshot::Sender<()> {
    let (tx, rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("Received Ctrl+C, cancelling...");
                cancel.cancel();
            }
            _ = rx => {
                // Normal shutdown
            }
        }
    });

    tx
}

fn run_fetch(args: FetchArgs, config: Config, cancel: CancelFlag) -> anyhow::Result<()> {
    let recipe_location = Location::parse(&args.recipe)?;
    let loaded = load_recipe(&recipe_location, &config)?;
    let recipe = loaded.recipe;

    let target = match args.output {
        Some(path) => path,
        None => recipe.target_name()?,
    };
    let seed = match args.input {
        Some(path) => path,
        None => default_seed(&target, &config),
    };
    let data_location = resolve_data_location(&recipe_location, &recipe, args.url.as_deref())?;

    tracing::info!(
        target = %target.display(),
        seed = %seed.display(),
        source = %data_location,
        length = recipe.length,
        blocks = recipe.block_count(),
        "Synchronizing"
    );

    let mut source = open_source(&data_location, &config)?;
    let progress = ProgressTracker::new(config.progress);
    let mut engine = SyncEngine::new(recipe, source.as_mut(), config)
        .progress(&progress)
        .cancel(cancel)
        .recipe_bytes(loaded.bytes_downloaded);
    let report = engine.run(Some(&seed), &target)?;

    format::print_report(&target.display().to_string(), &report);
    Ok(())
}

/// The output file itself, or the copy a previous run moved aside
fn default_seed(target: &Path, config: &Config) -> PathBuf {
    if target.exists() {
        return target.to_path_buf();
    }
    let backup = compute_backup_path(target, config);
    if backup.exists() {
        backup
    } else {
        target.to_path_buf()
    }
}

fn run_make(args: MakeArgs) -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_default();
    let size = std::fs::metadata(&args.file)?.len();
    let block_size = match args.block_size {
        Some(size) => size as usize,
        None => config.effective_block_size(size),
    };

    tracing::info!(file = %args.file.display(), block_size, "Generating recipe");

    let mut recipe = generate_recipe(&args.file, block_size)?;
    recipe.url = Some(args.url.unwrap_or_else(|| recipe.filename.clone()));
    if let Some(filename) = args.filename {
        recipe.filename = filename;
    }
    if let Some(max_ranges) = args.max_ranges {
        recipe.max_ranges_per_request = max_ranges as usize;
    }

    let output = args.output.unwrap_or_else(|| {
        let mut name = OsString::from(args.file.as_os_str());
        name.push(".");
        name.push(RECIPE_EXTENSION);
        PathBuf::from(name)
    });
    write_recipe(&recipe, &output)?;

    println!(
        "Wrote {} ({} blocks of {}, target {})",
        output.display(),
        recipe.block_count(),
        format::format_size(recipe.block_size as u64),
        format::format_size(recipe.length)
    );
    Ok(())
}

fn handle_config_command(args: ConfigArgs) -> anyhow::Result<()> {
    if args.path {
        match Config::default_config_path() {
            Ok(path) => println!("{}", path.display()),
            Err(e) => eprintln!("Error: {}", e),
        }
    } else if args.init {
        let config = Config::default();
        config.save()?;
        println!(
            "Created default configuration at {}",
            Config::default_config_path()?.display()
        );
    } else {
        // Show current config
        let config = Config::load().unwrap_or_default();
        println!("{}", toml::to_string_pretty(&config)?);
    }
    Ok(())
}
