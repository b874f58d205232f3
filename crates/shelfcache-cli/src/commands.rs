//! Command implementations. Each run is one host "session": it builds a
//! disk-backed cache manager from the configuration and drives one lifecycle
//! event.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use shelfcache_core::store::record::age_display;
use shelfcache_core::{
    CacheHandle, CacheManager, CacheStore, Config, DiskCacheStore, HttpNetwork, ResourceRequest,
};
use tracing::{debug, info};

use crate::args::{Cli, Commands, ConfigAction, FetchArgs};

type DiskManager = CacheManager<DiskCacheStore, HttpNetwork>;

/// Configuration plus the path it came from.
struct Loaded {
    config: Config,
    path: PathBuf,
}

fn load_config(cli: &Cli) -> Result<Loaded> {
    let path = match cli.config {
        Some(ref path) => path.clone(),
        None => Config::config_path()?,
    };
    let mut config = Config::load_from(&path)?;
    if let Some(ref origin) = cli.origin {
        config.origin = Some(origin.clone());
    }
    Ok(Loaded { config, path })
}

fn open_store(config: &Config) -> Result<Arc<DiskCacheStore>> {
    let dir = config.cache_dir()?;
    let store = DiskCacheStore::new(dir.clone())
        .with_context(|| format!("Failed to open cache store at {}", dir.display()))?;
    Ok(Arc::new(store))
}

fn build_manager(config: &Config, store: Arc<DiskCacheStore>) -> Result<DiskManager> {
    let network = HttpNetwork::new(config.origin.as_deref(), config.request_timeout())
        .context("Failed to create HTTP client")?;
    Ok(CacheManager::new(
        config.generation.clone(),
        config.manifest.clone(),
        store,
        Arc::new(network),
    ))
}

pub async fn run(cli: Cli) -> Result<()> {
    let loaded = load_config(&cli)?;
    debug!(path = %loaded.path.display(), generation = %loaded.config.generation, "Loaded configuration");

    match cli.command {
        Commands::Install => install(&loaded.config).await,
        Commands::Activate => activate(&loaded.config).await,
        Commands::Fetch(ref args) => fetch(&loaded.config, args).await,
        Commands::Generations => generations(&loaded.config).await,
        Commands::Config(ref args) => config(&loaded, &args.action),
    }
}

async fn install(config: &Config) -> Result<()> {
    let manager = build_manager(config, open_store(config)?)?;
    let ready = manager
        .on_install()
        .await
        .with_context(|| format!("Install of {} failed", config.generation))?;
    println!(
        "Installed {}: {} resource(s) precached",
        ready.generation, ready.cached
    );
    Ok(())
}

async fn activate(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let before = store.list_generation_names().await?;

    let manager = build_manager(config, store.clone())?;
    // Resuming already evicts; on_activate then claims clients
    if !manager.resume().await {
        bail!(
            "Generation {} is not installed. Run `shelfcache install` first.",
            config.generation
        );
    }
    let report = manager.on_activate().await?;

    let after = store.list_generation_names().await?;
    println!("Activated {}", manager.generation());
    for name in before.difference(&after) {
        println!("  deleted {}", name);
    }
    for (name, err) in &report.failed {
        println!("  failed to delete {}: {}", name, err);
    }
    Ok(())
}

async fn fetch(config: &Config, args: &FetchArgs) -> Result<()> {
    let manager = build_manager(config, open_store(config)?)?;
    if !manager.resume().await {
        info!(generation = %config.generation, "Generation not active, requests bypass the cache");
    }

    let mut failures = 0;
    let mut stdout = std::io::stdout();
    for url in &args.urls {
        match manager.on_fetch(&ResourceRequest::get(url.as_str())).await {
            Some(response) => {
                eprintln!("{} {} ({} bytes)", response.status, url, response.body.len());
                if args.body {
                    stdout.write_all(&response.body)?;
                    stdout.flush()?;
                }
            }
            None => {
                failures += 1;
                eprintln!("FAILED {}", url);
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} request(s) failed", failures, args.urls.len());
    }
    Ok(())
}

async fn generations(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let names = store.list_generation_names().await?;
    if names.is_empty() {
        println!("No cache generations");
        return Ok(());
    }

    for name in names {
        let marker = if name == config.generation { "*" } else { " " };
        let records = store.open(&name).await?.keys().await?;
        let newest = records
            .iter()
            .map(|r| r.stored_at)
            .max()
            .map(age_display)
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{} {:<24} {:>5} record(s)  updated {}",
            marker,
            name,
            records.len(),
            newest
        );
    }
    Ok(())
}

fn config(loaded: &Loaded, action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Path => println!("{}", loaded.path.display()),
        ConfigAction::Show => println!("{}", serde_json::to_string_pretty(&loaded.config)?),
        ConfigAction::Init { force } => {
            if loaded.path.exists() && !force {
                bail!(
                    "Config file already exists at {} (use --force to overwrite)",
                    loaded.path.display()
                );
            }
            Config::default().save_to(&loaded.path)?;
            println!("Wrote {}", loaded.path.display());
        }
    }
    Ok(())
}
