//! edgetier server
//!
//! Runs the tiered cache in front of an in-memory backing store loaded from a
//! seed file.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         edgetier                                │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │  HTTP routes │───▶│ CacheManager │───▶│ BackingStore │       │
//! │  │  (hyper)     │    │  (3 tiers)   │    │  (KvStore)   │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use edgetier::adapters::{InMemoryStore, LoggingEventPublisher};
use edgetier::{server, CacheManager, EdgeConfig, SeedData};

// =============================================================================
// CLI Arguments
// =============================================================================

/// edgetier - tiered cache for multi-tenant edge sites
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server bind address
    #[arg(long, env = "EDGETIER_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    listen_addr: String,

    /// YAML configuration file; defaults apply when omitted
    #[arg(long, env = "EDGETIER_CONFIG")]
    config: Option<PathBuf>,

    /// YAML seed file with templates and tenants
    #[arg(long, env = "EDGETIER_SEED")]
    seed: Option<PathBuf>,

    /// Override the base domain from the configuration file
    #[arg(long, env = "EDGETIER_BASE_DOMAIN")]
    base_domain: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    let mut config = match &args.config {
        Some(path) => EdgeConfig::from_yaml_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EdgeConfig::default(),
    };
    if let Some(domain) = &args.base_domain {
        config.base_domain = domain.clone();
    }

    info!("Starting edgetier");
    info!("  Base domain: {}", config.base_domain);
    info!(
        "  Local TTLs: tenant config {}s, template {}s, bound {}",
        config.tenant_config_ttl_secs, config.template_ttl_secs, config.local_max_entries
    );
    info!(
        "  Edge TTL: {}s, stale window {}s",
        config.edge_ttl_secs, config.edge_stale_window_secs
    );
    info!("  Shard lifetime: {}s", config.shard_lifetime_secs);

    let store = Arc::new(InMemoryStore::new());
    let manager = CacheManager::builder(config, store)
        .publisher(Arc::new(LoggingEventPublisher::info_level()))
        .build()
        .context("building cache manager")?;

    match &args.seed {
        Some(path) => {
            let seed = SeedData::from_yaml_file(path)
                .with_context(|| format!("loading seed {}", path.display()))?;
            let tenants = manager
                .store()
                .load_seed(&seed, manager.clock().now())
                .await
                .context("writing seed into backing store")?;
            info!("Loaded {} tenants from {}", tenants, path.display());
        }
        None => warn!("No seed file given, backing store starts empty"),
    }

    let addr: SocketAddr = args
        .listen_addr
        .parse()
        .with_context(|| format!("invalid listen address {}", args.listen_addr))?;

    tokio::select! {
        result = server::run(addr, manager.clone()) => {
            if let Err(e) = &result {
                error!("Edge server error: {}", e);
            }
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    manager.shutdown().await;
    info!("edgetier shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    if let Ok(directive) = "hyper=warn".parse() {
        filter = filter.add_directive(directive);
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
