use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use gatekeep::authz::engine::{self, Resolver};
use gatekeep::authz::loader;
use gatekeep::authz::types::Principal;
use gatekeep::authz::watcher::ConfigWatcher;
use gatekeep::authz::web::{self, ApiState};
use gatekeep::settings::Settings;
use miette::Result;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "gatekeep",
    version,
    about = "Identity-to-permission resolution engine"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the access decision API (default)
    Serve,
    /// Build a snapshot from the policy directory and report problems
    Check,
    /// Evaluate a single request against the policy directory
    Authorize {
        principal: String,
        verb: String,
        resource: String,
        #[arg(long, default_value = "")]
        api_group: String,
        /// Companion templating value, e.g. an instance name
        #[arg(long)]
        instance: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings).await,
        Command::Check => check(&settings),
        Command::Authorize {
            principal,
            verb,
            resource,
            api_group,
            instance,
        } => {
            let snapshot = loader::load_snapshot(&settings.authz.policies_dir)?;
            let principal = Principal {
                id: principal,
                instance,
            };
            let decision = engine::authorize(&snapshot, &principal, &verb, &resource, &api_group);
            println!(
                "{}: {}",
                if decision.is_allowed() { "allow" } else { "deny" },
                decision.reason()
            );
            Ok(())
        }
    }
}

async fn serve(settings: Settings) -> Result<()> {
    let resolver = Arc::new(Resolver::new());
    let policies_dir = settings.authz.policies_dir.clone();

    let reload = if settings.authz.watch {
        let watcher = ConfigWatcher::new(
            &policies_dir,
            resolver.clone(),
            Duration::from_millis(settings.authz.debounce_ms),
        );
        // A bad initial load leaves the API answering 503 until the files are fixed
        let _ = watcher.reload();
        let status = watcher.status();
        tokio::spawn(async move {
            if let Err(e) = watcher.run().await {
                tracing::error!("policy watcher stopped: {e}");
            }
        });
        Some(status)
    } else {
        resolver.publish(loader::load_snapshot(&policies_dir)?);
        None
    };

    web::serve(&settings, ApiState { resolver, reload }).await
}

fn check(settings: &Settings) -> Result<()> {
    let snapshot = loader::load_snapshot(&settings.authz.policies_dir)?;
    println!(
        "ok: {} identity mappings, {} bindings, {} roles, {} rules",
        snapshot.identities.len(),
        snapshot.bindings.len(),
        snapshot.catalog.len(),
        snapshot.catalog.rule_count()
    );
    for warning in &snapshot.warnings {
        println!("warning: {warning}");
    }
    Ok(())
}
