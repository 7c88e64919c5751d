use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use colored::Colorize;
use stash_config::{resolve, ConfigRevision, ResolvedConfig, StorageConfig};
use stash_server::StashServer;
use stash_service::{BackgroundTasks, StorageService};
use stash_types::SystemClock;
use tokio::time::{interval, MissedTickBehavior};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => cmd_serve(args),
        Command::Config(args) => match args.action {
            ConfigAction::Check { path } => cmd_config_check(&path),
            ConfigAction::Show { path } => cmd_config_show(&path),
        },
    }
}

fn load(path: &Path) -> anyhow::Result<(StorageConfig, ConfigRevision)> {
    let (doc, text) =
        StorageConfig::load(path).with_context(|| format!("loading {}", path.display()))?;
    Ok((doc, ConfigRevision::of_document(&text)))
}

fn load_resolved(path: &Path) -> anyhow::Result<(ResolvedConfig, ConfigRevision)> {
    let (doc, revision) = load(path)?;
    let resolved = resolve(&doc).with_context(|| format!("resolving {}", path.display()))?;
    Ok((resolved, revision))
}

fn cmd_config_check(path: &Path) -> anyhow::Result<()> {
    let (resolved, revision) = load_resolved(path)?;
    println!(
        "{} {} is valid ({} backends, {} namespaces, revision {})",
        "✓".green().bold(),
        path.display().to_string().bold(),
        resolved.backends.len(),
        resolved.namespaces.len(),
        revision.as_str().cyan(),
    );
    Ok(())
}

fn cmd_config_show(path: &Path) -> anyhow::Result<()> {
    let (resolved, revision) = load_resolved(path)?;
    println!("Host: {}", resolved.host.to_string().bold());
    println!("Revision: {}", revision.as_str().cyan());
    println!("Listen: {}", resolved.server.bind_addr);
    for (id, ns) in &resolved.namespaces {
        let kind = ns
            .backend
            .kind
            .map(|k| format!("{k:?}").to_lowercase())
            .unwrap_or_else(|| "unset".into());
        println!("\n{}", id.to_string().yellow().bold());
        println!("  backend:   {} ({kind})", ns.backend.id);
        if !ns.config.prefix.is_empty() {
            println!("  prefix:    {}", ns.config.prefix);
        }
        println!("  aliases:   {}", if ns.config.enable_aliases { "on".green() } else { "off".dimmed() });
        println!("  redirects: {}", if ns.backend.redirects_enabled() { "on".green() } else { "off".dimmed() });
        println!(
            "  gc:        every {}h, delay {}h",
            ns.config.gc_frequency_hours, ns.config.gc_delay_hours
        );
    }
    Ok(())
}

fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
    runtime.block_on(serve(args))
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let (mut doc, revision) = load(&args.config)?;
    if let Some(bind) = &args.bind {
        doc.server.bind_addr = bind
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid --bind address {bind:?}"))?;
    }
    let override_bind = args.bind.is_some().then_some(doc.server.bind_addr);

    let service = Arc::new(StorageService::from_config(&doc, revision, Arc::new(SystemClock))?);
    let snapshot = service.registry().snapshot();
    println!(
        "{} stash {} on {} ({} namespaces, revision {})",
        "✓".green().bold(),
        service.instance_id().bold(),
        snapshot.config.server.bind_addr,
        snapshot.namespaces.len(),
        snapshot.revision.as_str().cyan(),
    );

    let tasks = (!args.no_background).then(|| BackgroundTasks::spawn(&service));
    let poll = snapshot.config.gc.config_poll_interval();
    let watcher = tokio::spawn(watch_config(service.clone(), args.config.clone(), poll, override_bind));

    let result = StashServer::new(service)
        .serve_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutdown requested");
        })
        .await;

    watcher.abort();
    if let Some(tasks) = tasks {
        tasks.shutdown().await;
    }
    result?;
    println!("{} stash stopped", "✓".green());
    Ok(())
}

/// Re-read the configuration file and apply it whenever its content changes.
async fn watch_config(service: Arc<StorageService>, path: PathBuf, period: Duration, bind: Option<SocketAddr>) {
    let mut ticker = interval(period.max(Duration::from_secs(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let (mut doc, revision) = match load(&path) {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "configuration reload failed");
                continue;
            }
        };
        if let Some(bind) = bind {
            doc.server.bind_addr = bind;
        }
        match service.update_config(&doc, revision.clone()) {
            Ok(true) => tracing::info!(revision = %revision, "configuration reloaded"),
            Ok(false) => {}
            Err(e) => tracing::warn!(revision = %revision, error = %e, "configuration rejected"),
        }
    }
}
