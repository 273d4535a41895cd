//! pagewright - a multi-page static site build pipeline.

mod build;
mod cli;
mod config;
mod error;
mod logger;
mod mode;
mod pipeline;
mod reload;
mod serve;
mod utils;
mod watch;

use anyhow::{Result, bail};
use build::{Orchestrator, RebuildScope, build_site};
use clap::Parser;
use cli::{Cli, Commands};
use config::SiteConfig;
use error::{BuildError, error_chain};
use mode::BuildMode;
use reload::ReloadServer;
use serve::serve_site;
use std::{net::IpAddr, thread};
use watch::watch_for_changes_blocking;

fn main() -> Result<()> {
    let cli: &'static Cli = Box::leak(Box::new(Cli::parse()));
    let config: &'static SiteConfig = Box::leak(Box::new(SiteConfig::load(cli)?));

    match &cli.command {
        Commands::Build { .. } => build_once(config, cli.mode()),
        Commands::Serve { .. } => serve(config),
    }
}

fn build_once(config: &'static SiteConfig, mode: BuildMode) -> Result<()> {
    log!("build"; "{} build of {}", mode, config.get_root().display());
    build_site(config, mode).map(|_| ()).or_else(|err| fail(&err))
}

/// Development build, then live reload, watcher and HTTP server.
fn serve(config: &'static SiteConfig) -> Result<()> {
    let mode = BuildMode::Development;
    let interface: IpAddr = config.serve.interface.parse()?;
    let reload = ReloadServer::start(interface, config.serve.reload_port)?;

    let mut orchestrator = Orchestrator::new(config, mode).with_reload_port(config.serve.reload_port);
    if let Err(err) = orchestrator.run(RebuildScope::Full) {
        // keep serving: the next change retries with a full build
        log!("error"; "{}", error_chain(&err));
    }

    if config.serve.watch {
        thread::spawn(move || {
            if let Err(err) = watch_for_changes_blocking(config, orchestrator, Some(reload)) {
                log!("watch"; "{err:#}");
            }
        });
    }

    serve_site(config)
}

/// Report a failed build and turn it into the process error.
fn fail(err: &BuildError) -> Result<()> {
    log!("error"; "{}", error_chain(err));
    match err.culprit() {
        Some(culprit) => bail!("build failed at {culprit}"),
        None => bail!("build failed"),
    }
}
