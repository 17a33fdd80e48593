mod cli;

use std::io::{self, IsTerminal};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use url::Url;

use oxyping::config::{ProbeOptions, Target, load_config, parse_address};
use oxyping::dns::DnsResolver;
use oxyping::pinger::Pinger;
use oxyping::probe::{self, ProbeSettings};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = cli::Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.verbose { "debug" } else { "warn" }),
    )
    .init();

    run(cli).await
}

async fn run(cli: cli::Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;
    cli.apply(&mut config);

    let address = parse_address(&cli.address, cli.port)?;
    let proxy = config
        .proxy
        .as_deref()
        .map(Url::parse)
        .transpose()
        .context("invalid proxy url")?;
    let resolver = if config.dns_hosts.is_empty() {
        None
    } else {
        Some(Arc::new(DnsResolver::from_servers(&config.dns_hosts)?))
    };

    let target = Target {
        protocol: address.protocol,
        host: address.host,
        port: address.port,
        url: address.url,
        proxy,
        counter: config.counter,
        interval: config.interval,
        timeout: config.timeout,
    };
    let options = ProbeOptions {
        resolver,
        user_agent: config.user_agent.clone(),
        insecure: config.insecure,
        ..Default::default()
    };

    let settings = ProbeSettings {
        method: config.http_method.clone(),
        meta: config.meta,
    };
    let probe = probe::build(&target, options, &settings)
        .with_context(|| format!("cannot probe {target}"))?;

    let stdout = io::stdout();
    let colored = stdout.is_terminal();
    let mut pinger = Pinger::new(
        stdout,
        target.to_string(),
        probe,
        target.interval,
        target.counter,
    )
    .colored(colored);

    let handle = pinger.handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        log::debug!("interrupted, stopping");
        handle.stop();
    });

    pinger.run().await.context("failed to write probe result")?;
    pinger.summarize().context("failed to write summary")?;
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            log::warn!("failed to listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                log::warn!("failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
