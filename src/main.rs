use clap::Parser;
use eyre::format_err;
use log::{error, info};
use std::process::exit;
use std::sync::Arc;
use tokio::{
    select,
    signal::unix::{SignalKind, signal},
};
use tokio_util::sync::CancellationToken;

use frpsync::{
    client::AdminClient,
    fleet::{DnsResolver, DomainWatcher},
    sync::Synchronizer,
};

pub mod config;

/// Proxy configuration synchronizer
#[derive(Parser)]
#[command(version = VERSION, about, long_about = ABOUT)]
struct Cli {
    /// log filters (see https://docs.rs/env_logger/latest/env_logger/index.html#enabling-logging)
    #[arg(long, default_value = "info", env = "FRPSYNC_LOG")]
    log: String,
    /// log style (see https://docs.rs/env_logger/latest/env_logger/index.html#disabling-colors)
    #[arg(long, default_value = "auto", env = "FRPSYNC_LOG_STYLE")]
    log_style: String,

    /// Config file path.
    #[arg(long, short = 'c', default_value = "config.yaml")]
    config: String,

    /// Admin password of the fleet, overriding the config file's.
    #[arg(long, env = "FRPSYNC_ADMIN_PASSWORD", hide_env_values = true)]
    admin_password: Option<String>,

    /// Test the config and exit.
    #[arg(long)]
    test_config: bool,
}

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_COMMIT"), ")");

const ABOUT: &str = r#"
Proxy configuration synchronizer

Keep every member of a proxy server fleet, found by resolving a DNS name,
configured with the desired proxies:
- grouped proxies are written to every member
- other proxies are written to exactly one member
"#;

type Tasks = tokio::task::JoinSet<(String, eyre::Result<()>)>;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();

    env_logger::builder()
        .parse_filters(cli.log.as_str())
        .parse_write_style(cli.log_style.as_str())
        .format_timestamp_millis()
        .init();

    use config::*;
    let config = tokio::fs::read(&cli.config)
        .await
        .map_err(|e| format_err!("read config failed: {}: {e}", cli.config))?;
    let mut config: Config =
        serde_yaml::from_slice(&config).map_err(|e| format_err!("parse config failed: {e}"))?;

    if let Some(password) = cli.admin_password {
        config.fleet.admin_password = password;
    }
    if config.fleet.host.is_empty() {
        return Err(format_err!("fleet.host is required"));
    }

    if cli.test_config {
        return Ok(());
    }

    let cancel = CancellationToken::new();

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            let (mut sigterm, mut sigint) =
                match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                    (Ok(term), Ok(int)) => (term, int),
                    (Err(e), _) | (_, Err(e)) => {
                        error!("signal setup failed: {e}");
                        return;
                    }
                };
            select! {
                _ = sigterm.recv() => info!("received SIGTERM"),
                _ = sigint.recv() => info!("received SIGINT"),
            };
            cancel.cancel();
        }
    });

    let http = reqwest::Client::builder()
        .timeout(config.fleet.request_timeout())
        .build()
        .map_err(|e| format_err!("http client setup failed: {e}"))?;

    let sync_interval = config.sync_interval();
    let admin_port = config.fleet.admin_port;
    let credentials = config.fleet.credentials();

    info!(
        "fleet at {} (admin port {admin_port}, user {})",
        config.fleet.host, credentials.user
    );

    let sync = Arc::new(Synchronizer::new(move |ip| {
        AdminClient::new(http.clone(), ip, admin_port, credentials.clone())
    }));

    if !config.common.is_empty() {
        sync.set_common(config.common).await;
    }
    for (owner, proxies) in config.proxies {
        info!("{owner}: {} static proxies", proxies.len());
        sync.set_proxies(owner, proxies).await;
    }

    let mut tasks = Tasks::new();
    let mut services = Services { tasks: &mut tasks };

    services.spawn_task("sync".into(), {
        let sync = sync.clone();
        let cancel = cancel.clone();
        async move {
            sync.run(sync_interval, cancel).await;
            Ok(())
        }
    });

    services.spawn_task(format!("fleet:{}", config.fleet.host), {
        let watcher = DomainWatcher::new(config.fleet.host.clone(), DnsResolver);
        let interval = config.fleet.resolve_interval();
        let cancel = cancel.clone();
        async move {
            watcher.watch(sync, interval, cancel).await;
            Ok(())
        }
    });

    while let Some(res) = tasks.join_next().await {
        match res {
            Err(e) => {
                error!("task wait failed: {e}");
            }
            Ok((name, Ok(_))) if cancel.is_cancelled() => {
                info!("task {name} finished");
                continue;
            }
            Ok((name, Ok(_))) => {
                error!("task {name} finished unexpectedly");
            }
            Ok((name, Err(e))) => {
                error!("task {name} finished with error: {e}");
            }
        }
        exit(1);
    }

    info!("all tasks finished");
    Ok(())
}

struct Services<'t> {
    tasks: &'t mut Tasks,
}

impl<'t> Services<'t> {
    fn spawn_task<F>(&mut self, task_name: String, task: F)
    where
        F: Future<Output = eyre::Result<()>>,
        F: Send + 'static,
    {
        info!("{task_name}: starting");
        self.tasks.spawn(async move { (task_name, task.await) });
    }
}
