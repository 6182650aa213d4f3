//! `darkstar-master`: standalone master server.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::sync::mpsc;
use tracing::{error, info, Level};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

use darkstar_query::config::MasterConfig;
use darkstar_query::error::Result;
use darkstar_query::master::MasterServer;

/// Darkstar master server
#[derive(Parser, Debug)]
#[command(name = "darkstar-master")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file; created from defaults when missing
    #[arg(short, long, default_value = "mastersrv.toml", env = "DARKSTAR_CONFIG")]
    config: PathBuf,

    /// Write the default configuration to --config and exit
    #[arg(long)]
    write_default: bool,

    /// Log level (trace, debug, info, warn, error); overrides the config and RUST_LOG
    #[arg(long)]
    log_level: Option<Level>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.write_default {
        return match MasterConfig::default().save_to_file(&cli.config) {
            Ok(()) => {
                println!("wrote default configuration to {}", cli.config.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{e}");
                ExitCode::FAILURE
            }
        };
    }

    let (config, created) = match load_config(&cli.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let filter = log_filter(cli.log_level, config.logging.log_level);
    if let Err(e) = init_logging(filter, config.logging.json_format) {
        eprintln!("failed to install logger: {e}");
        return ExitCode::FAILURE;
    }

    info!(
        component = "startup",
        "~~~ {} Master Server v{} Starting Up ~~~",
        config.directory.hostname,
        env!("CARGO_PKG_VERSION")
    );
    if created {
        info!(component = "config", path = %cli.config.display(), "created default configuration");
    } else {
        info!(component = "config", path = %cli.config.display(), "configuration loaded");
    }

    let server = match MasterServer::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            error!(component = "startup", error = %e, "failed to start master server");
            return ExitCode::FAILURE;
        }
    };

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    spawn_signal_handlers(shutdown_tx, &server, cli.config.clone());

    match server.run(shutdown_rx).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(component = "shutdown", error = %e, "master server stopped with error");
            ExitCode::FAILURE
        }
    }
}

/// Load `path`, writing the defaults there first if it does not exist.
/// Environment overrides apply either way.
fn load_config(path: &Path) -> Result<(MasterConfig, bool)> {
    let created = !path.exists();
    let mut config = if created {
        let config = MasterConfig::default();
        config.save_to_file(path)?;
        config
    } else {
        MasterConfig::from_file(path)?
    };
    config.apply_env()?;
    Ok((config, created))
}

/// `--log-level` wins, then `RUST_LOG`, then the configured level.
fn log_filter(cli: Option<Level>, configured: Level) -> EnvFilter {
    match cli {
        Some(level) => EnvFilter::default().add_directive(LevelFilter::from_level(level).into()),
        None => EnvFilter::builder()
            .with_default_directive(LevelFilter::from_level(configured).into())
            .from_env_lossy(),
    }
}

fn init_logging(filter: EnvFilter, json: bool) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    }
}

fn spawn_signal_handlers(shutdown_tx: mpsc::Sender<()>, server: &MasterServer, path: PathBuf) {
    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!(component = "shutdown", "Received CTRL+C signal, shutting down");
            let _ = ctrl_c_tx.send(()).await;
        }
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    if term.recv().await.is_some() {
                        info!(component = "shutdown", "Received SIGTERM, shutting down");
                        let _ = shutdown_tx.send(()).await;
                    }
                }
                Err(e) => error!(component = "startup", error = %e, "unable to watch SIGTERM"),
            }
        });

        let engine = server.engine();
        tokio::spawn(async move {
            let mut hangup = match signal(SignalKind::hangup()) {
                Ok(hangup) => hangup,
                Err(e) => {
                    error!(component = "startup", error = %e, "unable to watch SIGHUP");
                    return;
                }
            };
            while hangup.recv().await.is_some() {
                info!(component = "config", path = %path.display(), "reloading configuration");
                let reloaded = MasterConfig::from_file(&path).and_then(|mut config| {
                    config.apply_env()?;
                    config.validate_strict()?;
                    Ok(config)
                });
                match reloaded.and_then(|config| engine.apply_config(&config)) {
                    Ok(()) => {}
                    Err(e) => error!(component = "config", error = %e, "reload failed, keeping current configuration"),
                }
            }
        });
    }

    #[cfg(not(unix))]
    {
        let _ = (shutdown_tx, server, path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_level_overrides_config() {
        let filter = log_filter(Some(Level::WARN), Level::TRACE);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::WARN));
    }

    #[test]
    fn test_cli_parses_log_level() {
        let cli = Cli::try_parse_from(["darkstar-master", "--log-level", "debug"]).expect("parse");
        assert_eq!(cli.log_level, Some(Level::DEBUG));
        assert!(!cli.write_default);
    }
}
