//! # Wind Logger
//!
//! Log a serial anemometer and an INA219 battery monitor to hourly CSV
//! files, mirrored to a network share.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::Parser;
use linux_embedded_hal::I2cdev;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use wind_logger::config::{Config, LoggingConfig};
use wind_logger::error::WindLoggerError;
use wind_logger::sensor::serial::available_ports;
use wind_logger::sensor::{open_ina219, AnemometerSerial, Ina219};
use wind_logger::state::StateStore;
use wind_logger::station::{self, BatteryAlarm, ControlHandle, PlotFeed, Station};
use wind_logger::storage::retention::prune;
use wind_logger::storage::{FsMirror, RotationScheduler};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "wind-logger", version, about)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    config: PathBuf,

    /// Anemometer serial port, overriding the last used one
    #[arg(short, long)]
    port: Option<String>,

    /// Remote root (mounted share), overriding the last used one
    #[arg(short, long)]
    remote: Option<PathBuf>,

    /// Print the serial ports present and exit
    #[arg(long)]
    list_ports: bool,
}

/// Startup settings after merging the command line, the last-used files
/// and the configuration
#[derive(Debug, Clone, PartialEq, Eq)]
struct Resolved {
    port: String,
    remote_root: PathBuf,
}

/// Main entry point
///
/// # Control Flow
///
/// 1. **Startup**
///    - Load configuration and set up logging
///    - Resolve the port and remote root
///    - Check the remote root, the anemometer and the battery monitor;
///      any failure here ends the program
///    - Save the confirmed settings, clear old battery warnings and prune
///      old local folders
///
/// 2. **Logging loop**
///    - Runs on its own task until asked to stop
///    - Ctrl+C or `q` on stdin stops; `c` or SIGUSR1 clears the plots
///
/// 3. **Shutdown**
///    - The last file is mirrored and anything left unmirrored is listed
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list_ports {
        for port in available_ports() {
            println!("{}", port);
        }
        return Ok(());
    }

    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    let _log_guard = init_logging(&config.logging)?;

    info!("Wind Logger v{} starting...", env!("CARGO_PKG_VERSION"));
    debug!("Serial ports present: {:?}", available_ports());

    let store = StateStore::new(&config.storage.state_dir);
    let resolved = resolve(&cli, &store, &config)?;

    // Startup checks
    if !resolved.remote_root.is_dir() {
        bail!(
            "Remote root {} is not reachable, is the share mounted?",
            resolved.remote_root.display()
        );
    }

    let mut serial = AnemometerSerial::open(&resolved.port, config.serial.baud_rate, config.read_timeout())
        .with_context(|| format!("Cannot open anemometer on {}", resolved.port))?;
    let first = tokio::time::timeout(config.probe_timeout(), serial.probe())
        .await
        .map_err(|_| WindLoggerError::DeviceStalled(config.probe_timeout()))?
        .with_context(|| format!("No data from anemometer on {}", resolved.port))?;
    info!("Anemometer answered: {}", first);

    let battery: Option<Ina219<I2cdev>> = if config.battery.enabled {
        Some(
            open_ina219(&config.battery.i2c_bus, config.battery.address)
                .context("Battery monitor not found")?,
        )
    } else {
        info!("Battery monitor disabled");
        None
    };

    // Confirmed, remember for next time
    if let Err(e) = store.save_port(&resolved.port) {
        warn!("Cannot save port to {}: {}", store.dir().display(), e);
    }
    if let Err(e) = store.save_remote_root(&resolved.remote_root) {
        warn!("Cannot save remote root to {}: {}", store.dir().display(), e);
    }

    let local_root = config.local_root();
    prune_old_days(&local_root, config.retention_days());

    let mut scheduler = RotationScheduler::new(
        &local_root,
        &resolved.remote_root,
        config.storage.layout,
        config.storage.granularity,
        FsMirror,
    )
    .with_max_task_age(config.max_task_age());
    scheduler
        .start(Local::now().naive_local())
        .with_context(|| format!("Cannot write under {}", local_root.display()))?;

    let has_battery = battery.is_some();
    let mut station = Station::new(serial, battery, scheduler, config.storage.layout);

    if has_battery {
        let alarm = BatteryAlarm::under(&resolved.remote_root, config.battery.voltage_min);
        if let Err(e) = alarm.reset() {
            warn!("Cannot clear old battery warnings: {}", e);
        }
        station = station.with_alarm(alarm);
    }
    if config.plot.enabled {
        station = station.with_plots(PlotFeed::new(&config.plot, Some(local_root.clone())));
    }

    let (handle, control) = station::channel();
    let task = tokio::spawn(async move { station.run(control).await });

    info!("Press Ctrl+C or q to stop, c to clear the plots");
    wait_for_stop(&handle).await?;
    info!("Stopping after the current reading...");
    handle.stop();

    let summary = task.await.context("Station task failed")?;
    info!(
        "Wrote {} rows across {} rotations",
        summary.stats.written, summary.stats.rotations
    );
    if !summary.finish.left_over.is_empty() {
        warn!("{} file(s) were not mirrored", summary.finish.left_over.len());
    }

    Ok(())
}

/// Set up the fmt subscriber, plus a daily log file when `log_dir` is set
///
/// # Returns
///
/// * `Result<Option<WorkerGuard>>` - Guard that flushes the file writer on drop
fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if config.log_dir.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return Ok(None);
    }

    std::fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("Cannot create log folder {}", config.log_dir))?;
    let appender = tracing_appender::rolling::daily(&config.log_dir, "wind-logger.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .init();

    Ok(Some(guard))
}

/// Pick the port and remote root: command line first, then the last-used
/// files, then the configuration.
fn resolve(cli: &Cli, store: &StateStore, config: &Config) -> Result<Resolved> {
    let last = store.load();

    let port = cli
        .port
        .clone()
        .or(last.port)
        .unwrap_or_else(|| config.serial.port.clone());

    let configured_remote = Some(config.storage.remote_root.as_str())
        .filter(|r| !r.is_empty())
        .map(PathBuf::from);
    let Some(remote_root) = cli.remote.clone().or(last.remote_root).or(configured_remote) else {
        bail!("No remote root given; pass --remote or set storage.remote_root");
    };

    if remote_root == config.local_root() {
        bail!("Remote root must differ from the local root {}", remote_root.display());
    }

    Ok(Resolved { port, remote_root })
}

fn prune_old_days(local_root: &Path, retention_days: Option<u32>) {
    let Some(days) = retention_days else {
        return;
    };
    match prune(local_root, Local::now().date_naive(), days) {
        Ok(removed) if removed.is_empty() => debug!("No day folders older than {} days", days),
        Ok(removed) => info!("Removed {} day folders older than {} days", removed.len(), days),
        Err(e) => warn!("Cannot prune {}: {}", local_root.display(), e),
    }
}

/// Wait for Ctrl+C or `q` on stdin, clearing plots on `c` or SIGUSR1
async fn wait_for_stop(handle: &ControlHandle) -> Result<()> {
    let mut commands = spawn_command_reader(std::io::BufReader::new(std::io::stdin()));
    let mut stdin_open = true;

    #[cfg(unix)]
    let mut usr1 = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::user_defined1())?;

    loop {
        #[cfg(unix)]
        let clear_signal = usr1.recv();
        #[cfg(not(unix))]
        let clear_signal = std::future::pending::<Option<()>>();

        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res?;
                info!("Received Ctrl+C");
                return Ok(());
            }
            _ = clear_signal => handle.clear_plots(),
            command = commands.recv(), if stdin_open => match command.as_deref() {
                Some("q") => return Ok(()),
                Some("c") => handle.clear_plots(),
                Some(other) => debug!("Unknown command {:?}", other),
                // stdin closed, e.g. running as a service
                None => stdin_open = false,
            },
        }
    }
}

/// Forward trimmed, lowercased lines from `input` over a channel
///
/// Reads on a plain thread outside the runtime, so a read that never
/// returns does not hold up shutdown.
fn spawn_command_reader<R>(input: R) -> mpsc::UnboundedReceiver<String>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in input.lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send(line.trim().to_lowercase()).is_err() {
                break;
            }
        }
    });
    rx
}
