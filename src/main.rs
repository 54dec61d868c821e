use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use matrix_input::apps::{device_test, CounterExit, RotaryCounter};
use matrix_input::config::AppConfig;
use matrix_input::devices::{DeviceSamplingLoop, LoopError};
use matrix_input::rotary::{EventMailbox, GpioBitSource, SamplingThread, WakeSignal};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "matrix-input")]
#[command(about = "Input acquisition for the LED matrix: rotary encoder and game devices", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: <config dir>/matrix-input/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Count encoder detents until the power switch or Ctrl-C
    Rotary,
    /// Sample the configured keyboards, joysticks and controllers
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup(cli.verbose)?;

    let config = AppConfig::load(cli.config.as_deref()).await?;

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    match cli.mode {
        Mode::Rotary => run_rotary(&config, cancel).await,
        Mode::Devices => run_devices(config, cancel).await,
    }
}

fn setup(verbose: bool) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    setup_logging_env(if verbose { Level::DEBUG } else { Level::INFO });
    Ok(())
}

fn setup_logging_env(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    warn!("Could not install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Failed to listen for Ctrl-C: {}", e);
                    return;
                }
                info!("Ctrl-C received, shutting down");
            }
            _ = terminate => info!("SIGTERM received, shutting down"),
        }
        cancel.cancel();
    });
}

async fn run_rotary(config: &AppConfig, cancel: CancellationToken) -> Result<()> {
    let mailbox = Arc::new(EventMailbox::new(WakeSignal::new()));
    let source = GpioBitSource::new().map_err(|e| eyre!("Failed to open GPIO: {}", e))?;

    let sampler = SamplingThread::spawn(
        config.rotary.sampler_settings(),
        Box::new(source),
        mailbox.clone(),
    )
    .map_err(|e| eyre!("Failed to start encoder sampling: {}", e))?;

    let mut counter = RotaryCounter::new(
        mailbox,
        config.rotary.refresh(),
        config.rotary.power_command.clone(),
    );
    let exit = counter.run(cancel).await;
    info!("Counter stopped ({:?}) at {}", exit, counter.count());

    tokio::task::spawn_blocking(move || sampler.shutdown()).await??;
    if exit == CounterExit::PowerDown {
        info!("Power down complete");
    }
    Ok(())
}

async fn run_devices(config: AppConfig, cancel: CancellationToken) -> Result<()> {
    let mut devices = DeviceSamplingLoop::new(config.devices.loop_settings());
    let mut rumble = Vec::new();
    for entry in &config.devices.entries {
        let handle = config.devices.open(entry)?;
        devices.add(entry.name.clone(), handle);
        if entry.rumble {
            rumble.push(entry.name.clone());
        }
    }

    if devices.devices().is_empty() {
        warn!("No devices configured, add [[devices.device]] entries to the config");
        return Ok(());
    }

    let result =
        tokio::task::spawn_blocking(move || device_test::run(&mut devices, &rumble, &cancel))
            .await?;

    match result {
        Ok(()) | Err(LoopError::Interrupted) => Ok(()),
        Err(e) => {
            error!("Device test stopped: {}", e);
            Err(e.into())
        }
    }
}
