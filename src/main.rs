//! # IMU Monitor
//!
//! Collect telemetry from a BLE sensor peripheral and show it live.
//!
//! # Commands
//!
//! - `scan`: list advertising peripherals
//! - `characteristics`: connect to the target device and list its GATT
//!   characteristics with their capabilities
//! - `monitor`: subscribe to a notifiable characteristic, print each decoded
//!   sample, and optionally export the buffer when the subscription ends
//!
//! # Examples
//!
//! ```bash
//! # Accelerometer dashboard until Ctrl+C
//! imu-monitor monitor --name XIAO_TENIS --uuid 0000ffe1-0000-1000-8000-00805f9b34fb
//!
//! # Collect a 10 second generic window and write it to CSV
//! imu-monitor --preset generic monitor --export readings.csv
//! ```

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

use imu_monitor::ble::{BleSession, BleStack, BtleplugStack, SubscriptionEnd, SubscriptionPolicy};
use imu_monitor::config::{Config, Preset, SubscriptionKind};
use imu_monitor::readout;
use imu_monitor::telemetry::export;

#[derive(Parser, Debug)]
#[command(name = "imu-monitor", version, about = "Collect telemetry from a BLE sensor")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Decode, buffer and subscription preset
    #[arg(long, global = true, value_enum)]
    preset: Option<Preset>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List advertising peripherals
    Scan,
    /// List the characteristics of the target device
    Characteristics(TargetArgs),
    /// Subscribe and print samples as they arrive
    Monitor(MonitorArgs),
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// Substring of the advertised device name
    #[arg(long)]
    name: Option<String>,

    /// Exact device address (overrides --name)
    #[arg(long)]
    address: Option<String>,
}

#[derive(Args, Debug)]
struct MonitorArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Characteristic UUID to subscribe to
    #[arg(long)]
    uuid: Option<String>,

    /// Collect for this many seconds, then disconnect
    #[arg(long, conflicts_with = "continuous")]
    window_secs: Option<u64>,

    /// Collect until Ctrl+C or the link drops
    #[arg(long)]
    continuous: bool,

    /// Write the collected samples here when done (.csv or .jsonl)
    #[arg(long)]
    export: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = build_config(&cli)?;

    let _log_guard = imu_monitor::logging::init(&config.logging)?;
    info!("IMU Monitor v{} starting...", env!("CARGO_PKG_VERSION"));

    let stack = BtleplugStack::new().await?;
    let mut session = BleSession::new(stack, config.session_config());

    match cli.command {
        Command::Scan => scan(&mut session).await,
        Command::Characteristics(_) => characteristics(&mut session, &config).await,
        Command::Monitor(_) => monitor(&mut session, &config).await,
    }
}

/// Configuration file (or defaults) with preset and command line overrides applied
fn build_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(preset) = cli.preset {
        config.apply_preset(preset);
    }

    let target = match &cli.command {
        Command::Scan => None,
        Command::Characteristics(target) => Some(target),
        Command::Monitor(args) => Some(&args.target),
    };
    if let Some(target) = target {
        if let Some(name) = &target.name {
            config.device.name = Some(name.clone());
        }
        if let Some(address) = &target.address {
            config.device.address = Some(address.clone());
        }
    }

    if let Command::Monitor(args) = &cli.command {
        if let Some(uuid) = &args.uuid {
            config.device.characteristic_uuid = Some(uuid.clone());
        }
        if let Some(secs) = args.window_secs {
            config.subscription.policy = SubscriptionKind::Window;
            config.subscription.window_ms = secs.saturating_mul(1000);
        }
        if args.continuous {
            config.subscription.policy = SubscriptionKind::Continuous;
        }
        if let Some(path) = &args.export {
            config.export.path = Some(path.clone());
            config.export.format = None;
        }
    }

    config.validate()?;
    Ok(config)
}

async fn scan<S: BleStack>(session: &mut BleSession<S>) -> Result<()> {
    let devices = session.scan().await?;
    if devices.is_empty() {
        println!("No devices found");
    }
    for device in &devices {
        println!("{}", device);
    }
    Ok(())
}

async fn characteristics<S: BleStack>(session: &mut BleSession<S>, config: &Config) -> Result<()> {
    connect_target(session, config).await?;
    let listed = session.list_characteristics().await?;
    for characteristic in &listed {
        println!("{}", characteristic);
    }
    Ok(())
}

async fn monitor<S: BleStack>(session: &mut BleSession<S>, config: &Config) -> Result<()> {
    connect_target(session, config).await?;
    let listed = session.list_characteristics().await?;

    let uuid = match &config.device.characteristic_uuid {
        Some(uuid) => uuid.clone(),
        None => match listed.iter().find(|c| c.can_notify()) {
            Some(first) => {
                info!(uuid = %first.uuid, "no characteristic configured, using first notifiable");
                first.uuid.clone()
            }
            None => bail!("device has no notifiable characteristic"),
        },
    };

    let policy = config.subscription_policy();
    session.subscribe(&uuid, policy).await?;
    match policy {
        SubscriptionPolicy::TimedWindow(window) => {
            println!("Collecting for {}s (Ctrl+C to stop early)", window.as_secs_f64())
        }
        SubscriptionPolicy::Continuous => println!("Collecting until Ctrl+C"),
    }

    let mut view = session.telemetry();
    let renderer = tokio::spawn(async move {
        loop {
            view.changed().await;
            if let Some(latest) = view.latest() {
                println!("{}", readout::render(&latest));
            }
        }
    });

    let end = tokio::select! {
        end = session.wait() => end,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, stopping...");
            None
        }
    };
    if end.is_none() {
        session.stop().await;
    }
    renderer.abort();

    let view = session.telemetry();
    info!(
        received = view.received(),
        decode_failures = view.decode_failures(),
        buffered = view.len(),
        state = %session.state(),
        "subscription finished"
    );
    if let Some(SubscriptionEnd::ConnectionLost(reason)) = &end {
        warn!(%reason, "connection lost, exporting what was collected");
    }

    if let Some((path, format)) = config.export_target() {
        export::export(&view.snapshot(), &path, format)?;
        println!("Exported {} samples to {}", view.len(), path.display());
    }

    Ok(())
}

/// Scan and bind the session to the configured device
async fn connect_target<S: BleStack>(session: &mut BleSession<S>, config: &Config) -> Result<()> {
    session.scan().await?;

    let device = match (&config.device.address, &config.device.name) {
        (Some(address), _) => session.select(address)?,
        (None, Some(name)) => session.select_by_name(name)?,
        (None, None) => bail!("no device name or address configured"),
    };
    println!("Using {}", device);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use imu_monitor::telemetry::export::ExportFormat;
    use imu_monitor::telemetry::{BufferPolicy, DecodeMode};
    use std::time::Duration;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("imu-monitor").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults_without_flags() {
        let config = build_config(&parse(&["monitor"])).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_preset_and_overrides() {
        let cli = parse(&[
            "--preset",
            "generic",
            "monitor",
            "--address",
            "AA:BB:CC:DD:EE:FF",
            "--window-secs",
            "3",
            "--export",
            "out.jsonl",
        ]);
        let config = build_config(&cli).unwrap();

        assert_eq!(config.decode.mode, DecodeMode::Generic);
        assert_eq!(config.buffer_policy(), BufferPolicy::Unbounded);
        assert_eq!(config.device.address.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert_eq!(
            config.subscription_policy(),
            SubscriptionPolicy::TimedWindow(Duration::from_secs(3))
        );
        assert_eq!(
            config.export_target(),
            Some((PathBuf::from("out.jsonl"), ExportFormat::Jsonl))
        );
    }

    #[test]
    fn test_continuous_flag() {
        let cli = parse(&["--preset", "generic", "monitor", "--continuous"]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.subscription_policy(), SubscriptionPolicy::Continuous);
    }

    #[test]
    fn test_window_and_continuous_conflict() {
        let result = Cli::try_parse_from([
            "imu-monitor",
            "monitor",
            "--window-secs",
            "5",
            "--continuous",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_uuid_rejected() {
        let cli = parse(&["monitor", "--uuid", "ffe1"]);
        assert!(build_config(&cli).is_err());
    }

    #[test]
    fn test_zero_window_rejected() {
        let cli = parse(&["monitor", "--window-secs", "0"]);
        assert!(build_config(&cli).is_err());
    }
}
