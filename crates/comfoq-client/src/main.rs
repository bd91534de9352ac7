//! `comfoq` command-line entry point.
//!
//! ```text
//! comfoq discover            -- broadcast a probe, print the gateway
//! comfoq sensors             -- print the known sensor table
//! comfoq run                 -- hold a session, stream sensor updates
//!  └─ Client::spawn()        -- session actor on this runtime
//!  └─ select loop
//!       ├─ ClientEvent       -> JSON line on stdout
//!       ├─ stdin line        -> send_command(group 1, name)
//!       └─ Ctrl-C            -> shutdown (CloseSession, close link)
//! ```
//!
//! Configuration comes from the TOML file (see
//! `infrastructure::storage::config`); `--host`, `--uuid`, `--pin` and
//! `--sensor` override it.  `RUST_LOG` overrides the configured log level.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use comfoq_client::application::events::{ClientEvent, DisconnectReason};
use comfoq_client::infrastructure::network::{discover_gateway, TcpConnector};
use comfoq_client::infrastructure::storage::config::{load_config, load_from, AppConfig};
use comfoq_client::{Client, ClientHandle};
use comfoq_core::domain::naming::sensor_identifier;
use comfoq_core::domain::sensors::SENSORS;
use comfoq_core::protocol::GATEWAY_PORT;
use comfoq_core::{SensorId, COMMAND_GROUP};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Client for the ComfoAir Q ventilation unit's LAN gateway.
#[derive(Debug, Parser)]
#[command(name = "comfoq", version)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Finds a gateway on the local network.
    Discover {
        /// Where the probe is sent.
        #[arg(long, default_value = "255.255.255.255", env = "COMFOQ_BROADCAST")]
        broadcast: IpAddr,
        #[arg(long, default_value_t = GATEWAY_PORT)]
        port: u16,
        /// Seconds to wait for a reply.
        #[arg(long, default_value_t = 5)]
        timeout: u64,
    },

    /// Connects, subscribes to sensors and accepts command names on stdin.
    Run(RunArgs),

    /// Lists the sensors the client can decode.
    Sensors,
}

#[derive(Debug, clap::Args)]
struct RunArgs {
    /// Config file; defaults to the platform config directory.
    #[arg(long, env = "COMFOQ_CONFIG")]
    config: Option<PathBuf>,

    /// Gateway IP address or host name.
    #[arg(long, env = "COMFOQ_HOST")]
    host: Option<String>,

    /// Gateway UUID (32 hex digits).
    #[arg(long, env = "COMFOQ_UUID")]
    uuid: Option<String>,

    /// Gateway PIN.
    #[arg(long, env = "COMFOQ_PIN")]
    pin: Option<u32>,

    /// Sensor id to subscribe to; repeat for several.  Replaces the list
    /// from the config file.
    #[arg(long = "sensor")]
    sensors: Vec<SensorId>,
}

impl RunArgs {
    fn load(&self) -> anyhow::Result<AppConfig> {
        let mut cfg = match &self.config {
            Some(path) => {
                load_from(path).with_context(|| format!("reading {}", path.display()))?
            }
            None => load_config().context("reading platform config")?,
        };
        if let Some(host) = &self.host {
            cfg.device.host = Some(host.clone());
        }
        if let Some(uuid) = &self.uuid {
            cfg.device.uuid = Some(uuid.clone());
        }
        if let Some(pin) = self.pin {
            cfg.device.pin = Some(pin);
        }
        if !self.sensors.is_empty() {
            cfg.sensors = self.sensors.clone();
        }
        Ok(cfg)
    }
}

fn init_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        CliCommand::Discover {
            broadcast,
            port,
            timeout,
        } => {
            init_logging("info");
            discover(SocketAddr::new(broadcast, port), Duration::from_secs(timeout)).await
        }
        CliCommand::Sensors => {
            print_sensors();
            Ok(())
        }
        CliCommand::Run(args) => {
            let cfg = args.load()?;
            init_logging(&cfg.app.log_level);
            run(cfg).await
        }
    }
}

async fn discover(broadcast: SocketAddr, timeout: Duration) -> anyhow::Result<()> {
    let found = discover_gateway(broadcast, timeout)
        .await
        .context("gateway discovery failed")?;
    println!("host    = {}", found.host);
    println!("uuid    = {}", found.uuid.simple());
    if let Some(version) = found.version {
        println!("version = {version}");
    }
    Ok(())
}

fn print_sensors() {
    for meta in SENSORS {
        let unit = if meta.unit.is_empty() { "-" } else { meta.unit };
        println!(
            "{:>4}  {:<32} {:<6} {}",
            meta.id,
            sensor_identifier(meta.name),
            unit,
            meta.name
        );
    }
}

async fn run(cfg: AppConfig) -> anyhow::Result<()> {
    let config = cfg
        .to_client_config()
        .context("configuration incomplete, not starting")?;
    info!(
        host = ?config.identity.host,
        sensors = config.sensors.len(),
        "comfoq starting"
    );

    let (handle, mut events) = Client::spawn(config, Arc::new(TcpConnector));
    handle
        .connect()
        .await
        .context("could not start a gateway session")?;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let outcome = loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    if let Some(reason) = report(&event)? {
                        break Err(anyhow::anyhow!("session ended: {reason:?}"));
                    }
                }
                None => break Ok(()),
            },
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => dispatch(&handle, line.trim()).await,
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!("stdin read error: {e}");
                    stdin_open = false;
                }
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!("failed to listen for Ctrl+C: {e}");
                }
                info!("shutdown requested");
                break Ok(());
            }
        }
    };

    handle.shutdown().await;
    info!("comfoq stopped");
    outcome
}

/// Prints one event.  Returns the reason when the session is over for good.
fn report(event: &ClientEvent) -> anyhow::Result<Option<DisconnectReason>> {
    match event {
        ClientEvent::SensorUpdate(update) => {
            println!("{}", serde_json::to_string(update)?);
        }
        ClientEvent::VersionInfo(version) => {
            println!("{}", serde_json::to_string(version)?);
        }
        ClientEvent::ConnectionStateChanged(connected) => {
            info!(connected, "connection state changed");
        }
        ClientEvent::Disconnected(reason) => match reason {
            DisconnectReason::ConnectionFailed(cause) => {
                warn!("connection failed: {cause}");
            }
            DisconnectReason::Shutdown => {}
            terminal => return Ok(Some(terminal.clone())),
        },
    }
    Ok(None)
}

async fn dispatch(handle: &ClientHandle, name: &str) {
    if name.is_empty() {
        return;
    }
    match handle.send_command(COMMAND_GROUP, name).await {
        Ok(()) => info!(command = name, "command acknowledged"),
        Err(e) => warn!(command = name, "command failed: {e}"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_defaults() {
        // Arrange / Act
        let cli = Cli::parse_from(["comfoq", "discover"]);

        // Assert
        let CliCommand::Discover {
            broadcast,
            port,
            timeout,
        } = cli.command
        else {
            panic!("expected discover");
        };
        assert_eq!(broadcast, IpAddr::from([255, 255, 255, 255]));
        assert_eq!(port, 56747);
        assert_eq!(timeout, 5);
    }

    #[test]
    fn test_run_flags_override_file_values() {
        // Arrange
        let dir = std::env::temp_dir().join(format!("comfoq-cli-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "sensors = [1]\n[device]\nhost = \"10.0.0.1\"\npin = 1\n").unwrap();
        let cli = Cli::parse_from([
            "comfoq",
            "run",
            "--config",
            path.to_str().unwrap(),
            "--host",
            "10.0.0.9",
            "--pin",
            "4321",
            "--sensor",
            "117",
            "--sensor",
            "276",
        ]);
        let CliCommand::Run(args) = cli.command else {
            panic!("expected run");
        };

        // Act
        let cfg = args.load().unwrap();

        // Assert
        assert_eq!(cfg.device.host.as_deref(), Some("10.0.0.9"));
        assert_eq!(cfg.device.pin, Some(4321));
        assert_eq!(cfg.sensors, vec![117, 276]);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_terminal_disconnects_end_the_run_loop() {
        let stolen = ClientEvent::Disconnected(DisconnectReason::SessionStolen);
        let failed = ClientEvent::Disconnected(DisconnectReason::ConnectionFailed("x".into()));

        assert_eq!(report(&stolen).unwrap(), Some(DisconnectReason::SessionStolen));
        assert_eq!(report(&failed).unwrap(), None);
        assert_eq!(
            report(&ClientEvent::ConnectionStateChanged(true)).unwrap(),
            None
        );
    }
}
