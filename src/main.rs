//! # LoRa E220
//!
//! Send or receive dictionary messages through an EBYTE E220 module attached
//! to a USB-UART adapter.
//!
//! The driver is blocking, so it runs on a `spawn_blocking` thread while the
//! async runtime waits for Ctrl+C.

use anyhow::{bail, Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lora_e220::config::{Config, LoggingConfig};
use lora_e220::driver::LoraE220;
use lora_e220::e220::payload::Message;
use lora_e220::e220::registers::TransmissionKind;
use lora_e220::error::LoraError;
use lora_e220::serial::{ModemLines, SerialTransport, CONFIGURATION_BAUD_RATE};
use lora_e220::telemetry::{MessageLog, MessageRecord};
use lora_e220::timing::SystemClock;

/// Configuration file used when none is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Number of messages between status log messages
const LOG_INTERVAL_MESSAGES: u64 = 100;

/// Longest single sleep while waiting for the next send, so Ctrl+C is seen
const SHUTDOWN_CHECK_INTERVAL: Duration = Duration::from_millis(50);

const USAGE: &str = "usage: lora-e220 [receive|send] [config.toml]";

type Driver = LoraE220<SerialTransport, ModemLines>;

/// What the binary does once the module is up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Receive,
    Send,
}

impl Role {
    fn parse(arg: &str) -> Option<Self> {
        match arg {
            "receive" | "rx" => Some(Role::Receive),
            "send" | "tx" => Some(Role::Send),
            _ => None,
        }
    }
}

/// Role and config path from the arguments after the program name
fn parse_args(args: &[String]) -> Result<(Role, String)> {
    match args {
        [] => Ok((Role::Receive, DEFAULT_CONFIG_PATH.to_string())),
        [role] => match Role::parse(role) {
            Some(role) => Ok((role, DEFAULT_CONFIG_PATH.to_string())),
            None => bail!("unknown role {:?}\n{}", role, USAGE),
        },
        [role, path] => match Role::parse(role) {
            Some(role) => Ok((role, path.clone())),
            None => bail!("unknown role {:?}\n{}", role, USAGE),
        },
        _ => bail!(USAGE),
    }
}

/// Install stdout logging, plus a daily rolling file when configured
///
/// The returned guard must live until exit so buffered file output is
/// flushed.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match &config.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "lora-e220.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    guard
}

/// Open the port, bring the module up and apply `[radio]`
fn open_driver(config: &Config) -> Result<Driver> {
    let model = config.model()?;
    let timeout = Duration::from_millis(config.serial.timeout_ms);
    let transport = SerialTransport::open(&config.serial.port, config.serial.baud_rate, timeout)
        .with_context(|| format!("opening {}", config.serial.port))?;
    let lines = ModemLines::new(
        transport.try_clone_port()?,
        config.module.m0,
        config.module.m1,
        config.module.aux,
        config.module.inverted,
    )?;

    let mut lora = LoraE220::with_clock(model, transport, lines, SystemClock, config.driver_options());
    lora.begin()?;

    if config.radio.apply_on_start {
        if config.serial.baud_rate != CONFIGURATION_BAUD_RATE {
            warn!(
                "Configuration commands need {} baud, port is at {}",
                CONFIGURATION_BAUD_RATE, config.serial.baud_rate
            );
        }

        let current = lora.get_configuration().context("reading module configuration")?;
        let wanted = config.radio.apply(&current);
        let applied = lora
            .set_configuration(&wanted, config.radio.persistence())
            .context("writing module configuration")?;

        if applied != wanted {
            warn!("Module adjusted the configuration: channel {} -> {}", wanted.chan, applied.chan);
        }
        info!(
            "{} at address 0x{:04X}, channel {} ({:.3} MHz), {:?} transmission, RSSI {}",
            model,
            applied.address(),
            applied.chan,
            applied.frequency_mhz(),
            applied.transmission_mode.transmission,
            if applied.transmission_mode.enable_rssi { "on" } else { "off" }
        );
    }

    Ok(lora)
}

/// Sleep for `duration` in short steps; `false` if shutdown was requested
fn sleep_unless_shutdown(duration: Duration, shutdown: &AtomicBool) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(SHUTDOWN_CHECK_INTERVAL));
    }
}

/// Poll for messages until shutdown; returns the number received
fn run_receiver(lora: &mut Driver, config: &Config, shutdown: &AtomicBool) -> lora_e220::Result<u64> {
    let rssi = config.radio.enable_rssi;
    let poll = Duration::from_millis(config.receiver.poll_interval_ms);
    let mut log = if config.message_log.enabled {
        Some(MessageLog::new(
            &config.message_log.dir,
            config.message_log.max_records_per_file,
            config.message_log.max_files_to_keep,
        )?)
    } else {
        None
    };

    info!("Waiting for messages (RSSI {})", if rssi { "expected" } else { "off" });
    let mut count: u64 = 0;

    while !shutdown.load(Ordering::Relaxed) {
        match lora.receive(rssi) {
            Ok(received) => {
                count += 1;
                let message = Message::from_payload(received.payload);
                match (&message, received.rssi) {
                    (Message::Dictionary(d), Some(r)) => info!("Received {:?} ({} dBm)", d, r.dbm()),
                    (Message::Dictionary(d), None) => info!("Received {:?}", d),
                    (other, _) => info!("Received {} message: {:?}", other.kind(), other),
                }

                if let Some(log) = log.as_mut() {
                    if let Err(e) = log.append(&MessageRecord::new(&message, received.rssi)) {
                        warn!("Failed to log message: {}", e);
                    }
                }

                if count % LOG_INTERVAL_MESSAGES == 0 {
                    info!("Received {} messages", count);
                }
            }
            Err(LoraError::NoData) => {
                sleep_unless_shutdown(poll, shutdown);
            }
            Err(e) if e.is_retryable() || matches!(e, LoraError::MalformedFrame(_)) => {
                warn!("Receive failed ({}): {}", e.status(), e);
                sleep_unless_shutdown(poll, shutdown);
            }
            Err(e) => return Err(e),
        }
    }

    Ok(count)
}

/// Send the configured message every interval until shutdown; returns the
/// number sent
fn run_sender(lora: &mut Driver, config: &Config, shutdown: &AtomicBool) -> lora_e220::Result<u64> {
    let message = config.sender.message()?;
    let interval = Duration::from_millis(config.sender.interval_ms);
    let (kind, address, channel) = if config.radio.fixed_transmission {
        (TransmissionKind::Fixed, Some(config.sender.address()), Some(config.sender.chan))
    } else {
        (TransmissionKind::Transparent, None, None)
    };

    info!(
        "Sending {:?} every {} ms ({:?} to 0x{:04X} on channel {})",
        message,
        interval.as_millis(),
        kind,
        config.sender.address(),
        config.sender.chan
    );
    let mut count: u64 = 0;

    loop {
        match lora.send_dict(kind, address, channel, &message) {
            Ok(()) => {
                count += 1;
                debug!("Sent message #{}", count);
                if count % LOG_INTERVAL_MESSAGES == 0 {
                    info!("Sent {} messages", count);
                }
            }
            Err(e) if e.is_retryable() => warn!("Send failed ({}): {}", e.status(), e),
            Err(e) => return Err(e),
        }

        if !sleep_unless_shutdown(interval, shutdown) {
            return Ok(count);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (role, config_path) = parse_args(&args)?;
    let config = Config::load(&config_path).with_context(|| format!("loading {}", config_path))?;
    let _log_guard = init_logging(&config.logging);

    info!("LoRa E220 v{} starting ({:?})", env!("CARGO_PKG_VERSION"), role);

    let mut lora = open_driver(&config)?;
    info!("Press Ctrl+C to exit");

    let shutdown = Arc::new(AtomicBool::new(false));
    let worker_shutdown = Arc::clone(&shutdown);
    let worker_config = config.clone();
    let mut worker = tokio::task::spawn_blocking(move || match role {
        Role::Receive => run_receiver(&mut lora, &worker_config, &worker_shutdown),
        Role::Send => run_sender(&mut lora, &worker_config, &worker_shutdown),
    });

    let count = tokio::select! {
        result = &mut worker => result??,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            shutdown.store(true, Ordering::Relaxed);
            worker.await??
        }
    };

    match role {
        Role::Receive => info!("Total messages received: {}", count),
        Role::Send => info!("Total messages sent: {}", count),
    }
    Ok(())
}
