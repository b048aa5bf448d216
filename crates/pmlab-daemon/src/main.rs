// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! pmlabd - Broadcast multi-channel samples to TCP clients.
//!
//! Usage:
//!   pmlabd
//!   pmlabd --port 12345 --channels 8 --sampling-rate 30000
//!   pmlabd --config pmlabd.json --log-level debug
//!
//! Exit codes:
//!   0  clean shutdown (Ctrl+C)
//!   1  configuration or startup error
//!   2  listening socket could not be bound
//!   3  acquisition source failed

mod config;

use anyhow::Context;
use clap::Parser;
use config::DaemonConfig;
use pmlab::{Pacing, Server, ServerError};
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const EXIT_STARTUP: u8 = 1;
const EXIT_BIND: u8 = 2;
const EXIT_ACQUISITION: u8 = 3;

#[derive(Parser, Debug)]
#[command(name = "pmlabd")]
#[command(about = "Broadcast multi-channel samples to TCP clients")]
#[command(version)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(short, long)]
    bind: Option<IpAddr>,

    /// TCP port
    #[arg(short, long)]
    port: Option<u16>,

    /// Number of simulated channels
    #[arg(long)]
    channels: Option<u32>,

    /// Announced sampling rate (Hz)
    #[arg(long)]
    sampling_rate: Option<u32>,

    /// Points per channel requested each cycle
    #[arg(long)]
    points: Option<u32>,

    /// Frames queued per client before it is dropped
    #[arg(long)]
    buffer_capacity: Option<usize>,

    /// Pace the simulated source to its sampling rate
    #[arg(long)]
    realtime: bool,

    /// Metrics summary period in seconds (0 = off)
    #[arg(long)]
    metrics_interval: Option<u64>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    dump_config: bool,

    /// Log filter: a level (trace, debug, info, warn, error) or directives
    /// such as `pmlab=debug`; `RUST_LOG` takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| log_filter(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

/// Parse `--log-level`, falling back to `info` on a malformed filter.
fn log_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<ServerError>() {
        Some(ServerError::Bind { .. }) => EXIT_BIND,
        Some(ServerError::Acquisition(_) | ServerError::AcquisitionPanicked) => EXIT_ACQUISITION,
        _ => EXIT_STARTUP,
    }
}

fn load_config(args: &Args) -> anyhow::Result<DaemonConfig> {
    let mut config = match &args.config {
        Some(path) => DaemonConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => DaemonConfig::default(),
    };

    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(points) = args.points {
        config.server.points_per_channel = points;
    }
    if let Some(capacity) = args.buffer_capacity {
        config.server.buffer_capacity = capacity;
    }
    if let Some(channels) = args.channels {
        config.source.channels = channels;
    }
    if let Some(rate) = args.sampling_rate {
        config.source.sampling_rate_hz = rate;
    }
    if args.realtime {
        config.source.pacing = Pacing::RealTime;
    }
    if let Some(interval) = args.metrics_interval {
        config.metrics_interval_secs = interval;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(&args)?;
    if args.dump_config {
        println!("{}", config.to_json()?);
        return Ok(());
    }

    info!("pmlabd v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Source: {} channels @ {} Hz ({:?} pacing)",
        config.source.channels, config.source.sampling_rate_hz, config.source.pacing
    );

    let server = Server::bind(config.server.clone(), config.source.build())?;
    let running = server.spawn()?;
    info!("Listening on {}. Press Ctrl+C to stop.", running.local_addr());

    let shutdown = running.shutdown_handle();
    ctrlc::set_handler(move || {
        info!("Ctrl+C caught, shutting down");
        shutdown.trigger();
    })
    .context("installing Ctrl+C handler")?;

    let interval = Duration::from_secs(config.metrics_interval_secs);
    let mut last_report = Instant::now();
    while !running.is_finished() {
        thread::sleep(Duration::from_millis(100));
        if !interval.is_zero() && last_report.elapsed() >= interval {
            info!("{}", running.metrics().snapshot());
            last_report = Instant::now();
        }
    }

    let report = running.wait()?;
    info!(
        "Stopped after {} generations: {}",
        report.acquisition.generations, report.metrics
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_fallback() {
        let fallback = EnvFilter::new("info").to_string();
        assert_eq!(log_filter("pmlab=verbose").to_string(), fallback);
        assert_eq!(log_filter("pmlab=debug").to_string(), "pmlab=debug");
    }

    #[test]
    fn test_exit_codes() {
        let acquisition = anyhow::Error::new(ServerError::AcquisitionPanicked);
        assert_eq!(exit_code(&acquisition), EXIT_ACQUISITION);

        let startup = anyhow::anyhow!("bad flag");
        assert_eq!(exit_code(&startup), EXIT_STARTUP);
    }
}
