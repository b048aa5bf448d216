// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! pmlab-client - Print samples streamed by a pmlab daemon.
//!
//! One line per sample point:
//!
//! ```text
//! <seconds> <ch_a> <ch_b> ...
//! ```
//!
//! where `seconds = timestamp_nanos / 1e9 + i / sampling_rate` for point `i`
//! of each frame, and channels appear in the order given by `--channels`.

use anyhow::Context;
use clap::Parser;
use pmlab::{Client, Frame};
use std::io::{self, BufWriter, Write};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Print samples streamed by a pmlab daemon
#[derive(Parser, Debug)]
#[command(name = "pmlab-client")]
#[command(version)]
#[command(about = "Print samples streamed by a pmlab daemon")]
struct Args {
    /// Server host
    #[arg(default_value = "127.0.0.1")]
    server: String,

    /// Server port
    #[arg(default_value = "12345")]
    port: u16,

    /// Channels to subscribe to, comma separated
    #[arg(short, long, value_delimiter = ',', default_value = "0,1")]
    channels: Vec<u32>,

    /// Number of frames to print (0 = unlimited)
    #[arg(short = 'n', long, default_value = "0")]
    count: u64,

    /// Append the digital value (0/1) after each analog value
    #[arg(short, long)]
    digital: bool,

    /// Log filter: a level (trace, debug, info, warn, error) or directives
    /// such as `pmlab=debug`; `RUST_LOG` takes precedence
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| log_filter(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let mut client = Client::connect((args.server.as_str(), args.port), &args.channels)
        .with_context(|| format!("connecting to {}:{}", args.server, args.port))?;
    info!(
        "Connected to {}:{}, channels {:?} @ {} Hz",
        args.server,
        args.port,
        client.channels(),
        client.sampling_rate_hz()
    );

    let interrupt = client.interrupt_handle()?;
    ctrlc::set_handler(move || interrupt.interrupt()).context("installing Ctrl+C handler")?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let rate = client.sampling_rate_hz();
    let mut printed = 0u64;

    while args.count == 0 || printed < args.count {
        let frame = match client.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("Server closed the connection");
                break;
            }
            Err(e) => {
                warn!("Read failed: {}", e);
                return Err(e).context("reading from server");
            }
        };

        match print_frame(&mut out, &frame, rate, args.digital) {
            Ok(()) => {}
            // Downstream pipe closed (e.g. `| head`)
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => break,
            Err(e) => return Err(e.into()),
        }
        printed += 1;
    }

    info!("{} frames received", client.frames_received());
    Ok(())
}

/// Parse `--log-level`, falling back to `warn` on a malformed filter.
fn log_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("warn"))
}

fn print_frame<W: Write>(out: &mut W, frame: &Frame, rate: u32, digital: bool) -> io::Result<()> {
    let base = frame.timestamp_nanos() as f64 / 1e9;
    let rate = f64::from(rate.max(1));

    for i in 0..frame.points_per_channel() as usize {
        write!(out, "{:.6}", base + i as f64 / rate)?;
        for channel in 0..frame.channel_count() {
            let (Some(analog), Some(bits)) = (frame.analog(channel), frame.digital(channel)) else {
                continue;
            };
            write!(out, " {:.6}", analog[i])?;
            if digital {
                write!(out, " {}", u8::from(bits[i]))?;
            }
        }
        writeln!(out)?;
    }
    out.flush()
}
