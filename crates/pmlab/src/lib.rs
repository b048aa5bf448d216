// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # pmlab - Multi-channel telemetry broadcast
//!
//! One acquisition source produces timestamped blocks of analog and digital
//! samples; every connected client receives every block, restricted to the
//! channels it subscribed to. A slow client is dropped rather than allowed
//! to stall acquisition or other clients.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pmlab::{PatternSource, Server, ServerConfig};
//!
//! let server = Server::bind(ServerConfig::default(), PatternSource::new(3, 30_000))?;
//! let shutdown = server.shutdown_handle();
//! // shutdown.trigger() from a signal handler stops the server
//! let report = server.run()?;
//! println!("published {} generations", report.acquisition.generations);
//! # Ok::<(), pmlab::ServerError>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +-------------+   publish + reset    +--------------------+
//! | Acquisition | -------------------> | PublishedFrame     |
//! |    Loop     | <--- await_ready --- | GenerationBarrier  |
//! +-------------+                      +--------------------+
//!                                         |  wait / acknowledge
//!                        +----------------+----------------+
//!                        v                                 v
//!                 +-------------+                   +-------------+
//!                 | Handler #1  |        ...        | Handler #N  |
//!                 +-------------+                   +-------------+
//!                        | push (Overflow = drop)          |
//!                 +-------------+                   +-------------+
//!                 | ClientBuffer|                   | ClientBuffer|
//!                 +-------------+                   +-------------+
//!                        | pop                             |
//!                 +-------------+                   +-------------+
//!                 |  Sender #1  | -- TCP -->        |  Sender #N  | -- TCP -->
//!                 +-------------+                   +-------------+
//! ```
//!
//! ## Modules Overview
//!
//! - [`protocol`] - Frame model, handshake and data message codec
//! - [`sync`] - Generational barrier and bounded client buffer
//! - [`engine`] - Acquisition loop, handler/sender workers, server
//! - [`source`] - Sample source trait and simulated device
//! - [`client`] - Blocking client
//! - [`config`] - Server configuration
//! - [`metrics`] - Server counters

pub mod client;
pub mod config;
pub mod engine;
pub mod metrics;
pub mod protocol;
pub mod source;
pub mod sync;

pub use client::Client;
pub use config::{ConfigError, ServerConfig, DEFAULT_PORT};
pub use engine::{RunningServer, Server, ServerError, ServerReport};
pub use metrics::{MetricsSnapshot, StreamMetrics};
pub use protocol::{CodecError, Frame, FrameDecoder};
pub use source::{Pacing, PatternSource, SampleSource, SourceConfig, SourceError};
pub use sync::{GenerationBarrier, ShutdownHandle, WorkerHandle};
