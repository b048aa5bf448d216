// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Streaming server: listener, accept loop and worker lifecycle.
//!
//! ```text
//!   Server::bind ──► run()
//!                     ├─ spawn acquisition thread
//!                     ├─ accept loop (nonblocking, polls shutdown every 10 ms)
//!                     │    └─ per client: handler thread ─► sender thread
//!                     └─ on shutdown: join acquisition, join handlers
//! ```

use super::acquisition::{AcquisitionError, AcquisitionLoop, AcquisitionStats};
use super::context::StreamContext;
use super::handler::HandlerWorker;
use crate::config::{ConfigError, ServerConfig};
use crate::metrics::{MetricsSnapshot, StreamMetrics};
use crate::source::SampleSource;
use crate::sync::{GenerationBarrier, ShutdownHandle};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Accept loop sleep when no connection is pending.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Server failures.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("failed to spawn server thread: {0}")]
    Spawn(#[source] io::Error),

    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error("acquisition thread panicked")]
    AcquisitionPanicked,

    #[error("server thread panicked")]
    ServerPanicked,
}

/// Summary returned once the server stopped.
#[derive(Debug, Clone)]
pub struct ServerReport {
    pub acquisition: AcquisitionStats,
    pub metrics: MetricsSnapshot,
}

/// Bound, not yet running streaming server.
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    ctx: StreamContext,
    source: Box<dyn SampleSource>,
}

impl Server {
    /// Validate `config` and bind the listening socket.
    pub fn bind<S>(config: ServerConfig, source: S) -> Result<Self, ServerError>
    where
        S: SampleSource + 'static,
    {
        config.validate()?;
        config.validate_for_source(source.channel_count())?;
        let addr = config.socket_addr();
        let listener =
            create_listener(addr, config.backlog).map_err(|source| ServerError::Bind {
                addr,
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let ctx = StreamContext::new(config, source.channel_count(), source.sampling_rate_hz());
        log::info!(
            "[server] listening on {} ({} channels @ {} Hz)",
            local_addr,
            ctx.channel_count,
            ctx.sampling_rate_hz
        );

        Ok(Self {
            listener,
            local_addr,
            ctx,
            source: Box::new(source),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle::new(Arc::clone(&self.ctx.barrier))
    }

    pub fn metrics(&self) -> Arc<StreamMetrics> {
        Arc::clone(&self.ctx.metrics)
    }

    pub fn barrier(&self) -> Arc<GenerationBarrier> {
        Arc::clone(&self.ctx.barrier)
    }

    /// Run on the calling thread until shutdown or acquisition failure.
    pub fn run(self) -> Result<ServerReport, ServerError> {
        let Server {
            listener,
            ctx,
            source,
            ..
        } = self;

        let acquisition = match AcquisitionLoop::new(source, &ctx).spawn() {
            Ok(handle) => handle,
            Err(e) => {
                ctx.barrier.shutdown();
                return Err(e.into());
            }
        };

        let handlers = accept_loop(&listener, &ctx);
        drop(listener);
        log::info!("[server] listener closed");

        let acquisition = acquisition.join();
        for handle in handlers {
            let _ = handle.join();
        }

        let stats = match acquisition {
            Ok(result) => result?,
            Err(_) => return Err(ServerError::AcquisitionPanicked),
        };
        Ok(ServerReport {
            acquisition: stats,
            metrics: ctx.metrics.snapshot(),
        })
    }

    /// Run on a background thread.
    pub fn spawn(self) -> Result<RunningServer, ServerError> {
        let local_addr = self.local_addr;
        let shutdown = self.shutdown_handle();
        let metrics = self.metrics();
        let barrier = self.barrier();

        let thread = thread::Builder::new()
            .name("pmlab-server".to_string())
            .spawn(move || self.run())
            .map_err(ServerError::Spawn)?;

        Ok(RunningServer {
            local_addr,
            shutdown,
            metrics,
            barrier,
            thread,
        })
    }
}

/// Server running on a background thread.
pub struct RunningServer {
    local_addr: SocketAddr,
    shutdown: ShutdownHandle,
    metrics: Arc<StreamMetrics>,
    barrier: Arc<GenerationBarrier>,
    thread: thread::JoinHandle<Result<ServerReport, ServerError>>,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn metrics(&self) -> &StreamMetrics {
        &self.metrics
    }

    pub fn barrier(&self) -> &GenerationBarrier {
        &self.barrier
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the server to stop on its own.
    pub fn wait(self) -> Result<ServerReport, ServerError> {
        self.thread
            .join()
            .map_err(|_| ServerError::ServerPanicked)?
    }

    /// Trigger shutdown and wait for every worker to exit.
    pub fn stop(self) -> Result<ServerReport, ServerError> {
        self.shutdown.trigger();
        self.wait()
    }
}

fn create_listener(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    let listener: TcpListener = socket.into();
    listener.set_nonblocking(true)?;
    Ok(listener)
}

fn accept_loop(
    listener: &TcpListener,
    ctx: &StreamContext,
) -> Vec<thread::JoinHandle<()>> {
    let mut handlers: Vec<thread::JoinHandle<()>> = Vec::new();

    while !ctx.barrier.is_shutdown() {
        match listener.accept() {
            Ok((stream, peer)) => {
                handlers.retain(|h| !h.is_finished());
                match spawn_handler(stream, peer, ctx) {
                    Ok(handle) => handlers.push(handle),
                    Err(e) => log::warn!("[server] failed to spawn handler for {}: {}", peer, e),
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                log::warn!("[server] accept failed: {}", e);
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }
    }

    handlers
}

fn spawn_handler(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: &StreamContext,
) -> io::Result<thread::JoinHandle<()>> {
    stream.set_nonblocking(false)?;
    if ctx.config.nodelay {
        let _ = stream.set_nodelay(true);
    }

    ctx.metrics.record_connection_accepted();
    log::info!("[server] accepted {}", peer);

    let worker_ctx = ctx.clone();
    let spawned = thread::Builder::new()
        .name(format!("pmlab-handler-{}", peer.port()))
        .spawn(move || {
            let metrics = Arc::clone(&worker_ctx.metrics);
            match HandlerWorker::new(stream, peer, worker_ctx).run() {
                Ok(report) => log::info!(
                    "[handler {}] {} closed ({:?}): {} generations, {} frames sent, {} discarded",
                    report.worker,
                    peer,
                    report.reason,
                    report.generations_acknowledged,
                    report.sender.frames_sent,
                    report.frames_discarded
                ),
                Err(e) => log::debug!("[handler {}] ended before streaming: {}", peer, e),
            }
            metrics.record_connection_closed();
        });

    if spawned.is_err() {
        ctx.metrics.record_connection_closed();
    }
    spawned
}
