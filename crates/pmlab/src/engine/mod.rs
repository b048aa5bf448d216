// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Streaming engine.
//!
//! # Threads
//!
//! ```text
//! pmlab-acquisition   1        AcquisitionLoop   source -> PublishedFrame
//! pmlab-server        1        accept loop       spawns handler threads
//! pmlab-handler-*     per conn HandlerWorker     PublishedFrame -> ClientBuffer
//! pmlab-sender-*      per conn SenderWorker      ClientBuffer -> socket
//! ```
//!
//! # Locks
//!
//! - barrier state: one mutex for all four handler sets and the generation
//! - published frame: one rwlock, written once per generation
//! - client buffer: one mutex per connection, never shared across clients

pub mod acquisition;
pub mod context;
pub mod handler;
pub mod published;
pub mod sender;
pub mod server;

pub use acquisition::{AcquisitionError, AcquisitionLoop, AcquisitionStats};
pub use context::StreamContext;
pub use handler::{CloseReason, HandlerError, HandlerReport, HandlerWorker};
pub use published::PublishedFrame;
pub use sender::{SenderStats, SenderWorker};
pub use server::{RunningServer, Server, ServerError, ServerReport};
