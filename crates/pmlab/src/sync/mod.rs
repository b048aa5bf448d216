// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Synchronization primitives of the streaming engine.
//!
//! - `barrier` - Generational readiness barrier (producer vs. handlers)
//! - `buffer` - Bounded per-connection frame queue (handler vs. sender)

pub mod barrier;
pub mod buffer;

pub use barrier::{
    BarrierError, BarrierSnapshot, GenerationBarrier, GenerationWait, Readiness, ShutdownHandle,
    WorkerHandle, DEFAULT_WAIT_TIMEOUT,
};
pub use buffer::{ClientBuffer, PopOutcome, PushOutcome, DEFAULT_BUFFER_CAPACITY};
