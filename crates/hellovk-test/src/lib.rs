//! Test harness for the hellovk frame scheduler.
//!
//! Provides [`MockBackend`], a [`FrameBackend`](hellovk_app::FrameBackend)
//! that runs without a GPU and records every call the scheduler makes.

pub mod mock;

pub use mock::{AcquireOrder, HandleKind, MockBackend, MockEvent};

use hellovk_app::FrameScheduler;
use hellovk_gpu::Result;

/// A scheduler over a fresh mock with `slot_count` slots, plus a probe
/// sharing the mock's state.
pub fn mock_scheduler(slot_count: usize) -> Result<(FrameScheduler<MockBackend>, MockBackend)> {
    scheduler_with(MockBackend::new(slot_count))
}

/// A scheduler over `backend`, plus a probe sharing its state.
pub fn scheduler_with(backend: MockBackend) -> Result<(FrameScheduler<MockBackend>, MockBackend)> {
    let probe = backend.clone();
    Ok((FrameScheduler::new(backend)?, probe))
}
