// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for wabridge integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without a browser or Telegram.
//!
//! # Components
//!
//! - [`MockSource`] - Scripted snapshot source
//! - [`MockMediaFetcher`] - Scripted media fetch outcomes
//! - [`MockSink`] - Delivery sink with failure injection and capture
//! - [`TestHarness`] - Mocks plus a temp SQLite store

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod harness;
pub mod mock_media;
pub mod mock_sink;
pub mod mock_source;

pub use harness::{TestHarness, TestHarnessBuilder, fast_config};
pub use mock_media::MockMediaFetcher;
pub use mock_sink::MockSink;
pub use mock_source::MockSource;

// A panicking test must not cascade into every other assertion.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
