// Copyright 2024-2026 vram-pressure Contributors
// SPDX-License-Identifier: Apache-2.0

//! Tick span and outcome recording.

use std::fmt::Display;

use tracing::{debug_span, Span};

/// Records an operation's outcome on a span declared with `status` and
/// `error.message` fields.
pub trait SpanExt {
    fn record_result<T, E: Display>(&self, result: &Result<T, E>);
}

impl SpanExt for Span {
    fn record_result<T, E: Display>(&self, result: &Result<T, E>) {
        let status = if result.is_ok() { "ok" } else { "error" };
        self.record("status", status);
        if let Err(e) = result {
            self.record("error.message", tracing::field::display(e));
        }
    }
}

/// Factory for the per-tick span.
pub struct TickSpan;

impl TickSpan {
    /// Fields filled in later: `status`, `error.message`, `resized`, `cleared`.
    pub fn new(frame: u64) -> Span {
        debug_span!(
            "tick",
            frame,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            resized = tracing::field::Empty,
            cleared = tracing::field::Empty,
        )
    }
}
