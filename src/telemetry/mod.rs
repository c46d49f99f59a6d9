// Copyright 2024-2026 vram-pressure Contributors
// SPDX-License-Identifier: Apache-2.0

//! Telemetry: adapter memory-budget sampling plus structured logging.

mod logging;
mod sampler;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use sampler::{MemorySampler, TelemetrySnapshot};
pub use spans::{SpanExt, TickSpan};
