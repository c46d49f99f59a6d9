// Copyright 2024-2026 vram-pressure Contributors
// SPDX-License-Identifier: Apache-2.0

//! Memory-budget sampler.
//!
//! Copies the adapter's budget counters verbatim. A failed query leaves the
//! previous snapshot in place.

use serde::Serialize;
use tracing::debug;

use crate::gpu::{GpuDevice, GpuError, MemoryInfo, SegmentGroup};

/// Budget counters for both segment groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TelemetrySnapshot {
    pub local: MemoryInfo,
    pub non_local: MemoryInfo,
}

/// Holds the last good snapshot.
#[derive(Debug, Default)]
pub struct MemorySampler {
    last: TelemetrySnapshot,
    samples: u64,
    skipped: u64,
}

impl MemorySampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Query both groups. Returns the fresh snapshot, or `None` when the
    /// query failed and the previous one was kept.
    pub fn sample<D: GpuDevice + ?Sized>(&mut self, device: &D) -> Option<TelemetrySnapshot> {
        match query(device) {
            Ok(snapshot) => {
                self.last = snapshot;
                self.samples += 1;
                Some(snapshot)
            }
            Err(e) => {
                self.skipped += 1;
                debug!(error = %e, skipped = self.skipped, "telemetry sample skipped");
                None
            }
        }
    }

    /// Last good snapshot (all zero before the first success).
    pub fn last(&self) -> &TelemetrySnapshot {
        &self.last
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

fn query<D: GpuDevice + ?Sized>(device: &D) -> Result<TelemetrySnapshot, GpuError> {
    Ok(TelemetrySnapshot {
        local: device.query_memory_info(SegmentGroup::Local)?,
        non_local: device.query_memory_info(SegmentGroup::NonLocal)?,
    })
}
