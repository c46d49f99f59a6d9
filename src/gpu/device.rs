// Copyright 2024-2026 vram-pressure Contributors
// SPDX-License-Identifier: Apache-2.0

//! GPU device contract.
//!
//! The controller only needs a narrow slice of a graphics device: fixed-size
//! render surfaces, a descriptor table to hold their views, raw heaps, one
//! command context per tick and the adapter's memory-budget counters. Backends
//! hand out opaque ids; the underlying objects stay inside the backend.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::priority::ResidencyPriority;

/// Device backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuBackend {
    /// Direct3D 12 on the first hardware adapter (Windows only)
    D3d12,
    /// Deterministic in-process device, no GPU involved
    Simulated,
}

impl Default for GpuBackend {
    fn default() -> Self {
        if cfg!(all(windows, feature = "d3d12")) {
            Self::D3d12
        } else {
            Self::Simulated
        }
    }
}

impl fmt::Display for GpuBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuBackend::D3d12 => write!(f, "d3d12"),
            GpuBackend::Simulated => write!(f, "simulated"),
        }
    }
}

impl FromStr for GpuBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "d3d12" | "dx12" => Ok(Self::D3d12),
            "simulated" | "sim" => Ok(Self::Simulated),
            other => Err(format!("unknown backend '{}'", other)),
        }
    }
}

/// Geometry of one render surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceDesc {
    pub width: u32,
    pub height: u32,
    pub bytes_per_pixel: u32,
}

impl SurfaceDesc {
    /// 2048x2048 RGBA8, 16 MiB per surface.
    pub const SLOT: SurfaceDesc = SurfaceDesc {
        width: 2048,
        height: 2048,
        bytes_per_pixel: 4,
    };

    pub const fn size_bytes(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.bytes_per_pixel as u64
    }
}

/// Opaque handle to a device surface allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u64);

/// Opaque handle to a descriptor table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorTableId(pub u64);

/// Opaque handle to a raw device heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapId(pub u64);

/// A view registered in a descriptor table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewHandle {
    pub table: DescriptorTableId,
    pub index: u32,
}

/// Memory segment group used for budget accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentGroup {
    /// Dedicated device memory
    Local,
    /// System memory visible to the device
    NonLocal,
}

/// Budget counters for one segment group, as reported by the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub budget: u64,
    pub current_usage: u64,
    pub available_for_reservation: u64,
    pub current_reservation: u64,
}

/// GPU Error Types
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("No compatible GPU adapter found")]
    NoAdapter,

    #[error("Adapter handle unavailable")]
    AdapterUnavailable,

    #[error("Out of GPU memory: required {required} bytes, available {available} bytes")]
    OutOfMemory { required: u64, available: u64 },

    #[error("GPU device lost: {0}")]
    DeviceLost(String),

    #[error("Unknown handle: {0}")]
    InvalidHandle(String),

    #[error("Backend not available: {0}")]
    BackendUnavailable(GpuBackend),

    #[error("GPU operation failed: {0}")]
    Backend(String),
}

/// The device operations the pressure controller relies on.
///
/// All calls happen on the controller thread. Destruction of anything that
/// submitted work may still reference is only legal after `wait_idle`.
pub trait GpuDevice {
    fn backend(&self) -> GpuBackend;

    /// Human-readable adapter description.
    fn adapter_name(&self) -> &str;

    /// Create a render surface in device-local memory.
    fn create_surface(&mut self, desc: &SurfaceDesc) -> Result<SurfaceId, GpuError>;

    fn destroy_surface(&mut self, surface: SurfaceId);

    fn set_residency_priority(
        &mut self,
        surface: SurfaceId,
        priority: ResidencyPriority,
    ) -> Result<(), GpuError>;

    fn create_descriptor_table(&mut self, capacity: u32) -> Result<DescriptorTableId, GpuError>;

    fn destroy_descriptor_table(&mut self, table: DescriptorTableId);

    /// Write a render view for `surface` into entry `index` of `table`.
    ///
    /// `index` must be below the table's capacity.
    fn write_view(&mut self, table: DescriptorTableId, index: u32, surface: SurfaceId)
        -> ViewHandle;

    fn create_heap(&mut self, bytes: u64) -> Result<HeapId, GpuError>;

    fn destroy_heap(&mut self, heap: HeapId);

    /// Open the command context for this tick, waiting for its previous use
    /// to retire first.
    fn begin_commands(&mut self) -> Result<(), GpuError>;

    /// Record a clear of `view`. Only valid between `begin_commands` and `submit`.
    fn clear_view(&mut self, view: ViewHandle, color: [f32; 4]);

    /// Close and execute the open context, signal the fence and return the
    /// signaled value.
    fn submit(&mut self) -> Result<u64, GpuError>;

    /// Block until all submitted work has completed.
    fn wait_idle(&mut self) -> Result<(), GpuError>;

    fn query_memory_info(&self, group: SegmentGroup) -> Result<MemoryInfo, GpuError>;
}
