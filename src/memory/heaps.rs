// Copyright 2024-2026 vram-pressure Contributors
// SPDX-License-Identifier: Apache-2.0

//! Raw heap reservations driven by the record's feature toggles.

use tracing::{info, warn};

use crate::gpu::{GpuDevice, HeapId};

/// Heap sizes that can be toggled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapSize {
    HalfGib,
    OneGib,
}

impl HeapSize {
    pub const ALL: [HeapSize; 2] = [HeapSize::HalfGib, HeapSize::OneGib];

    pub fn bytes(self) -> u64 {
        match self {
            HeapSize::HalfGib => 512 * 1024 * 1024,
            HeapSize::OneGib => 1024 * 1024 * 1024,
        }
    }

    fn index(self) -> usize {
        match self {
            HeapSize::HalfGib => 0,
            HeapSize::OneGib => 1,
        }
    }
}

/// Requested heap state, one flag per [`HeapSize`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapToggles {
    pub half_gib: bool,
    pub one_gib: bool,
}

impl HeapToggles {
    fn wants(&self, size: HeapSize) -> bool {
        match size {
            HeapSize::HalfGib => self.half_gib,
            HeapSize::OneGib => self.one_gib,
        }
    }
}

/// Live heaps created in response to the toggles.
#[derive(Debug, Default)]
pub struct HeapReservations {
    live: [Option<HeapId>; 2],
}

impl HeapReservations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_live(&self, size: HeapSize) -> bool {
        self.live[size.index()].is_some()
    }

    /// Whether `reconcile` would create or destroy anything.
    pub fn needs_reconcile(&self, toggles: HeapToggles) -> bool {
        HeapSize::ALL
            .iter()
            .any(|&size| toggles.wants(size) != self.is_live(size))
    }

    /// Create heaps toggled on and destroy heaps toggled off.
    ///
    /// The GPU must be drained. A failed creation leaves the heap absent; the
    /// next call tries again.
    pub fn reconcile<D: GpuDevice + ?Sized>(&mut self, device: &mut D, toggles: HeapToggles) {
        for size in HeapSize::ALL {
            let slot = &mut self.live[size.index()];
            match (toggles.wants(size), *slot) {
                (true, None) => match device.create_heap(size.bytes()) {
                    Ok(id) => {
                        *slot = Some(id);
                        info!(bytes = size.bytes(), "heap reserved");
                    }
                    Err(e) => warn!(bytes = size.bytes(), error = %e, "heap reservation failed"),
                },
                (false, Some(id)) => {
                    device.destroy_heap(id);
                    *slot = None;
                    info!(bytes = size.bytes(), "heap released");
                }
                _ => {}
            }
        }
    }

    /// Total bytes of live heaps.
    pub fn allocated_bytes(&self) -> u64 {
        HeapSize::ALL
            .iter()
            .filter(|&&size| self.is_live(size))
            .map(|size| size.bytes())
            .sum()
    }

    /// Destroy every live heap. The GPU must be drained.
    pub fn release<D: GpuDevice + ?Sized>(&mut self, device: &mut D) {
        for slot in &mut self.live {
            if let Some(id) = slot.take() {
                device.destroy_heap(id);
            }
        }
    }
}
