// Copyright 2024-2026 vram-pressure Contributors
// SPDX-License-Identifier: Apache-2.0

//! Residency keep-alive pass.
//!
//! Drivers demote allocations that no submitted work references. Clearing each
//! slot once per tick keeps every surface in the active set; the clears carry
//! no data dependency between slots and may execute in any order.

use super::pool::ResourcePool;
use crate::gpu::GpuDevice;

const CLEAR_COLORS: [[f32; 4]; 4] = [
    [0.2, 0.0, 0.0, 1.0],
    [0.0, 0.2, 0.0, 1.0],
    [0.0, 0.0, 0.2, 1.0],
    [0.2, 0.2, 0.0, 1.0],
];

/// Record one clear per slot into the open command context.
///
/// Returns the number of clears recorded.
pub fn touch_all<D: GpuDevice + ?Sized>(device: &mut D, pool: &ResourcePool) -> usize {
    for (i, slot) in pool.slots().iter().enumerate() {
        device.clear_view(slot.view(), CLEAR_COLORS[i % CLEAR_COLORS.len()]);
    }
    pool.len()
}
