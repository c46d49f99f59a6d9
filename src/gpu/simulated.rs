// Copyright 2024-2026 vram-pressure Contributors
// SPDX-License-Identifier: Apache-2.0

//! Simulated GPU device (testing + dry-run backend).
//!
//! Models a device with a fixed byte capacity, two frames of submitted work in
//! flight, and synthetic memory-budget counters. Misuse that a real driver
//! would punish with undefined behavior (destroying a surface an unfinished
//! submission still references, clearing outside an open context, freeing an
//! unknown handle) is counted in [`SimStats::violations`] instead.

use std::collections::HashMap;

use super::device::{
    DescriptorTableId, GpuBackend, GpuDevice, GpuError, HeapId, MemoryInfo, SegmentGroup,
    SurfaceDesc, SurfaceId, ViewHandle,
};
use super::priority::ResidencyPriority;

/// Frames of work allowed in flight before `begin_commands` blocks.
const FRAMES_IN_FLIGHT: usize = 2;

#[derive(Debug)]
struct SimSurface {
    size: u64,
    priority: Option<ResidencyPriority>,
    clears: u64,
}

#[derive(Debug)]
struct SimTable {
    entries: Vec<Option<SurfaceId>>,
}

#[derive(Debug)]
struct Submission {
    fence: u64,
    touched: Vec<SurfaceId>,
}

/// Operation counters, useful for asserting what a call sequence did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimStats {
    pub surfaces_created: u64,
    pub surfaces_destroyed: u64,
    pub failed_allocations: u64,
    pub tables_created: u64,
    pub tables_destroyed: u64,
    pub views_written: u64,
    pub heaps_created: u64,
    pub heaps_destroyed: u64,
    pub submits: u64,
    pub drains: u64,
    /// Contract violations (see module docs). Always 0 for a correct caller.
    pub violations: u64,
}

/// Deterministic in-process GPU device.
pub struct SimulatedGpu {
    name: String,
    capacity: u64,
    next_id: u64,
    surfaces: HashMap<u64, SimSurface>,
    tables: HashMap<u64, SimTable>,
    heaps: HashMap<u64, u64>,
    recording: Option<Vec<ViewHandle>>,
    in_flight: Vec<Submission>,
    next_fence: u64,
    completed_fence: u64,
    adapter_available: bool,
    non_local: MemoryInfo,
    stats: SimStats,
}

impl SimulatedGpu {
    /// Create a device that can hold `capacity` bytes of surfaces and heaps.
    pub fn new(capacity: u64) -> Self {
        Self {
            name: "Simulated GPU".to_string(),
            capacity,
            next_id: 1,
            surfaces: HashMap::new(),
            tables: HashMap::new(),
            heaps: HashMap::new(),
            recording: None,
            in_flight: Vec::new(),
            next_fence: 1,
            completed_fence: 0,
            adapter_available: true,
            non_local: MemoryInfo {
                budget: 16 * 1024 * 1024 * 1024,
                current_usage: 0,
                available_for_reservation: 8 * 1024 * 1024 * 1024,
                current_reservation: 0,
            },
            stats: SimStats::default(),
        }
    }

    /// Create a device that fits exactly `slots` surfaces of `desc`.
    pub fn with_slot_capacity(desc: &SurfaceDesc, slots: u64) -> Self {
        Self::new(desc.size_bytes() * slots)
    }

    /// Change the capacity, e.g. to model memory freed by another process.
    pub fn set_capacity(&mut self, capacity: u64) {
        self.capacity = capacity;
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Make budget queries fail, as after adapter loss.
    pub fn set_adapter_available(&mut self, available: bool) {
        self.adapter_available = available;
    }

    /// Override the counters reported for the non-local group.
    pub fn set_non_local_info(&mut self, info: MemoryInfo) {
        self.non_local = info;
    }

    pub fn stats(&self) -> &SimStats {
        &self.stats
    }

    /// Bytes held by live surfaces and heaps.
    pub fn allocated_bytes(&self) -> u64 {
        self.surfaces.values().map(|s| s.size).sum::<u64>() + self.heaps.values().sum::<u64>()
    }

    pub fn live_surfaces(&self) -> usize {
        self.surfaces.len()
    }

    pub fn live_heaps(&self) -> usize {
        self.heaps.len()
    }

    pub fn live_tables(&self) -> usize {
        self.tables.len()
    }

    pub fn is_live(&self, surface: SurfaceId) -> bool {
        self.surfaces.contains_key(&surface.0)
    }

    /// Times `surface` was cleared by completed or submitted work.
    pub fn clear_count(&self, surface: SurfaceId) -> u64 {
        self.surfaces.get(&surface.0).map(|s| s.clears).unwrap_or(0)
    }

    pub fn priority_of(&self, surface: SurfaceId) -> Option<ResidencyPriority> {
        self.surfaces.get(&surface.0).and_then(|s| s.priority)
    }

    /// Capacity of a live descriptor table.
    pub fn table_capacity(&self, table: DescriptorTableId) -> Option<u32> {
        self.tables.get(&table.0).map(|t| t.entries.len() as u32)
    }

    /// Surface whose view currently occupies `index` of `table`.
    pub fn view_target(&self, table: DescriptorTableId, index: u32) -> Option<SurfaceId> {
        self.tables
            .get(&table.0)
            .and_then(|t| t.entries.get(index as usize).copied().flatten())
    }

    pub fn completed_fence(&self) -> u64 {
        self.completed_fence
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn reserve(&mut self, bytes: u64) -> Result<(), GpuError> {
        let used = self.allocated_bytes();
        if used + bytes > self.capacity {
            self.stats.failed_allocations += 1;
            return Err(GpuError::OutOfMemory {
                required: bytes,
                available: self.capacity.saturating_sub(used),
            });
        }
        Ok(())
    }

    fn retire_until(&mut self, keep_in_flight: usize) {
        while self.in_flight.len() > keep_in_flight {
            let done = self.in_flight.remove(0);
            self.completed_fence = done.fence;
        }
    }

    fn is_referenced_by_pending_work(&self, surface: SurfaceId) -> bool {
        self.in_flight.iter().any(|s| s.touched.contains(&surface))
            || self
                .recording
                .as_ref()
                .is_some_and(|views| views.iter().any(|v| self.view_target(v.table, v.index) == Some(surface)))
    }
}

impl GpuDevice for SimulatedGpu {
    fn backend(&self) -> GpuBackend {
        GpuBackend::Simulated
    }

    fn adapter_name(&self) -> &str {
        &self.name
    }

    fn create_surface(&mut self, desc: &SurfaceDesc) -> Result<SurfaceId, GpuError> {
        let size = desc.size_bytes();
        self.reserve(size)?;
        let id = self.alloc_id();
        self.surfaces.insert(id, SimSurface { size, priority: None, clears: 0 });
        self.stats.surfaces_created += 1;
        Ok(SurfaceId(id))
    }

    fn destroy_surface(&mut self, surface: SurfaceId) {
        if self.is_referenced_by_pending_work(surface) {
            self.stats.violations += 1;
        }
        match self.surfaces.remove(&surface.0) {
            Some(_) => self.stats.surfaces_destroyed += 1,
            None => self.stats.violations += 1,
        }
    }

    fn set_residency_priority(
        &mut self,
        surface: SurfaceId,
        priority: ResidencyPriority,
    ) -> Result<(), GpuError> {
        let entry = self
            .surfaces
            .get_mut(&surface.0)
            .ok_or_else(|| GpuError::InvalidHandle(format!("surface id={}", surface.0)))?;
        entry.priority = Some(priority);
        Ok(())
    }

    fn create_descriptor_table(&mut self, capacity: u32) -> Result<DescriptorTableId, GpuError> {
        let id = self.alloc_id();
        self.tables.insert(id, SimTable { entries: vec![None; capacity as usize] });
        self.stats.tables_created += 1;
        Ok(DescriptorTableId(id))
    }

    fn destroy_descriptor_table(&mut self, table: DescriptorTableId) {
        match self.tables.remove(&table.0) {
            Some(_) => self.stats.tables_destroyed += 1,
            None => self.stats.violations += 1,
        }
    }

    fn write_view(
        &mut self,
        table: DescriptorTableId,
        index: u32,
        surface: SurfaceId,
    ) -> ViewHandle {
        let slot = self
            .tables
            .get_mut(&table.0)
            .and_then(|t| t.entries.get_mut(index as usize));
        match slot {
            Some(entry) => {
                *entry = Some(surface);
                self.stats.views_written += 1;
            }
            None => self.stats.violations += 1,
        }
        ViewHandle { table, index }
    }

    fn create_heap(&mut self, bytes: u64) -> Result<HeapId, GpuError> {
        self.reserve(bytes)?;
        let id = self.alloc_id();
        self.heaps.insert(id, bytes);
        self.stats.heaps_created += 1;
        Ok(HeapId(id))
    }

    fn destroy_heap(&mut self, heap: HeapId) {
        match self.heaps.remove(&heap.0) {
            Some(_) => self.stats.heaps_destroyed += 1,
            None => self.stats.violations += 1,
        }
    }

    fn begin_commands(&mut self) -> Result<(), GpuError> {
        if self.recording.is_some() {
            return Err(GpuError::Backend("command context already open".into()));
        }
        self.retire_until(FRAMES_IN_FLIGHT - 1);
        self.recording = Some(Vec::new());
        Ok(())
    }

    fn clear_view(&mut self, view: ViewHandle, _color: [f32; 4]) {
        match self.recording.as_mut() {
            Some(views) => views.push(view),
            None => self.stats.violations += 1,
        }
    }

    fn submit(&mut self) -> Result<u64, GpuError> {
        let views = self
            .recording
            .take()
            .ok_or_else(|| GpuError::Backend("no open command context".into()))?;

        let mut touched = Vec::with_capacity(views.len());
        for view in views {
            match self.view_target(view.table, view.index) {
                Some(surface) => {
                    if let Some(s) = self.surfaces.get_mut(&surface.0) {
                        s.clears += 1;
                        touched.push(surface);
                    } else {
                        self.stats.violations += 1;
                    }
                }
                None => self.stats.violations += 1,
            }
        }

        let fence = self.next_fence;
        self.next_fence += 1;
        self.in_flight.push(Submission { fence, touched });
        self.stats.submits += 1;
        Ok(fence)
    }

    fn wait_idle(&mut self) -> Result<(), GpuError> {
        self.retire_until(0);
        self.stats.drains += 1;
        Ok(())
    }

    fn query_memory_info(&self, group: SegmentGroup) -> Result<MemoryInfo, GpuError> {
        if !self.adapter_available {
            return Err(GpuError::AdapterUnavailable);
        }
        Ok(match group {
            SegmentGroup::Local => MemoryInfo {
                budget: self.capacity,
                current_usage: self.allocated_bytes(),
                available_for_reservation: self.capacity / 2,
                current_reservation: 0,
            },
            SegmentGroup::NonLocal => self.non_local,
        })
    }
}

#[cfg(test)]
#[path = "simulated_tests.rs"]
mod tests;
