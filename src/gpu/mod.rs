// Copyright 2024-2026 vram-pressure Contributors
// SPDX-License-Identifier: Apache-2.0

//! GPU device abstraction and backends.

mod device;
mod priority;
mod simulated;

#[cfg(all(windows, feature = "d3d12"))]
mod d3d12;

#[cfg(all(windows, feature = "d3d12"))]
pub use d3d12::D3d12Gpu;
pub use device::{
    DescriptorTableId, GpuBackend, GpuDevice, GpuError, HeapId, MemoryInfo, SegmentGroup,
    SurfaceDesc, SurfaceId, ViewHandle,
};
pub use priority::{ParsePriorityError, ResidencyPriority};
pub use simulated::{SimStats, SimulatedGpu};

/// Bring up the configured backend.
///
/// `simulated_capacity` only applies to [`GpuBackend::Simulated`].
pub fn open_device(
    backend: GpuBackend,
    simulated_capacity: u64,
) -> Result<Box<dyn GpuDevice>, GpuError> {
    match backend {
        GpuBackend::Simulated => Ok(Box::new(SimulatedGpu::new(simulated_capacity))),
        #[cfg(all(windows, feature = "d3d12"))]
        GpuBackend::D3d12 => Ok(Box::new(D3d12Gpu::new()?)),
        #[cfg(not(all(windows, feature = "d3d12")))]
        GpuBackend::D3d12 => Err(GpuError::BackendUnavailable(backend)),
    }
}

impl<T: GpuDevice + ?Sized> GpuDevice for Box<T> {
    fn backend(&self) -> GpuBackend {
        (**self).backend()
    }

    fn adapter_name(&self) -> &str {
        (**self).adapter_name()
    }

    fn create_surface(&mut self, desc: &SurfaceDesc) -> Result<SurfaceId, GpuError> {
        (**self).create_surface(desc)
    }

    fn destroy_surface(&mut self, surface: SurfaceId) {
        (**self).destroy_surface(surface)
    }

    fn set_residency_priority(
        &mut self,
        surface: SurfaceId,
        priority: ResidencyPriority,
    ) -> Result<(), GpuError> {
        (**self).set_residency_priority(surface, priority)
    }

    fn create_descriptor_table(&mut self, capacity: u32) -> Result<DescriptorTableId, GpuError> {
        (**self).create_descriptor_table(capacity)
    }

    fn destroy_descriptor_table(&mut self, table: DescriptorTableId) {
        (**self).destroy_descriptor_table(table)
    }

    fn write_view(
        &mut self,
        table: DescriptorTableId,
        index: u32,
        surface: SurfaceId,
    ) -> ViewHandle {
        (**self).write_view(table, index, surface)
    }

    fn create_heap(&mut self, bytes: u64) -> Result<HeapId, GpuError> {
        (**self).create_heap(bytes)
    }

    fn destroy_heap(&mut self, heap: HeapId) {
        (**self).destroy_heap(heap)
    }

    fn begin_commands(&mut self) -> Result<(), GpuError> {
        (**self).begin_commands()
    }

    fn clear_view(&mut self, view: ViewHandle, color: [f32; 4]) {
        (**self).clear_view(view, color)
    }

    fn submit(&mut self) -> Result<u64, GpuError> {
        (**self).submit()
    }

    fn wait_idle(&mut self) -> Result<(), GpuError> {
        (**self).wait_idle()
    }

    fn query_memory_info(&self, group: SegmentGroup) -> Result<MemoryInfo, GpuError> {
        (**self).query_memory_info(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_simulated_device() {
        let device = open_device(GpuBackend::Simulated, 1 << 30).unwrap();
        assert_eq!(device.backend(), GpuBackend::Simulated);
        let local = device.query_memory_info(SegmentGroup::Local).unwrap();
        assert_eq!(local.budget, 1 << 30);
    }

    #[cfg(not(all(windows, feature = "d3d12")))]
    #[test]
    fn test_d3d12_unavailable_without_feature() {
        let result = open_device(GpuBackend::D3d12, 0);
        assert!(matches!(result, Err(GpuError::BackendUnavailable(GpuBackend::D3d12))));
    }
}
