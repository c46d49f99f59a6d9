// Copyright 2024-2026 vram-pressure Contributors
// SPDX-License-Identifier: Apache-2.0

//! Direct3D 12 device backend.
//!
//! Offscreen only: a direct queue, two frame allocators guarded by one fence,
//! committed RGBA8 render targets for slots and RTV heaps as descriptor
//! tables. Budget counters come from `IDXGIAdapter3::QueryVideoMemoryInfo`.

use std::collections::HashMap;

use windows::core::Interface;
use windows::Win32::Foundation::{CloseHandle, E_OUTOFMEMORY, HANDLE};
use windows::Win32::Graphics::Direct3D::D3D_FEATURE_LEVEL_11_0;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::{DXGI_FORMAT_R8G8B8A8_UNORM, DXGI_SAMPLE_DESC};
use windows::Win32::Graphics::Dxgi::*;
use windows::Win32::System::Threading::{CreateEventW, WaitForSingleObject, INFINITE};

use super::device::{
    DescriptorTableId, GpuBackend, GpuDevice, GpuError, HeapId, MemoryInfo, SegmentGroup,
    SurfaceDesc, SurfaceId, ViewHandle,
};
use super::priority::ResidencyPriority;

const FRAME_COUNT: usize = 2;

impl From<windows::core::Error> for GpuError {
    fn from(e: windows::core::Error) -> Self {
        let code = e.code();
        if code == E_OUTOFMEMORY {
            GpuError::OutOfMemory { required: 0, available: 0 }
        } else if code == DXGI_ERROR_DEVICE_REMOVED
            || code == DXGI_ERROR_DEVICE_RESET
            || code == DXGI_ERROR_DEVICE_HUNG
        {
            GpuError::DeviceLost(e.to_string())
        } else {
            GpuError::Backend(e.to_string())
        }
    }
}

fn d3d12_priority(priority: ResidencyPriority) -> D3D12_RESIDENCY_PRIORITY {
    match priority {
        ResidencyPriority::Minimum => D3D12_RESIDENCY_PRIORITY_MINIMUM,
        ResidencyPriority::Low => D3D12_RESIDENCY_PRIORITY_LOW,
        ResidencyPriority::Normal => D3D12_RESIDENCY_PRIORITY_NORMAL,
        ResidencyPriority::High => D3D12_RESIDENCY_PRIORITY_HIGH,
        ResidencyPriority::Maximum => D3D12_RESIDENCY_PRIORITY_MAXIMUM,
    }
}

struct FrameContext {
    allocator: ID3D12CommandAllocator,
    fence_value: u64,
}

struct RtvTable {
    heap: ID3D12DescriptorHeap,
    capacity: u32,
}

/// Direct3D 12 device on the first hardware adapter.
pub struct D3d12Gpu {
    name: String,
    adapter: IDXGIAdapter3,
    device: ID3D12Device1,
    queue: ID3D12CommandQueue,
    frames: Vec<FrameContext>,
    frame_index: usize,
    command_list: ID3D12GraphicsCommandList,
    recording: bool,
    fence: ID3D12Fence,
    fence_event: HANDLE,
    next_fence_value: u64,
    rtv_increment: usize,
    next_id: u64,
    surfaces: HashMap<u64, ID3D12Resource>,
    tables: HashMap<u64, RtvTable>,
    heaps: HashMap<u64, ID3D12Heap>,
}

impl D3d12Gpu {
    /// Bring up the device, queue, frame allocators and fence.
    pub fn new() -> Result<Self, GpuError> {
        // SAFETY: plain COM calls on freshly created objects; every out
        // parameter is checked before use.
        unsafe {
            let factory: IDXGIFactory4 = CreateDXGIFactory1()?;
            let (adapter, device, name) = pick_adapter(&factory)?;

            let queue: ID3D12CommandQueue =
                device.CreateCommandQueue(&D3D12_COMMAND_QUEUE_DESC {
                    Type: D3D12_COMMAND_LIST_TYPE_DIRECT,
                    ..Default::default()
                })?;

            let mut frames = Vec::with_capacity(FRAME_COUNT);
            for _ in 0..FRAME_COUNT {
                let allocator: ID3D12CommandAllocator =
                    device.CreateCommandAllocator(D3D12_COMMAND_LIST_TYPE_DIRECT)?;
                frames.push(FrameContext { allocator, fence_value: 0 });
            }

            let command_list: ID3D12GraphicsCommandList = device.CreateCommandList(
                0,
                D3D12_COMMAND_LIST_TYPE_DIRECT,
                &frames[0].allocator,
                None,
            )?;
            command_list.Close()?;

            let fence: ID3D12Fence = device.CreateFence(0, D3D12_FENCE_FLAG_NONE)?;
            let fence_event = CreateEventW(None, false, false, None)?;
            let rtv_increment =
                device.GetDescriptorHandleIncrementSize(D3D12_DESCRIPTOR_HEAP_TYPE_RTV) as usize;

            Ok(Self {
                name,
                adapter,
                device,
                queue,
                frames,
                frame_index: 0,
                command_list,
                recording: false,
                fence,
                fence_event,
                next_fence_value: 1,
                rtv_increment,
                next_id: 1,
                surfaces: HashMap::new(),
                tables: HashMap::new(),
                heaps: HashMap::new(),
            })
        }
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn rtv_handle(&self, view: ViewHandle) -> Option<D3D12_CPU_DESCRIPTOR_HANDLE> {
        let table = self.tables.get(&view.table.0)?;
        if view.index >= table.capacity {
            return None;
        }
        // SAFETY: the heap is alive while it sits in `tables`.
        let start = unsafe { table.heap.GetCPUDescriptorHandleForHeapStart() };
        Some(D3D12_CPU_DESCRIPTOR_HANDLE {
            ptr: start.ptr + view.index as usize * self.rtv_increment,
        })
    }

    fn wait_for_fence(&self, value: u64) -> Result<(), GpuError> {
        if value == 0 {
            return Ok(());
        }
        // SAFETY: fence and event live as long as `self`.
        unsafe {
            if self.fence.GetCompletedValue() < value {
                self.fence.SetEventOnCompletion(value, self.fence_event)?;
                WaitForSingleObject(self.fence_event, INFINITE);
            }
        }
        Ok(())
    }
}

unsafe fn pick_adapter(
    factory: &IDXGIFactory4,
) -> Result<(IDXGIAdapter3, ID3D12Device1, String), GpuError> {
    let mut index = 0;
    loop {
        let adapter: IDXGIAdapter1 = match factory.EnumAdapters1(index) {
            Ok(adapter) => adapter,
            Err(e) if e.code() == DXGI_ERROR_NOT_FOUND => return Err(GpuError::NoAdapter),
            Err(e) => return Err(e.into()),
        };
        index += 1;

        let desc = adapter.GetDesc1()?;
        if desc.Flags & DXGI_ADAPTER_FLAG_SOFTWARE.0 as u32 != 0 {
            continue;
        }

        let mut device: Option<ID3D12Device1> = None;
        if D3D12CreateDevice(&adapter, D3D_FEATURE_LEVEL_11_0, &mut device).is_err() {
            continue;
        }
        if let Some(device) = device {
            let adapter: IDXGIAdapter3 = adapter.cast()?;
            let name = String::from_utf16_lossy(&desc.Description)
                .trim_end_matches('\0')
                .to_string();
            return Ok((adapter, device, name));
        }
    }
}

impl GpuDevice for D3d12Gpu {
    fn backend(&self) -> GpuBackend {
        GpuBackend::D3d12
    }

    fn adapter_name(&self) -> &str {
        &self.name
    }

    fn create_surface(&mut self, desc: &SurfaceDesc) -> Result<SurfaceId, GpuError> {
        if desc.bytes_per_pixel != 4 {
            return Err(GpuError::Backend(format!(
                "unsupported surface format: {} bytes per pixel",
                desc.bytes_per_pixel
            )));
        }

        let heap_props = D3D12_HEAP_PROPERTIES {
            Type: D3D12_HEAP_TYPE_DEFAULT,
            ..Default::default()
        };
        let resource_desc = D3D12_RESOURCE_DESC {
            Dimension: D3D12_RESOURCE_DIMENSION_TEXTURE2D,
            Width: desc.width as u64,
            Height: desc.height,
            DepthOrArraySize: 1,
            MipLevels: 1,
            Format: DXGI_FORMAT_R8G8B8A8_UNORM,
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            Flags: D3D12_RESOURCE_FLAG_ALLOW_RENDER_TARGET,
            ..Default::default()
        };
        let clear_value = D3D12_CLEAR_VALUE {
            Format: DXGI_FORMAT_R8G8B8A8_UNORM,
            Anonymous: D3D12_CLEAR_VALUE_0 { Color: [0.0, 0.0, 0.0, 1.0] },
        };

        let mut resource: Option<ID3D12Resource> = None;
        // SAFETY: all descriptors outlive the call.
        let created = unsafe {
            self.device.CreateCommittedResource(
                &heap_props,
                D3D12_HEAP_FLAG_NONE,
                &resource_desc,
                D3D12_RESOURCE_STATE_RENDER_TARGET,
                Some(&clear_value),
                &mut resource,
            )
        };
        if let Err(e) = created {
            return Err(match GpuError::from(e) {
                GpuError::OutOfMemory { .. } => GpuError::OutOfMemory {
                    required: desc.size_bytes(),
                    available: 0,
                },
                other => other,
            });
        }
        let resource = resource
            .ok_or_else(|| GpuError::Backend("CreateCommittedResource returned no resource".into()))?;

        let id = self.alloc_id();
        self.surfaces.insert(id, resource);
        Ok(SurfaceId(id))
    }

    fn destroy_surface(&mut self, surface: SurfaceId) {
        self.surfaces.remove(&surface.0);
    }

    fn set_residency_priority(
        &mut self,
        surface: SurfaceId,
        priority: ResidencyPriority,
    ) -> Result<(), GpuError> {
        let resource = self
            .surfaces
            .get(&surface.0)
            .ok_or_else(|| GpuError::InvalidHandle(format!("surface id={}", surface.0)))?;
        let pageable: ID3D12Pageable = resource.cast()?;
        let value = d3d12_priority(priority);
        // SAFETY: one object, one priority, both on the stack for the call.
        unsafe { self.device.SetResidencyPriority(1, &Some(pageable), &value)? };
        Ok(())
    }

    fn create_descriptor_table(&mut self, capacity: u32) -> Result<DescriptorTableId, GpuError> {
        // SAFETY: descriptor outlives the call.
        let heap: ID3D12DescriptorHeap = unsafe {
            self.device.CreateDescriptorHeap(&D3D12_DESCRIPTOR_HEAP_DESC {
                Type: D3D12_DESCRIPTOR_HEAP_TYPE_RTV,
                NumDescriptors: capacity,
                ..Default::default()
            })?
        };
        let id = self.alloc_id();
        self.tables.insert(id, RtvTable { heap, capacity });
        Ok(DescriptorTableId(id))
    }

    fn destroy_descriptor_table(&mut self, table: DescriptorTableId) {
        self.tables.remove(&table.0);
    }

    fn write_view(
        &mut self,
        table: DescriptorTableId,
        index: u32,
        surface: SurfaceId,
    ) -> ViewHandle {
        let view = ViewHandle { table, index };
        if let (Some(handle), Some(resource)) = (self.rtv_handle(view), self.surfaces.get(&surface.0)) {
            // SAFETY: handle lies inside a live RTV heap.
            unsafe { self.device.CreateRenderTargetView(resource, None, handle) };
        }
        view
    }

    fn create_heap(&mut self, bytes: u64) -> Result<HeapId, GpuError> {
        let desc = D3D12_HEAP_DESC {
            SizeInBytes: bytes,
            Properties: D3D12_HEAP_PROPERTIES {
                Type: D3D12_HEAP_TYPE_DEFAULT,
                ..Default::default()
            },
            Alignment: 0,
            Flags: D3D12_HEAP_FLAG_ALLOW_ONLY_RT_DS_TEXTURES,
        };
        let mut heap: Option<ID3D12Heap> = None;
        // SAFETY: descriptor outlives the call.
        unsafe { self.device.CreateHeap(&desc, &mut heap)? };
        let heap = heap.ok_or_else(|| GpuError::Backend("CreateHeap returned no heap".into()))?;
        let id = self.alloc_id();
        self.heaps.insert(id, heap);
        Ok(HeapId(id))
    }

    fn destroy_heap(&mut self, heap: HeapId) {
        self.heaps.remove(&heap.0);
    }

    fn begin_commands(&mut self) -> Result<(), GpuError> {
        let fence_value = self.frames[self.frame_index].fence_value;
        self.wait_for_fence(fence_value)?;

        let frame = &self.frames[self.frame_index];
        // SAFETY: the allocator's previous work has retired (fence wait above).
        unsafe {
            frame.allocator.Reset()?;
            self.command_list.Reset(&frame.allocator, None)?;
        }
        self.recording = true;
        Ok(())
    }

    fn clear_view(&mut self, view: ViewHandle, color: [f32; 4]) {
        if !self.recording {
            return;
        }
        if let Some(handle) = self.rtv_handle(view) {
            // SAFETY: list is open; color lives for the call.
            unsafe { self.command_list.ClearRenderTargetView(handle, color.as_ptr(), None) };
        }
    }

    fn submit(&mut self) -> Result<u64, GpuError> {
        if !self.recording {
            return Err(GpuError::Backend("no open command context".into()));
        }
        self.recording = false;

        let value = self.next_fence_value;
        self.next_fence_value += 1;
        // SAFETY: list was opened by `begin_commands`.
        unsafe {
            self.command_list.Close()?;
            let list: ID3D12CommandList = self.command_list.cast()?;
            self.queue.ExecuteCommandLists(&[Some(list)]);
            self.queue.Signal(&self.fence, value)?;
        }
        self.frames[self.frame_index].fence_value = value;
        self.frame_index = (self.frame_index + 1) % FRAME_COUNT;
        Ok(value)
    }

    fn wait_idle(&mut self) -> Result<(), GpuError> {
        let value = self.next_fence_value;
        self.next_fence_value += 1;
        // SAFETY: queue and fence live as long as `self`.
        unsafe { self.queue.Signal(&self.fence, value)? };
        self.wait_for_fence(value)
    }

    fn query_memory_info(&self, group: SegmentGroup) -> Result<MemoryInfo, GpuError> {
        let group = match group {
            SegmentGroup::Local => DXGI_MEMORY_SEGMENT_GROUP_LOCAL,
            SegmentGroup::NonLocal => DXGI_MEMORY_SEGMENT_GROUP_NON_LOCAL,
        };
        let mut info = DXGI_QUERY_VIDEO_MEMORY_INFO::default();
        // SAFETY: `info` is a valid out parameter.
        unsafe { self.adapter.QueryVideoMemoryInfo(0, group, &mut info)? };
        Ok(MemoryInfo {
            budget: info.Budget,
            current_usage: info.CurrentUsage,
            available_for_reservation: info.AvailableForReservation,
            current_reservation: info.CurrentReservation,
        })
    }
}

impl Drop for D3d12Gpu {
    fn drop(&mut self) {
        let _ = self.wait_idle();
        self.surfaces.clear();
        self.tables.clear();
        self.heaps.clear();
        // SAFETY: the event was created in `new` and is closed exactly once.
        unsafe {
            let _ = CloseHandle(self.fence_event);
        }
    }
}
