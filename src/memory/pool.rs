// Copyright 2024-2026 vram-pressure Contributors
// SPDX-License-Identifier: Apache-2.0

//! Resource pool: a resizable set of fixed-size resident surfaces.

use tracing::{debug, info};

use super::BudgetClass;
use crate::gpu::{
    DescriptorTableId, GpuDevice, GpuError, ResidencyPriority, SurfaceDesc, SurfaceId, ViewHandle,
};

/// Configuration for a resource pool.
#[derive(Debug, Clone)]
pub struct ResourcePoolConfig {
    /// Geometry of every slot surface.
    pub surface: SurfaceDesc,
    /// Priority assigned to slots until changed.
    pub priority: ResidencyPriority,
    /// Extra descriptor entries reserved whenever the table grows.
    pub descriptor_headroom: u32,
}

impl Default for ResourcePoolConfig {
    fn default() -> Self {
        Self {
            surface: SurfaceDesc::SLOT,
            priority: ResidencyPriority::High,
            descriptor_headroom: 64,
        }
    }
}

/// One resident surface and its registered view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    surface: SurfaceId,
    view: ViewHandle,
    priority: ResidencyPriority,
}

impl Slot {
    pub fn surface(&self) -> SurfaceId {
        self.surface
    }

    pub fn view(&self) -> ViewHandle {
        self.view
    }

    pub fn priority(&self) -> ResidencyPriority {
        self.priority
    }
}

#[derive(Debug, Clone, Copy)]
struct DescriptorTable {
    id: DescriptorTableId,
    capacity: u32,
}

/// What a call to [`ResourcePool::resize`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResizeOutcome {
    /// Slot count implied by the requested bytes.
    pub requested: usize,
    /// Slot count after the call.
    pub achieved: usize,
    pub created: usize,
    pub destroyed: usize,
    /// Whether the descriptor table was replaced by a larger one.
    pub table_grown: bool,
    /// Whether growth stopped early on a device failure.
    pub shortfall: bool,
}

impl ResizeOutcome {
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.destroyed == 0 && !self.table_grown
    }
}

/// Number of `slot_size` slots needed to cover `target_bytes`, rounding up.
pub fn slots_for_bytes(target_bytes: u64, slot_size: u64) -> usize {
    if target_bytes == 0 || slot_size == 0 {
        return 0;
    }
    usize::try_from(target_bytes.div_ceil(slot_size)).unwrap_or(usize::MAX)
}

/// Ordered collection of slots plus the descriptor table holding their views.
///
/// Invariants: every slot's view lives at its own index in the current table,
/// and the table capacity is never below the slot count. The table only grows.
pub struct ResourcePool {
    class: BudgetClass,
    surface: SurfaceDesc,
    priority: ResidencyPriority,
    headroom: u32,
    slots: Vec<Slot>,
    table: Option<DescriptorTable>,
}

impl ResourcePool {
    pub fn new(class: BudgetClass, config: ResourcePoolConfig) -> Self {
        Self {
            class,
            surface: config.surface,
            priority: config.priority,
            headroom: config.descriptor_headroom,
            slots: Vec::new(),
            table: None,
        }
    }

    pub fn class(&self) -> BudgetClass {
        self.class
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn slot_size(&self) -> u64 {
        self.surface.size_bytes()
    }

    /// Bytes held resident by the pool.
    pub fn achieved_bytes(&self) -> u64 {
        self.slots.len() as u64 * self.slot_size()
    }

    /// Descriptor table capacity (0 before the first growth).
    pub fn capacity(&self) -> u32 {
        self.table.map(|t| t.capacity).unwrap_or(0)
    }

    pub fn table_id(&self) -> Option<DescriptorTableId> {
        self.table.map(|t| t.id)
    }

    pub fn priority(&self) -> ResidencyPriority {
        self.priority
    }

    /// Slot count a resize to `target_bytes` would aim for.
    pub fn target_slots(&self, target_bytes: u64) -> usize {
        slots_for_bytes(target_bytes, self.slot_size())
    }

    /// Grow or shrink toward `target_bytes`.
    ///
    /// The caller must have drained the GPU: trailing slots may be destroyed.
    /// Shrinking removes the most recently added slots first. Growth stops at
    /// the first allocation failure and the pool keeps what it has; the
    /// outcome's `shortfall` flag is the only report of that.
    pub fn resize<D: GpuDevice + ?Sized>(&mut self, device: &mut D, target_bytes: u64) -> ResizeOutcome {
        let requested = self.target_slots(target_bytes);
        let mut outcome = ResizeOutcome {
            requested,
            ..Default::default()
        };

        while self.slots.len() > requested {
            if let Some(slot) = self.slots.pop() {
                device.destroy_surface(slot.surface);
                outcome.destroyed += 1;
            }
        }

        if requested > self.capacity() as usize {
            match self.grow_table(device, requested) {
                Ok(()) => outcome.table_grown = true,
                Err(e) => {
                    debug!(class = %self.class, requested, error = %e, "descriptor table growth failed");
                    outcome.shortfall = true;
                }
            }
        }

        if !outcome.shortfall {
            while self.slots.len() < requested {
                match self.create_slot(device) {
                    Ok(slot) => {
                        self.slots.push(slot);
                        outcome.created += 1;
                    }
                    Err(e) => {
                        debug!(
                            class = %self.class,
                            requested,
                            achieved = self.slots.len(),
                            error = %e,
                            "slot allocation failed, holding current footprint"
                        );
                        outcome.shortfall = true;
                        break;
                    }
                }
            }
        }

        outcome.achieved = self.slots.len();
        if !outcome.is_noop() {
            info!(
                class = %self.class,
                requested,
                achieved = outcome.achieved,
                created = outcome.created,
                destroyed = outcome.destroyed,
                capacity = self.capacity(),
                "pool resized"
            );
        }
        outcome
    }

    /// Apply `priority` to every slot and to slots created later.
    ///
    /// Returns the number of slots whose hint was updated.
    pub fn set_priority<D: GpuDevice + ?Sized>(
        &mut self,
        device: &mut D,
        priority: ResidencyPriority,
    ) -> usize {
        if priority == self.priority {
            return 0;
        }
        self.priority = priority;

        let mut updated = 0;
        for slot in &mut self.slots {
            match device.set_residency_priority(slot.surface, priority) {
                Ok(()) => {
                    slot.priority = priority;
                    updated += 1;
                }
                Err(e) => debug!(class = %self.class, error = %e, "residency priority update failed"),
            }
        }
        info!(class = %self.class, %priority, updated, "residency priority changed");
        updated
    }

    /// Destroy every slot and the descriptor table. The GPU must be drained.
    pub fn release<D: GpuDevice + ?Sized>(&mut self, device: &mut D) {
        let released = self.slots.len();
        while let Some(slot) = self.slots.pop() {
            device.destroy_surface(slot.surface);
        }
        if let Some(table) = self.table.take() {
            device.destroy_descriptor_table(table.id);
        }
        debug!(class = %self.class, released, "pool released");
    }

    fn grow_table<D: GpuDevice + ?Sized>(&mut self, device: &mut D, needed: usize) -> Result<(), GpuError> {
        let capacity = u32::try_from(needed)
            .unwrap_or(u32::MAX)
            .saturating_add(self.headroom);
        let id = device.create_descriptor_table(capacity)?;

        // Same surfaces, same order, fresh views in the new table.
        for (index, slot) in self.slots.iter_mut().enumerate() {
            slot.view = device.write_view(id, index as u32, slot.surface);
        }

        if let Some(old) = self.table.replace(DescriptorTable { id, capacity }) {
            device.destroy_descriptor_table(old.id);
        }
        debug!(class = %self.class, capacity, "descriptor table grown");
        Ok(())
    }

    fn create_slot<D: GpuDevice + ?Sized>(&mut self, device: &mut D) -> Result<Slot, GpuError> {
        let table = self
            .table
            .ok_or_else(|| GpuError::Backend("descriptor table not allocated".into()))?;

        let surface = device.create_surface(&self.surface)?;
        if let Err(e) = device.set_residency_priority(surface, self.priority) {
            debug!(class = %self.class, error = %e, "residency priority not applied");
        }
        let view = device.write_view(table.id, self.slots.len() as u32, surface);

        Ok(Slot {
            surface,
            view,
            priority: self.priority,
        })
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
