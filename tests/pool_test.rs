//! Resource pool sizing properties against the simulated device.

use proptest::prelude::*;

use vram_pressure::gpu::{GpuDevice, SurfaceDesc};
use vram_pressure::memory::{slots_for_bytes, ResourcePool, ResourcePoolConfig};
use vram_pressure::{BudgetClass, ResidencyPriority, SimulatedGpu};

const TINY: SurfaceDesc = SurfaceDesc {
    width: 16,
    height: 16,
    bytes_per_pixel: 4,
};

fn pool() -> ResourcePool {
    ResourcePool::new(
        BudgetClass::Active,
        ResourcePoolConfig {
            surface: TINY,
            priority: ResidencyPriority::High,
            descriptor_headroom: 2,
        },
    )
}

fn roomy_device() -> SimulatedGpu {
    SimulatedGpu::with_slot_capacity(&TINY, 1024)
}

// ============================================================================
// Shrink and release
// ============================================================================

#[test]
fn shrink_removes_newest_slots_first() {
    let mut device = roomy_device();
    let mut pool = pool();
    let slot = pool.slot_size();

    pool.resize(&mut device, 5 * slot);
    let before: Vec<_> = pool.slots().iter().map(|s| s.surface()).collect();

    pool.resize(&mut device, 2 * slot);
    let after: Vec<_> = pool.slots().iter().map(|s| s.surface()).collect();

    assert_eq!(after, before[..2].to_vec());
    for gone in &before[2..] {
        assert!(!device.is_live(*gone));
    }
}

#[test]
fn zero_target_empties_pool_but_keeps_table() {
    let mut device = roomy_device();
    let mut pool = pool();

    pool.resize(&mut device, 3 * pool.slot_size());
    let outcome = pool.resize(&mut device, 0);

    assert_eq!(outcome.destroyed, 3);
    assert!(pool.is_empty());
    assert_eq!(pool.achieved_bytes(), 0);
    assert_eq!(device.live_surfaces(), 0);
    assert!(pool.table_id().is_some());
}

#[test]
fn release_frees_everything() {
    let mut device = roomy_device();
    let mut pool = pool();

    pool.resize(&mut device, 7 * pool.slot_size());
    device.wait_idle().unwrap();
    pool.release(&mut device);

    assert!(pool.is_empty());
    assert_eq!(device.live_surfaces(), 0);
    assert_eq!(device.live_tables(), 0);
    assert_eq!(device.stats().violations, 0);
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn resize_achieves_rounded_up_slot_count(bytes in 0u64..(64 * 1024)) {
        let mut device = roomy_device();
        let mut pool = pool();

        let outcome = pool.resize(&mut device, bytes);
        let expected = slots_for_bytes(bytes, TINY.size_bytes());

        prop_assert_eq!(outcome.achieved, expected);
        prop_assert_eq!(pool.len(), expected);
        prop_assert_eq!(pool.achieved_bytes(), expected as u64 * TINY.size_bytes());
        prop_assert!(pool.achieved_bytes() >= bytes);
        prop_assert!(pool.capacity() as usize >= pool.len());
    }

    #[test]
    fn resize_is_idempotent(bytes in 0u64..(32 * 1024)) {
        let mut device = roomy_device();
        let mut pool = pool();

        pool.resize(&mut device, bytes);
        let second = pool.resize(&mut device, bytes);

        prop_assert!(second.is_noop());
    }

    #[test]
    fn resize_history_does_not_matter(
        steps in proptest::collection::vec(0u64..(32 * 1024), 1..8),
        last in 0u64..(32 * 1024),
    ) {
        let mut device = roomy_device();
        let mut walked = pool();
        for bytes in &steps {
            walked.resize(&mut device, *bytes);
        }
        walked.resize(&mut device, last);

        let mut fresh_device = roomy_device();
        let mut direct = pool();
        direct.resize(&mut fresh_device, last);

        prop_assert_eq!(walked.len(), direct.len());
        prop_assert_eq!(walked.achieved_bytes(), direct.achieved_bytes());
        prop_assert_eq!(device.live_surfaces(), walked.len());
        prop_assert_eq!(device.stats().violations, 0);
    }

    #[test]
    fn views_stay_at_slot_index(targets in proptest::collection::vec(0usize..40, 1..6)) {
        let mut device = roomy_device();
        let mut pool = pool();
        for slots in targets {
            pool.resize(&mut device, slots as u64 * TINY.size_bytes());
            let table = pool.table_id();
            for (index, slot) in pool.slots().iter().enumerate() {
                prop_assert_eq!(Some(slot.view().table), table);
                prop_assert_eq!(slot.view().index as usize, index);
                prop_assert_eq!(
                    device.view_target(slot.view().table, index as u32),
                    Some(slot.surface())
                );
            }
        }
    }
}
