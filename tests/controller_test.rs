//! End-to-end controller scenarios driven through the shared record.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tempfile::TempDir;

use vram_pressure::channel::ControlInputs;
use vram_pressure::gpu::SurfaceDesc;
use vram_pressure::memory::HeapSize;
use vram_pressure::shutdown::{ShutdownCoordinator, ShutdownReason, ShutdownState};
use vram_pressure::{
    BudgetClass, ChannelConfig, Controller, ControllerChannel, ControllerConfig, HelperChannel,
    ResidencyPriority, SimulatedGpu,
};

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

static NEXT: AtomicUsize = AtomicUsize::new(0);

struct Harness {
    _dir: TempDir,
    remote: ControllerChannel,
    controller: Controller<SimulatedGpu>,
}

impl Harness {
    fn new(device: SimulatedGpu) -> Self {
        let dir = TempDir::new().unwrap();
        let name = format!(
            "ctl-it-{}-{}",
            std::process::id(),
            NEXT.fetch_add(1, Ordering::Relaxed)
        );
        let config = ChannelConfig::new(name).with_shm_dir(dir.path());
        let channel = HelperChannel::create(&config).unwrap();
        channel.seed_inputs(&ControlInputs {
            active_priority: ResidencyPriority::High.ordinal(),
            idle_priority: ResidencyPriority::Normal.ordinal(),
            ..Default::default()
        });
        let remote = ControllerChannel::open(&config).unwrap();
        let controller = Controller::new(
            device,
            channel,
            ControllerConfig {
                frame_rate: 200,
                ..Default::default()
            },
        );
        Self {
            _dir: dir,
            remote,
            controller,
        }
    }

    fn with_gib(gib: u64) -> Self {
        Self::new(SimulatedGpu::new(gib * GIB))
    }
}

// ============================================================================
// Resizing
// ============================================================================

#[test]
fn active_budget_is_reached_in_one_tick() {
    let mut h = Harness::with_gib(8);
    h.remote.inputs().set_target_mb(BudgetClass::Active, 256);

    let report = h.controller.tick().unwrap();

    let status = h.remote.outputs().snapshot();
    assert_eq!(status.active_slots, 16);
    assert_eq!(status.active_bytes, 268_435_456);
    assert_eq!(status.idle_slots, 0);
    assert_eq!(status.frame_count, 1);
    assert!(status.running);
    assert_eq!(report.cleared, 16);
    assert_eq!(h.controller.device().allocated_bytes(), 256 * MIB);
}

#[test]
fn grow_then_shrink_matches_direct_request() {
    let mut h = Harness::with_gib(8);
    let inputs = h.remote.inputs();

    inputs.set_target_mb(BudgetClass::Active, 256);
    h.controller.tick().unwrap();
    inputs.set_target_mb(BudgetClass::Active, 1024);
    h.controller.tick().unwrap();
    assert_eq!(h.remote.outputs().snapshot().active_slots, 64);
    inputs.set_target_mb(BudgetClass::Active, 128);
    h.controller.tick().unwrap();

    let mut direct = Harness::with_gib(8);
    direct.remote.inputs().set_target_mb(BudgetClass::Active, 128);
    direct.controller.tick().unwrap();

    let walked = h.remote.outputs().snapshot();
    let fresh = direct.remote.outputs().snapshot();
    assert_eq!(walked.active_slots, 8);
    assert_eq!(walked.active_slots, fresh.active_slots);
    assert_eq!(walked.active_bytes, fresh.active_bytes);
    assert_eq!(h.controller.device().stats().violations, 0);
}

#[test]
fn budgets_are_independent_per_class() {
    let mut h = Harness::with_gib(8);
    let inputs = h.remote.inputs();
    inputs.set_target_mb(BudgetClass::Active, 64);
    inputs.set_target_mb(BudgetClass::Idle, 100);

    h.controller.tick().unwrap();

    let status = h.remote.outputs().snapshot();
    assert_eq!(status.active_slots, 4);
    assert_eq!(status.idle_slots, 7);
    assert_eq!(status.idle_bytes, 7 * 16 * MIB);
    assert_eq!(h.controller.pool(BudgetClass::Idle).len(), 7);
}

#[test]
fn negative_budget_means_zero() {
    let mut h = Harness::with_gib(8);
    let inputs = h.remote.inputs();
    inputs.set_target_mb(BudgetClass::Active, 64);
    h.controller.tick().unwrap();

    inputs.set_target_mb(BudgetClass::Active, -5);
    h.controller.tick().unwrap();

    assert_eq!(h.remote.outputs().snapshot().active_slots, 0);
    assert_eq!(h.controller.device().live_surfaces(), 0);
}

// ============================================================================
// Device refusal
// ============================================================================

#[test]
fn shortfall_holds_footprint_and_recovers() {
    let device = SimulatedGpu::with_slot_capacity(&SurfaceDesc::SLOT, 10);
    let mut h = Harness::new(device);
    h.remote.inputs().set_target_mb(BudgetClass::Active, 320);

    for _ in 0..5 {
        let report = h.controller.tick().unwrap();
        assert!(report.active.as_ref().is_some_and(|o| o.shortfall));
        let status = h.remote.outputs().snapshot();
        assert_eq!(status.active_slots, 10);
        assert_eq!(status.active_bytes, 160 * MIB);
    }
    assert_eq!(h.remote.outputs().frame_count(), 5);

    h.controller
        .device_mut()
        .set_capacity(SurfaceDesc::SLOT.size_bytes() * 32);
    h.controller.tick().unwrap();

    assert_eq!(h.remote.outputs().snapshot().active_slots, 20);
    assert_eq!(h.controller.device().stats().violations, 0);
}

// ============================================================================
// Priorities and heaps
// ============================================================================

#[test]
fn priority_change_applies_to_live_slots() {
    let mut h = Harness::with_gib(8);
    let inputs = h.remote.inputs();
    inputs.set_target_mb(BudgetClass::Idle, 48);
    h.controller.tick().unwrap();

    inputs.set_priority(BudgetClass::Idle, ResidencyPriority::Minimum);
    let report = h.controller.tick().unwrap();

    assert!(report.reconfigured);
    let pool = h.controller.pool(BudgetClass::Idle);
    assert_eq!(pool.priority(), ResidencyPriority::Minimum);
    for slot in pool.slots() {
        assert_eq!(
            h.controller.device().priority_of(slot.surface()),
            Some(ResidencyPriority::Minimum)
        );
    }
}

#[test]
fn heap_toggles_track_inputs() {
    let mut h = Harness::with_gib(8);
    let inputs = h.remote.inputs();

    inputs.set_heap(HeapSize::HalfGib, true);
    inputs.set_heap(HeapSize::OneGib, true);
    h.controller.tick().unwrap();
    assert_eq!(h.remote.outputs().snapshot().heap_bytes, 1536 * MIB);
    assert_eq!(h.controller.device().live_heaps(), 2);

    inputs.set_heap(HeapSize::HalfGib, false);
    h.controller.tick().unwrap();
    assert_eq!(h.remote.outputs().snapshot().heap_bytes, GIB);
    assert_eq!(h.controller.device().live_heaps(), 1);
}

// ============================================================================
// Run loop
// ============================================================================

#[tokio::test]
async fn run_exits_on_stop_request_and_releases_memory() {
    let mut h = Harness::with_gib(8);
    let inputs = h.remote.inputs();
    inputs.set_target_mb(BudgetClass::Active, 64);
    inputs.set_target_mb(BudgetClass::Idle, 32);
    inputs.set_heap(HeapSize::HalfGib, true);

    for _ in 0..3 {
        h.controller.tick().unwrap();
    }
    inputs.request_shutdown();

    let shutdown = ShutdownCoordinator::new();
    tokio::time::timeout(Duration::from_secs(5), h.controller.run(&shutdown))
        .await
        .expect("run loop did not stop")
        .unwrap();

    assert_eq!(shutdown.state(), ShutdownState::Stopped);
    assert_eq!(shutdown.reason(), Some(ShutdownReason::ChannelRequest));

    let status = h.remote.outputs().snapshot();
    assert!(!status.running);
    assert_eq!(status.active_bytes, 0);
    assert_eq!(status.idle_bytes, 0);
    assert_eq!(status.heap_bytes, 0);
    assert_eq!(status.frame_count, 3);

    let device = h.controller.device();
    assert_eq!(device.allocated_bytes(), 0);
    assert_eq!(device.live_surfaces(), 0);
    assert_eq!(device.live_tables(), 0);
    assert_eq!(device.stats().violations, 0);
}

#[tokio::test]
async fn run_ticks_until_coordinator_fires() {
    let mut h = Harness::with_gib(8);
    h.remote.inputs().set_target_mb(BudgetClass::Active, 32);

    let shutdown = ShutdownCoordinator::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.request(ShutdownReason::Signal);
    });

    tokio::time::timeout(Duration::from_secs(5), h.controller.run(&shutdown))
        .await
        .expect("run loop did not stop")
        .unwrap();

    assert_eq!(shutdown.reason(), Some(ShutdownReason::Signal));
    assert!(h.remote.outputs().frame_count() >= 1);
    assert!(!h.remote.outputs().is_running());
    assert_eq!(h.controller.device().live_surfaces(), 0);
}
