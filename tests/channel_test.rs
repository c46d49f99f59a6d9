//! Shared control channel across a creator and an opener.

use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::TempDir;

use vram_pressure::channel::{ControlInputs, RECORD_SIZE};
use vram_pressure::memory::HeapSize;
use vram_pressure::telemetry::TelemetrySnapshot;
use vram_pressure::{
    BudgetClass, ChannelConfig, ChannelError, ControllerChannel, HelperChannel, ResidencyPriority,
};

static NEXT: AtomicUsize = AtomicUsize::new(0);

fn config(dir: &TempDir) -> ChannelConfig {
    let name = format!(
        "chan-it-{}-{}",
        std::process::id(),
        NEXT.fetch_add(1, Ordering::Relaxed)
    );
    ChannelConfig::new(name).with_shm_dir(dir.path())
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn open_before_create_reports_not_running() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);

    match ControllerChannel::open(&cfg) {
        Err(ChannelError::NotRunning(name)) => assert_eq!(name, cfg.name),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("open succeeded without a helper"),
    }
}

#[test]
fn fresh_record_is_zeroed() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);
    let helper = HelperChannel::create(&cfg).unwrap();
    let controller = ControllerChannel::open(&cfg).unwrap();

    assert_eq!(controller.inputs().snapshot(), ControlInputs::default());
    let status = controller.outputs().snapshot();
    assert!(!status.running);
    assert_eq!(status.frame_count, 0);
    assert_eq!(status.active_bytes, 0);
    assert_eq!(status.telemetry, TelemetrySnapshot::default());

    controller.close();
    helper.close();
}

#[test]
fn invalid_names_are_rejected() {
    let dir = TempDir::new().unwrap();
    for name in ["", ".", "..", "a/b", "a\\b", "nul\0byte"] {
        let cfg = ChannelConfig::new(name).with_shm_dir(dir.path());
        assert!(
            matches!(HelperChannel::create(&cfg), Err(ChannelError::InvalidName(_))),
            "name {name:?} accepted"
        );
        assert!(matches!(
            ControllerChannel::open(&cfg),
            Err(ChannelError::InvalidName(_))
        ));
    }
    let long = "x".repeat(201);
    let cfg = ChannelConfig::new(long).with_shm_dir(dir.path());
    assert!(matches!(
        HelperChannel::create(&cfg),
        Err(ChannelError::InvalidName(_))
    ));
}

#[cfg(unix)]
#[test]
fn short_backing_file_is_a_layout_mismatch() {
    use nix::fcntl::{Flock, FlockArg};

    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);
    let path = dir.path().join(&cfg.name);
    std::fs::write(&path, [0u8; 16]).unwrap();
    // Held the way a live helper holds its record.
    let file = std::fs::File::open(&path).unwrap();
    let _held = Flock::lock(file, FlockArg::LockExclusiveNonblock).unwrap();

    match ControllerChannel::open(&cfg) {
        Err(ChannelError::LayoutMismatch { expected, actual }) => {
            assert_eq!(expected, RECORD_SIZE);
            assert_eq!(actual, 16);
        }
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("short record accepted"),
    }
}

#[cfg(unix)]
#[test]
fn creator_close_removes_name_but_not_open_mappings() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);
    let helper = HelperChannel::create(&cfg).unwrap();
    let controller = ControllerChannel::open(&cfg).unwrap();

    helper.outputs().advance_frame();
    helper.close();

    assert!(!dir.path().join(&cfg.name).exists());
    assert_eq!(controller.outputs().frame_count(), 1);
    assert!(matches!(
        ControllerChannel::open(&cfg),
        Err(ChannelError::NotRunning(_))
    ));
}

#[cfg(unix)]
#[test]
fn leftover_file_from_dead_helper_reports_not_running() {
    use vram_pressure::cli::{run_set, EXIT_NOT_RUNNING};

    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);
    let path = dir.path().join(&cfg.name);
    // What a killed helper leaves behind: a full record, no lock holder.
    let mut record = vec![0u8; RECORD_SIZE];
    record[vram_pressure::channel::offsets::IS_RUNNING] = 1;
    std::fs::write(&path, &record).unwrap();

    match ControllerChannel::open(&cfg) {
        Err(ChannelError::NotRunning(name)) => assert_eq!(name, cfg.name),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("opened a record with no helper behind it"),
    }
    assert!(!path.exists(), "leftover file not removed");

    std::fs::write(&path, &record).unwrap();
    assert_eq!(run_set(&cfg, &["--active-mb".into(), "64".into()]), EXIT_NOT_RUNNING);
}

#[cfg(unix)]
#[test]
fn helper_restarts_over_leftover_file() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);
    std::fs::write(dir.path().join(&cfg.name), vec![0xffu8; RECORD_SIZE]).unwrap();

    let helper = HelperChannel::create(&cfg).unwrap();
    let controller = ControllerChannel::open(&cfg).unwrap();

    assert_eq!(controller.inputs().snapshot(), ControlInputs::default());
    assert_eq!(controller.outputs().frame_count(), 0);
    helper.close();
}

#[cfg(unix)]
#[test]
fn second_create_is_refused_while_helper_lives() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);
    let first = HelperChannel::create(&cfg).unwrap();
    first.outputs().advance_frame();

    match HelperChannel::create(&cfg) {
        Err(ChannelError::AlreadyRunning(name)) => assert_eq!(name, cfg.name),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("second helper took over a live channel"),
    }
    let controller = ControllerChannel::open(&cfg).unwrap();
    assert_eq!(controller.outputs().frame_count(), 1, "live record was reset");

    first.close();
    assert!(HelperChannel::create(&cfg).is_ok());
}

// ============================================================================
// Visibility
// ============================================================================

#[test]
fn inputs_written_by_controller_reach_helper() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);
    let helper = HelperChannel::create(&cfg).unwrap();
    let controller = ControllerChannel::open(&cfg).unwrap();

    let writer = controller.inputs();
    writer.set_target_mb(BudgetClass::Active, 512);
    writer.set_target_mb(BudgetClass::Idle, 128);
    writer.set_priority(BudgetClass::Active, ResidencyPriority::Maximum);
    writer.set_priority_selector(BudgetClass::Idle, 9);
    writer.set_heap(HeapSize::OneGib, true);

    let seen = helper.inputs().snapshot();
    assert_eq!(seen.active_mb, 512);
    assert_eq!(seen.idle_mb, 128);
    assert_eq!(seen.priority(BudgetClass::Active), Some(ResidencyPriority::Maximum));
    assert_eq!(seen.priority(BudgetClass::Idle), None);
    assert!(seen.heap_1gb);
    assert!(!seen.heap_512mb);
    assert!(!helper.inputs().shutdown_requested());

    writer.request_shutdown();
    assert!(helper.inputs().shutdown_requested());
}

#[test]
fn outputs_published_by_helper_reach_controller() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);
    let helper = HelperChannel::create(&cfg).unwrap();
    let controller = ControllerChannel::open(&cfg).unwrap();

    let publisher = helper.outputs();
    publisher.set_running(true);
    publisher.publish_pool(BudgetClass::Active, 48 * 1024 * 1024, 3);
    publisher.publish_pool(BudgetClass::Idle, 16 * 1024 * 1024, 1);
    publisher.publish_heap_bytes(512 * 1024 * 1024);
    publisher.advance_frame();
    publisher.advance_frame();

    let status = controller.outputs().snapshot();
    assert!(status.running);
    assert_eq!(status.active_bytes, 48 * 1024 * 1024);
    assert_eq!(status.active_slots, 3);
    assert_eq!(status.idle_bytes, 16 * 1024 * 1024);
    assert_eq!(status.idle_slots, 1);
    assert_eq!(status.heap_bytes, 512 * 1024 * 1024);
    assert_eq!(status.frame_count, 2);
}

#[test]
fn seeded_inputs_are_visible_to_opener() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);
    let helper = HelperChannel::create(&cfg).unwrap();
    let seed = ControlInputs {
        active_mb: 64,
        idle_mb: 32,
        active_priority: ResidencyPriority::High.ordinal(),
        idle_priority: ResidencyPriority::Low.ordinal(),
        heap_512mb: true,
        ..Default::default()
    };
    helper.seed_inputs(&seed);

    let controller = ControllerChannel::open(&cfg).unwrap();
    assert_eq!(controller.inputs().snapshot(), seed);
}

// ============================================================================
// Byte layout
// ============================================================================

#[cfg(unix)]
#[test]
fn backing_file_matches_documented_offsets() {
    use vram_pressure::channel::offsets;

    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);
    let helper = HelperChannel::create(&cfg).unwrap();
    let controller = ControllerChannel::open(&cfg).unwrap();

    let writer = controller.inputs();
    writer.set_target_mb(BudgetClass::Active, 0x0102_0304);
    writer.set_target_mb(BudgetClass::Idle, 77);
    writer.set_priority(BudgetClass::Active, ResidencyPriority::High);
    writer.set_heap(HeapSize::HalfGib, true);
    writer.request_shutdown();

    let publisher = helper.outputs();
    publisher.publish_pool(BudgetClass::Active, 0x1122_3344_5566, 5);
    publisher.publish_heap_bytes(1 << 30);
    publisher.set_running(true);
    publisher.advance_frame();

    let bytes = std::fs::read(dir.path().join(&cfg.name)).unwrap();
    assert_eq!(bytes.len(), RECORD_SIZE);

    let i32_at = |off: usize| i32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
    let u32_at = |off: usize| u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
    let u64_at = |off: usize| u64::from_le_bytes(bytes[off..off + 8].try_into().unwrap());

    assert_eq!(i32_at(offsets::TARGET_ACTIVE_MB), 0x0102_0304);
    assert_eq!(i32_at(offsets::TARGET_IDLE_MB), 77);
    assert_eq!(i32_at(offsets::ACTIVE_PRIORITY), ResidencyPriority::High.ordinal());
    assert_eq!(i32_at(offsets::HEAP_512MB), 1);
    assert_eq!(i32_at(offsets::HEAP_1GB), 0);
    assert_eq!(u64_at(offsets::ACTIVE_BYTES), 0x1122_3344_5566);
    assert_eq!(u32_at(offsets::ACTIVE_SLOTS), 5);
    assert_eq!(u64_at(offsets::HEAP_BYTES), 1 << 30);
    assert_eq!(u32_at(offsets::IS_RUNNING), 1);
    assert_eq!(u32_at(offsets::REQUEST_SHUTDOWN), 1);
    assert_eq!(u64_at(offsets::FRAME_COUNT), 1);
}
