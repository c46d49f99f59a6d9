//! Tick cost against the simulated device.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tempfile::TempDir;

use vram_pressure::channel::ControlInputs;
use vram_pressure::{
    BudgetClass, ChannelConfig, Controller, ControllerChannel, ControllerConfig, HelperChannel,
    ResidencyPriority, SimulatedGpu,
};

const GIB: u64 = 1024 * 1024 * 1024;

fn setup(name: &str, dir: &TempDir) -> (Controller<SimulatedGpu>, ControllerChannel) {
    let config = ChannelConfig::new(name).with_shm_dir(dir.path());
    let channel = HelperChannel::create(&config).expect("create channel");
    channel.seed_inputs(&ControlInputs {
        active_priority: ResidencyPriority::High.ordinal(),
        idle_priority: ResidencyPriority::Normal.ordinal(),
        ..Default::default()
    });
    let remote = ControllerChannel::open(&config).expect("open channel");
    let controller = Controller::new(
        SimulatedGpu::new(64 * GIB),
        channel,
        ControllerConfig::default(),
    );
    (controller, remote)
}

fn bench_steady_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("steady_tick");
    let dir = TempDir::new().expect("tempdir");

    for active_mb in [0, 256, 4096] {
        let (mut controller, remote) = setup(&format!("bench-steady-{active_mb}"), &dir);
        remote.inputs().set_target_mb(BudgetClass::Active, active_mb);
        remote.inputs().set_target_mb(BudgetClass::Idle, 1024);
        controller.tick().expect("warm-up tick");

        group.bench_with_input(BenchmarkId::from_parameter(active_mb), &active_mb, |b, _| {
            b.iter(|| black_box(controller.tick().expect("tick")))
        });
    }
    group.finish();
}

fn bench_resize_tick(c: &mut Criterion) {
    let dir = TempDir::new().expect("tempdir");
    let (mut controller, remote) = setup("bench-resize", &dir);
    let mut grow = false;

    c.bench_function("resize_tick_256_512", |b| {
        b.iter(|| {
            grow = !grow;
            let mb = if grow { 512 } else { 256 };
            remote.inputs().set_target_mb(BudgetClass::Active, mb);
            black_box(controller.tick().expect("tick"))
        })
    });
}

criterion_group!(benches, bench_steady_tick, bench_resize_tick);
criterion_main!(benches);
