// Copyright 2024-2026 vram-pressure Contributors
// SPDX-License-Identifier: Apache-2.0

//! The memory pressure controller.
//!
//! [`Controller`] owns every handle the helper needs: device, channel, both
//! slot pools, heap reservations and the telemetry sampler. Callers build the
//! device, then the channel, then hand both to [`Controller::new`], which adds
//! the pools. Teardown runs in reverse on every exit path.

use std::time::Duration;

use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::channel::{ChannelError, ControlInputs, HelperChannel};
use crate::gpu::{GpuDevice, GpuError, ResidencyPriority, SurfaceDesc};
use crate::memory::{
    touch_all, BudgetClass, HeapReservations, ResizeOutcome, ResourcePool, ResourcePoolConfig,
};
use crate::shutdown::{ShutdownCoordinator, ShutdownReason};
use crate::telemetry::{MemorySampler, SpanExt, TickSpan};

/// Controller errors. Allocation and telemetry failures never surface here.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),
}

/// Controller settings that do not travel through the channel.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Ticks per second.
    pub frame_rate: u32,
    pub surface: SurfaceDesc,
    pub descriptor_headroom: u32,
    /// Priority used until the record supplies a valid selector.
    pub active_priority: ResidencyPriority,
    pub idle_priority: ResidencyPriority,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            frame_rate: 30,
            surface: SurfaceDesc::SLOT,
            descriptor_headroom: 64,
            active_priority: ResidencyPriority::High,
            idle_priority: ResidencyPriority::Normal,
        }
    }
}

impl ControllerConfig {
    pub fn frame_interval(&self) -> Duration {
        let rate = u64::from(self.frame_rate.max(1));
        Duration::from_millis((1000 / rate).max(1))
    }

    fn pool_config(&self, class: BudgetClass) -> ResourcePoolConfig {
        ResourcePoolConfig {
            surface: self.surface,
            priority: match class {
                BudgetClass::Active => self.active_priority,
                BudgetClass::Idle => self.idle_priority,
            },
            descriptor_headroom: self.descriptor_headroom,
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Frame counter value published by this tick.
    pub frame: u64,
    /// Whether the GPU was drained for a resize, priority or heap change.
    pub reconfigured: bool,
    pub active: Option<ResizeOutcome>,
    pub idle: Option<ResizeOutcome>,
    /// Keep-alive clears recorded.
    pub cleared: usize,
    /// Whether fresh telemetry was published.
    pub telemetry_sampled: bool,
}

/// Process-wide controller context.
pub struct Controller<D: GpuDevice> {
    // Field order is drop order: pools hold no device handles of their own,
    // the channel closes before the device goes away.
    active: ResourcePool,
    idle: ResourcePool,
    heaps: HeapReservations,
    sampler: MemorySampler,
    // Last invalid selector seen per class, so each bad value warns once.
    rejected_selectors: [Option<i32>; 2],
    shortfalls: [Option<(usize, usize)>; 2],
    frame_interval: Duration,
    started: bool,
    torn_down: bool,
    channel: HelperChannel,
    device: D,
}

impl<D: GpuDevice> Controller<D> {
    pub fn new(device: D, channel: HelperChannel, config: ControllerConfig) -> Self {
        info!(
            adapter = device.adapter_name(),
            backend = %device.backend(),
            channel = channel.name(),
            slot_bytes = config.surface.size_bytes(),
            "controller initialized"
        );
        Self {
            active: ResourcePool::new(BudgetClass::Active, config.pool_config(BudgetClass::Active)),
            idle: ResourcePool::new(BudgetClass::Idle, config.pool_config(BudgetClass::Idle)),
            heaps: HeapReservations::new(),
            sampler: MemorySampler::new(),
            rejected_selectors: [None; 2],
            shortfalls: [None; 2],
            frame_interval: config.frame_interval(),
            started: false,
            torn_down: false,
            channel,
            device,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn channel(&self) -> &HelperChannel {
        &self.channel
    }

    pub fn pool(&self, class: BudgetClass) -> &ResourcePool {
        match class {
            BudgetClass::Active => &self.active,
            BudgetClass::Idle => &self.idle,
        }
    }

    pub fn heaps(&self) -> &HeapReservations {
        &self.heaps
    }

    pub fn sampler(&self) -> &MemorySampler {
        &self.sampler
    }

    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    /// Run one tick: read inputs, sample telemetry, reconfigure if needed,
    /// keep the active pool alive, publish.
    pub fn tick(&mut self) -> Result<TickReport, ControllerError> {
        let frame = self.channel.outputs().frame_count().wrapping_add(1);
        let span = TickSpan::new(frame);
        let _enter = span.enter();

        let result = self.tick_inner();
        span.record_result(&result);
        if let Ok(report) = &result {
            span.record("resized", report.reconfigured);
            span.record("cleared", report.cleared);
        }
        result
    }

    fn tick_inner(&mut self) -> Result<TickReport, ControllerError> {
        if !self.started {
            self.channel.outputs().set_running(true);
            self.started = true;
        }

        let inputs = self.channel.inputs().snapshot();
        let mut report = TickReport::default();

        let telemetry = self.sampler.sample(&self.device);
        report.telemetry_sampled = telemetry.is_some();

        let active_priority = self.resolve_priority(BudgetClass::Active, &inputs);
        let idle_priority = self.resolve_priority(BudgetClass::Idle, &inputs);
        let toggles = inputs.heap_toggles();

        let needs_drain = self.pool_needs_resize(BudgetClass::Active, &inputs)
            || self.pool_needs_resize(BudgetClass::Idle, &inputs)
            || active_priority != self.active.priority()
            || idle_priority != self.idle.priority()
            || self.heaps.needs_reconcile(toggles);

        if needs_drain {
            self.device.wait_idle()?;
            report.reconfigured = true;

            // Priority first so new slots are created with it.
            self.active.set_priority(&mut self.device, active_priority);
            self.idle.set_priority(&mut self.device, idle_priority);

            let active = self
                .active
                .resize(&mut self.device, inputs.target_bytes(BudgetClass::Active));
            self.note_shortfall(BudgetClass::Active, &active);
            report.active = Some(active);

            let idle = self
                .idle
                .resize(&mut self.device, inputs.target_bytes(BudgetClass::Idle));
            self.note_shortfall(BudgetClass::Idle, &idle);
            report.idle = Some(idle);

            self.heaps.reconcile(&mut self.device, toggles);
        }

        self.device.begin_commands()?;
        report.cleared = touch_all(&mut self.device, &self.active);
        self.device.submit()?;

        let outputs = self.channel.outputs();
        outputs.publish_pool(BudgetClass::Active, self.active.achieved_bytes(), self.active.len());
        outputs.publish_pool(BudgetClass::Idle, self.idle.achieved_bytes(), self.idle.len());
        outputs.publish_heap_bytes(self.heaps.allocated_bytes());
        if let Some(snapshot) = &telemetry {
            outputs.publish_telemetry(snapshot);
        }
        report.frame = outputs.advance_frame();
        Ok(report)
    }

    fn pool_needs_resize(&self, class: BudgetClass, inputs: &ControlInputs) -> bool {
        let pool = self.pool(class);
        pool.target_slots(inputs.target_bytes(class)) != pool.len()
    }

    fn resolve_priority(&mut self, class: BudgetClass, inputs: &ControlInputs) -> ResidencyPriority {
        let rejected = &mut self.rejected_selectors[class_index(class)];
        match inputs.priority(class) {
            Some(priority) => {
                *rejected = None;
                priority
            }
            None => {
                let selector = inputs.priority_selector(class);
                let current = match class {
                    BudgetClass::Active => self.active.priority(),
                    BudgetClass::Idle => self.idle.priority(),
                };
                if rejected.replace(selector) != Some(selector) {
                    warn!(%class, selector, keeping = %current, "ignoring invalid priority selector");
                }
                current
            }
        }
    }

    fn note_shortfall(&mut self, class: BudgetClass, outcome: &ResizeOutcome) {
        let idx = class_index(class);
        let now = outcome
            .shortfall
            .then_some((outcome.requested, outcome.achieved));
        if now != self.shortfalls[idx] {
            match now {
                Some((requested, achieved)) => warn!(
                    %class,
                    requested,
                    achieved,
                    "device refused further allocations, holding current footprint"
                ),
                None if self.shortfalls[idx].is_some() => {
                    info!(%class, achieved = outcome.achieved, "allocation shortfall cleared")
                }
                None => {}
            }
            self.shortfalls[idx] = now;
        }
    }

    /// Tick at the configured cadence until shutdown is requested, then tear
    /// down. Shutdown is only observed between ticks.
    pub async fn run(&mut self, shutdown: &ShutdownCoordinator) -> Result<(), ControllerError> {
        let mut interval = tokio::time::interval(self.frame_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = self.frame_interval.as_millis() as u64, "tick loop started");

        let mut outcome = Ok(());
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.cancelled() => {}
            }
            if self.channel.inputs().shutdown_requested() {
                shutdown.request(ShutdownReason::ChannelRequest);
            }
            if shutdown.is_requested() {
                break;
            }
            if let Err(e) = self.tick() {
                error!(error = %e, "tick failed, stopping");
                shutdown.request(ShutdownReason::DeviceError);
                outcome = Err(e);
                break;
            }
        }

        shutdown.begin_drain();
        let teardown = self.teardown();
        shutdown.mark_stopped();
        info!(
            reason = ?shutdown.reason(),
            frames = self.channel.outputs().frame_count(),
            "tick loop stopped"
        );
        outcome.and(teardown)
    }

    /// Drain the GPU, release every allocation, clear the liveness flag.
    pub fn shutdown(mut self) -> Result<(), ControllerError> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<(), ControllerError> {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;

        let drained = self.device.wait_idle();
        if let Err(e) = &drained {
            warn!(error = %e, "GPU drain failed during teardown");
        }
        self.heaps.release(&mut self.device);
        self.idle.release(&mut self.device);
        self.active.release(&mut self.device);

        let outputs = self.channel.outputs();
        outputs.publish_pool(BudgetClass::Active, 0, 0);
        outputs.publish_pool(BudgetClass::Idle, 0, 0);
        outputs.publish_heap_bytes(0);
        outputs.set_running(false);
        info!("controller released all GPU memory");
        drained.map_err(ControllerError::from)
    }
}

fn class_index(class: BudgetClass) -> usize {
    match class {
        BudgetClass::Active => 0,
        BudgetClass::Idle => 1,
    }
}

impl<D: GpuDevice> Drop for Controller<D> {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            warn!(error = %e, "teardown on drop failed");
        }
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
