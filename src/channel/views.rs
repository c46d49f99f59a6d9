// Copyright 2024-2026 vram-pressure Contributors
// SPDX-License-Identifier: Apache-2.0

//! Typed views over the shared record.
//!
//! Each side of the channel gets one view for the fields it owns (writes) and
//! one for the fields the other side owns (reads). Neither side can obtain a
//! writer for the other side's fields.

use std::sync::atomic::Ordering::Relaxed;

use serde::Serialize;

use super::layout::{SegmentCounters, SharedBlock};
use crate::gpu::{MemoryInfo, ResidencyPriority};
use crate::memory::{BudgetClass, HeapSize, HeapToggles};
use crate::telemetry::TelemetrySnapshot;

const MIB: u64 = 1024 * 1024;

/// One read of every input field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ControlInputs {
    pub active_mb: i32,
    pub idle_mb: i32,
    /// Raw selector; see [`ControlInputs::priority`].
    pub active_priority: i32,
    pub idle_priority: i32,
    pub heap_512mb: bool,
    pub heap_1gb: bool,
    pub shutdown_requested: bool,
}

impl ControlInputs {
    /// Requested bytes for `class`. Negative budgets count as zero.
    pub fn target_bytes(&self, class: BudgetClass) -> u64 {
        let mb = match class {
            BudgetClass::Active => self.active_mb,
            BudgetClass::Idle => self.idle_mb,
        };
        u64::try_from(mb).unwrap_or(0) * MIB
    }

    /// Raw priority selector for `class`.
    pub fn priority_selector(&self, class: BudgetClass) -> i32 {
        match class {
            BudgetClass::Active => self.active_priority,
            BudgetClass::Idle => self.idle_priority,
        }
    }

    /// Decoded priority for `class`, `None` when the selector is out of range.
    pub fn priority(&self, class: BudgetClass) -> Option<ResidencyPriority> {
        ResidencyPriority::from_ordinal(self.priority_selector(class))
    }

    pub fn heap_toggles(&self) -> HeapToggles {
        HeapToggles {
            half_gib: self.heap_512mb,
            one_gib: self.heap_1gb,
        }
    }
}

/// One read of every output field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HelperStatus {
    pub active_bytes: u64,
    pub active_slots: u32,
    pub idle_bytes: u64,
    pub idle_slots: u32,
    pub heap_bytes: u64,
    pub telemetry: TelemetrySnapshot,
    pub running: bool,
    pub frame_count: u64,
}

fn read_inputs(block: &SharedBlock) -> ControlInputs {
    ControlInputs {
        active_mb: block.target_active_mb.load(Relaxed),
        idle_mb: block.target_idle_mb.load(Relaxed),
        active_priority: block.active_priority.load(Relaxed),
        idle_priority: block.idle_priority.load(Relaxed),
        heap_512mb: block.heap_512mb.load(Relaxed) != 0,
        heap_1gb: block.heap_1gb.load(Relaxed) != 0,
        shutdown_requested: block.request_shutdown.load(Relaxed) != 0,
    }
}

fn read_segment(counters: &SegmentCounters) -> MemoryInfo {
    MemoryInfo {
        budget: counters.budget.load(Relaxed),
        current_usage: counters.current_usage.load(Relaxed),
        available_for_reservation: counters.available_for_reservation.load(Relaxed),
        current_reservation: counters.current_reservation.load(Relaxed),
    }
}

fn write_segment(counters: &SegmentCounters, info: &MemoryInfo) {
    counters.budget.store(info.budget, Relaxed);
    counters.current_usage.store(info.current_usage, Relaxed);
    counters
        .available_for_reservation
        .store(info.available_for_reservation, Relaxed);
    counters
        .current_reservation
        .store(info.current_reservation, Relaxed);
}

/// Helper side: reads the controller's inputs.
#[derive(Clone, Copy)]
pub struct InputView<'a> {
    block: &'a SharedBlock,
}

impl<'a> InputView<'a> {
    pub(crate) fn new(block: &'a SharedBlock) -> Self {
        Self { block }
    }

    pub fn snapshot(&self) -> ControlInputs {
        read_inputs(self.block)
    }

    pub fn shutdown_requested(&self) -> bool {
        self.block.request_shutdown.load(Relaxed) != 0
    }
}

/// Helper side: publishes achieved state and telemetry.
#[derive(Clone, Copy)]
pub struct OutputPublisher<'a> {
    block: &'a SharedBlock,
}

impl<'a> OutputPublisher<'a> {
    pub(crate) fn new(block: &'a SharedBlock) -> Self {
        Self { block }
    }

    pub fn publish_pool(&self, class: BudgetClass, bytes: u64, slots: usize) {
        let slots = u32::try_from(slots).unwrap_or(u32::MAX);
        match class {
            BudgetClass::Active => {
                self.block.active_bytes.store(bytes, Relaxed);
                self.block.active_slots.store(slots, Relaxed);
            }
            BudgetClass::Idle => {
                self.block.idle_bytes.store(bytes, Relaxed);
                self.block.idle_slots.store(slots, Relaxed);
            }
        }
    }

    pub fn publish_heap_bytes(&self, bytes: u64) {
        self.block.heap_bytes.store(bytes, Relaxed);
    }

    pub fn publish_telemetry(&self, snapshot: &TelemetrySnapshot) {
        write_segment(&self.block.local, &snapshot.local);
        write_segment(&self.block.non_local, &snapshot.non_local);
    }

    pub fn set_running(&self, running: bool) {
        self.block.is_running.store(u32::from(running), Relaxed);
    }

    /// Bump the frame counter and return the new value.
    ///
    /// Load then store: the helper is the only writer.
    pub fn advance_frame(&self) -> u64 {
        let next = self.block.frame_count.load(Relaxed).wrapping_add(1);
        self.block.frame_count.store(next, Relaxed);
        next
    }

    pub fn frame_count(&self) -> u64 {
        self.block.frame_count.load(Relaxed)
    }
}

/// Controller side: writes inputs.
#[derive(Clone, Copy)]
pub struct InputWriter<'a> {
    block: &'a SharedBlock,
}

impl<'a> InputWriter<'a> {
    pub(crate) fn new(block: &'a SharedBlock) -> Self {
        Self { block }
    }

    pub fn set_target_mb(&self, class: BudgetClass, mb: i32) {
        match class {
            BudgetClass::Active => self.block.target_active_mb.store(mb, Relaxed),
            BudgetClass::Idle => self.block.target_idle_mb.store(mb, Relaxed),
        }
    }

    pub fn set_priority(&self, class: BudgetClass, priority: ResidencyPriority) {
        self.set_priority_selector(class, priority.ordinal());
    }

    /// Write a raw selector, including values the helper will reject.
    pub fn set_priority_selector(&self, class: BudgetClass, selector: i32) {
        match class {
            BudgetClass::Active => self.block.active_priority.store(selector, Relaxed),
            BudgetClass::Idle => self.block.idle_priority.store(selector, Relaxed),
        }
    }

    pub fn set_heap(&self, size: HeapSize, enabled: bool) {
        let value = i32::from(enabled);
        match size {
            HeapSize::HalfGib => self.block.heap_512mb.store(value, Relaxed),
            HeapSize::OneGib => self.block.heap_1gb.store(value, Relaxed),
        }
    }

    pub fn request_shutdown(&self) {
        self.block.request_shutdown.store(1, Relaxed);
    }

    /// Write every input field from `inputs`.
    pub fn write_all(&self, inputs: &ControlInputs) {
        self.set_target_mb(BudgetClass::Active, inputs.active_mb);
        self.set_target_mb(BudgetClass::Idle, inputs.idle_mb);
        self.set_priority_selector(BudgetClass::Active, inputs.active_priority);
        self.set_priority_selector(BudgetClass::Idle, inputs.idle_priority);
        self.set_heap(HeapSize::HalfGib, inputs.heap_512mb);
        self.set_heap(HeapSize::OneGib, inputs.heap_1gb);
        self.block
            .request_shutdown
            .store(u32::from(inputs.shutdown_requested), Relaxed);
    }

    /// Read back the inputs as currently stored.
    pub fn snapshot(&self) -> ControlInputs {
        read_inputs(self.block)
    }
}

/// Controller side: reads the helper's outputs.
#[derive(Clone, Copy)]
pub struct OutputView<'a> {
    block: &'a SharedBlock,
}

impl<'a> OutputView<'a> {
    pub(crate) fn new(block: &'a SharedBlock) -> Self {
        Self { block }
    }

    pub fn is_running(&self) -> bool {
        self.block.is_running.load(Relaxed) != 0
    }

    pub fn frame_count(&self) -> u64 {
        self.block.frame_count.load(Relaxed)
    }

    /// Read every output field. Fields may come from different ticks.
    pub fn snapshot(&self) -> HelperStatus {
        HelperStatus {
            active_bytes: self.block.active_bytes.load(Relaxed),
            active_slots: self.block.active_slots.load(Relaxed),
            idle_bytes: self.block.idle_bytes.load(Relaxed),
            idle_slots: self.block.idle_slots.load(Relaxed),
            heap_bytes: self.block.heap_bytes.load(Relaxed),
            telemetry: TelemetrySnapshot {
                local: read_segment(&self.block.local),
                non_local: read_segment(&self.block.non_local),
            },
            running: self.is_running(),
            frame_count: self.frame_count(),
        }
    }
}
