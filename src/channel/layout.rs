// Copyright 2024-2026 vram-pressure Contributors
// SPDX-License-Identifier: Apache-2.0

//! Byte layout of the shared control record.
//!
//! Every field is its own atomic so that both processes can touch the mapping
//! through shared references. All accesses use `Ordering::Relaxed`: the record
//! makes no cross-field consistency promise.

use std::mem::{offset_of, size_of};
use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU64};

/// Size of the record in bytes.
pub const RECORD_SIZE: usize = 144;

/// Shared control record, native endianness.
#[repr(C)]
#[derive(Debug)]
pub(crate) struct SharedBlock {
    // Inputs, written by the controller process.
    pub target_active_mb: AtomicI32,
    pub target_idle_mb: AtomicI32,
    pub active_priority: AtomicI32,
    pub idle_priority: AtomicI32,
    pub heap_512mb: AtomicI32,
    pub heap_1gb: AtomicI32,

    // Outputs, written by the helper process.
    pub active_bytes: AtomicU64,
    pub active_slots: AtomicU32,
    _pad0: AtomicU32,
    pub idle_bytes: AtomicU64,
    pub idle_slots: AtomicU32,
    _pad1: AtomicU32,
    pub heap_bytes: AtomicU64,
    pub local: SegmentCounters,
    pub non_local: SegmentCounters,
    pub is_running: AtomicU32,

    // Input.
    pub request_shutdown: AtomicU32,

    // Output.
    pub frame_count: AtomicU64,
}

/// Four budget counters for one segment group.
#[repr(C)]
#[derive(Debug)]
pub(crate) struct SegmentCounters {
    pub budget: AtomicU64,
    pub current_usage: AtomicU64,
    pub available_for_reservation: AtomicU64,
    pub current_reservation: AtomicU64,
}

const _: () = {
    assert!(size_of::<SharedBlock>() == RECORD_SIZE);
    assert!(size_of::<SegmentCounters>() == 32);
    assert!(offset_of!(SharedBlock, target_active_mb) == 0);
    assert!(offset_of!(SharedBlock, target_idle_mb) == 4);
    assert!(offset_of!(SharedBlock, active_priority) == 8);
    assert!(offset_of!(SharedBlock, idle_priority) == 12);
    assert!(offset_of!(SharedBlock, heap_512mb) == 16);
    assert!(offset_of!(SharedBlock, heap_1gb) == 20);
    assert!(offset_of!(SharedBlock, active_bytes) == 24);
    assert!(offset_of!(SharedBlock, active_slots) == 32);
    assert!(offset_of!(SharedBlock, idle_bytes) == 40);
    assert!(offset_of!(SharedBlock, idle_slots) == 48);
    assert!(offset_of!(SharedBlock, heap_bytes) == 56);
    assert!(offset_of!(SharedBlock, local) == 64);
    assert!(offset_of!(SharedBlock, non_local) == 96);
    assert!(offset_of!(SharedBlock, is_running) == 128);
    assert!(offset_of!(SharedBlock, request_shutdown) == 132);
    assert!(offset_of!(SharedBlock, frame_count) == 136);
};

/// Byte offsets of the record fields, for companion tools that read the
/// mapping without this crate.
pub mod offsets {
    pub const TARGET_ACTIVE_MB: usize = 0;
    pub const TARGET_IDLE_MB: usize = 4;
    pub const ACTIVE_PRIORITY: usize = 8;
    pub const IDLE_PRIORITY: usize = 12;
    pub const HEAP_512MB: usize = 16;
    pub const HEAP_1GB: usize = 20;
    pub const ACTIVE_BYTES: usize = 24;
    pub const ACTIVE_SLOTS: usize = 32;
    pub const IDLE_BYTES: usize = 40;
    pub const IDLE_SLOTS: usize = 48;
    pub const HEAP_BYTES: usize = 56;
    pub const LOCAL_BUDGET: usize = 64;
    pub const NON_LOCAL_BUDGET: usize = 96;
    pub const IS_RUNNING: usize = 128;
    pub const REQUEST_SHUTDOWN: usize = 132;
    pub const FRAME_COUNT: usize = 136;
}

const _: () = {
    assert!(offset_of!(SharedBlock, frame_count) == offsets::FRAME_COUNT);
    assert!(offset_of!(SharedBlock, request_shutdown) == offsets::REQUEST_SHUTDOWN);
    assert!(offset_of!(SharedBlock, non_local) == offsets::NON_LOCAL_BUDGET);
};
