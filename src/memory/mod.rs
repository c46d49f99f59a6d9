// Copyright 2024-2026 vram-pressure Contributors
// SPDX-License-Identifier: Apache-2.0

//! GPU memory held on behalf of the controller.
//!
//! Provides the slot pools, the per-tick keep-alive pass, and the raw heap
//! reservations.

mod heaps;
mod keepalive;
mod pool;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use heaps::{HeapReservations, HeapSize, HeapToggles};
pub use keepalive::touch_all;
pub use pool::{slots_for_bytes, ResizeOutcome, ResourcePool, ResourcePoolConfig, Slot};

/// Budget classes carried by the control record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetClass {
    /// Slots cleared every tick.
    Active,
    /// Slots allocated once and then left untouched.
    Idle,
}

impl fmt::Display for BudgetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetClass::Active => write!(f, "active"),
            BudgetClass::Idle => write!(f, "idle"),
        }
    }
}
