// Copyright 2024-2026 vram-pressure Contributors
// SPDX-License-Identifier: Apache-2.0

//! vram-pressure
//!
//! A diagnostic helper that holds a caller-chosen amount of GPU memory
//! resident, so that other software can be observed under controlled memory
//! pressure and eviction.
//!
//! # Moving parts
//!
//! - **Resource pools** ([`memory`]): fixed-size render surfaces grown and
//!   shrunk toward a byte budget, one pool per budget class.
//! - **Keep-alive**: one clear per active slot per tick so the driver keeps
//!   the surfaces classified as in use.
//! - **Telemetry** ([`telemetry`]): the adapter's memory-budget counters for
//!   local and non-local segment groups.
//! - **Control channel** ([`channel`]): a 144-byte shared record. A companion
//!   process writes budgets and priorities and reads back achieved values.
//!
//! # Tick
//!
//! Read inputs → sample telemetry → (drain, resize) → keep-alive → publish.
//! The [`Controller`] runs this at a fixed rate on one thread.

pub mod channel;
pub mod cli;
pub mod config;
pub mod controller;
pub mod gpu;
pub mod health;
pub mod memory;
pub mod shutdown;
pub mod telemetry;

pub use channel::{ChannelConfig, ChannelError, ControllerChannel, HelperChannel};
pub use controller::{Controller, ControllerConfig, ControllerError, TickReport};
pub use gpu::{GpuBackend, GpuDevice, GpuError, ResidencyPriority, SimulatedGpu};
pub use memory::BudgetClass;
