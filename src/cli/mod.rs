// Copyright 2024-2026 vram-pressure Contributors
// SPDX-License-Identifier: Apache-2.0

//! Controller-side subcommands.
//!
//! These open a running helper's shared record; none of them touch the GPU.
//!
//! ## Usage
//!
//! ```bash
//! vram-pressure status --json            # Print inputs and outputs
//! vram-pressure set --active-mb 1024     # Write input fields
//! vram-pressure stop                     # Set RequestShutdown
//! vram-pressure health                   # Exit 0 on healthy
//! ```

pub mod config_cmd;
pub mod control;
pub mod health;
pub mod status;

pub use control::{run_set, run_stop, SetArgs};
pub use health::{run_health, run_liveness};
pub use status::{run_status, StatusDocument};

use crate::channel::{ChannelConfig, ChannelError, ControllerChannel};

/// Success / healthy.
pub const EXIT_OK: i32 = 0;
/// Failure / unhealthy.
pub const EXIT_FAILURE: i32 = 1;
/// Configuration or usage error.
pub const EXIT_CONFIG: i32 = 2;
/// The channel could not be opened.
pub const EXIT_NOT_RUNNING: i32 = 3;

/// Open the record, printing the reason and mapping it to an exit code on
/// failure.
pub fn open_channel(config: &ChannelConfig) -> Result<ControllerChannel, i32> {
    ControllerChannel::open(config).map_err(|e| {
        eprintln!("Error: {e}");
        exit_code_for(&e)
    })
}

fn exit_code_for(err: &ChannelError) -> i32 {
    match err {
        ChannelError::NotRunning(_) => EXIT_NOT_RUNNING,
        ChannelError::InvalidName(_) => EXIT_CONFIG,
        _ => EXIT_FAILURE,
    }
}
