// Copyright 2024-2026 vram-pressure Contributors
// SPDX-License-Identifier: Apache-2.0

//! `health` and `live`: check a running helper through its record.

use super::{open_channel, EXIT_FAILURE, EXIT_OK};
use crate::config::HelperConfig;
use crate::health::{HealthChecker, HealthConfig, HealthState};

/// A checker whose sample window spans at least two of the helper's ticks.
fn checker_for(config: &HelperConfig) -> HealthChecker {
    let frame_interval = config.controller_config().frame_interval();
    HealthChecker::new(HealthConfig::for_frame_interval(frame_interval))
}

/// Full health check. Exit 0 when healthy or degraded, 1 when unhealthy,
/// 3 when the helper is not running.
pub fn run_health(config: &HelperConfig, json: bool) -> i32 {
    let channel = match open_channel(&config.channel) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let report = checker_for(config).check(&channel);

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("Error: failed to encode report: {e}");
                return EXIT_FAILURE;
            }
        }
    } else {
        println!("State:    {:?}", report.state);
        println!("Running:  {}", report.running);
        println!(
            "Frames:   {} (+{} while sampling)",
            report.frame_count, report.frames_observed
        );
        println!(
            "Active:   {} / {} bytes",
            report.achieved_active_bytes, report.requested_active_bytes
        );
        println!(
            "Idle:     {} / {} bytes",
            report.achieved_idle_bytes, report.requested_idle_bytes
        );
    }

    match report.state {
        HealthState::Healthy | HealthState::Degraded => EXIT_OK,
        HealthState::Unhealthy => EXIT_FAILURE,
    }
}

/// Liveness check: exit 0 when the helper is ticking.
///
/// Both commands size their sample window from the configured frame rate, so
/// the CLI must see the same `VRAM_PRESSURE_FRAME_RATE` as the helper.
pub fn run_liveness(config: &HelperConfig) -> i32 {
    let channel = match open_channel(&config.channel) {
        Ok(c) => c,
        Err(code) => return code,
    };
    if checker_for(config).is_alive(&channel) {
        EXIT_OK
    } else {
        EXIT_FAILURE
    }
}
