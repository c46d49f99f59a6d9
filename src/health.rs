// Copyright 2024-2026 vram-pressure Contributors
// SPDX-License-Identifier: Apache-2.0

//! Health check of a running helper, as seen through the shared record.
//!
//! The checker reads the record twice, `sample_interval` apart. A helper is
//! alive when `IsRunning` is set and `FrameCount` advanced in between.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::channel::{ControlInputs, ControllerChannel, HelperStatus};
use crate::memory::BudgetClass;

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthState {
    Healthy,
    /// Alive, but holding less memory than requested.
    Degraded,
    Unhealthy,
}

/// Detailed health report.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub state: HealthState,
    pub running: bool,
    pub advancing: bool,
    pub frame_count: u64,
    pub frames_observed: u64,
    pub requested_active_bytes: u64,
    pub achieved_active_bytes: u64,
    pub requested_idle_bytes: u64,
    pub achieved_idle_bytes: u64,
}

/// Shortest gap between the two record reads.
const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(250);
/// Slack on top of two ticks for scheduling jitter in the helper.
const SAMPLE_MARGIN: Duration = Duration::from_millis(100);

/// Health check configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthConfig {
    /// Gap between the two record reads. Must exceed one tick.
    pub sample_interval: Duration,
}

impl HealthConfig {
    /// Sample window for a helper ticking every `frame_interval`: two ticks
    /// plus margin, never below 250ms.
    pub fn for_frame_interval(frame_interval: Duration) -> Self {
        let window = frame_interval.saturating_mul(2).saturating_add(SAMPLE_MARGIN);
        Self {
            sample_interval: window.max(MIN_SAMPLE_INTERVAL),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            sample_interval: MIN_SAMPLE_INTERVAL,
        }
    }
}

/// Evaluates helper health from record snapshots.
pub struct HealthChecker {
    config: HealthConfig,
}

impl HealthChecker {
    pub fn new(config: HealthConfig) -> Self {
        Self { config }
    }

    /// Read the record twice and evaluate.
    pub fn check(&self, channel: &ControllerChannel) -> HealthReport {
        let before = channel.outputs().snapshot();
        std::thread::sleep(self.config.sample_interval);
        let after = channel.outputs().snapshot();
        let inputs = channel.inputs().snapshot();
        self.evaluate(&inputs, &before, &after)
    }

    /// Liveness only: running and advancing.
    pub fn is_alive(&self, channel: &ControllerChannel) -> bool {
        self.check(channel).state != HealthState::Unhealthy
    }

    /// Classify two snapshots taken in order.
    pub fn evaluate(
        &self,
        inputs: &ControlInputs,
        before: &HelperStatus,
        after: &HelperStatus,
    ) -> HealthReport {
        let advancing = after.frame_count != before.frame_count;
        let requested_active = inputs.target_bytes(BudgetClass::Active);
        let requested_idle = inputs.target_bytes(BudgetClass::Idle);

        let state = if !after.running || !advancing {
            HealthState::Unhealthy
        } else if after.active_bytes < requested_active || after.idle_bytes < requested_idle {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        };

        HealthReport {
            state,
            running: after.running,
            advancing,
            frame_count: after.frame_count,
            frames_observed: after.frame_count.wrapping_sub(before.frame_count),
            requested_active_bytes: requested_active,
            achieved_active_bytes: after.active_bytes,
            requested_idle_bytes: requested_idle,
            achieved_idle_bytes: after.idle_bytes,
        }
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    fn status(frame_count: u64, running: bool, active_bytes: u64) -> HelperStatus {
        HelperStatus {
            frame_count,
            running,
            active_bytes,
            ..Default::default()
        }
    }

    fn inputs(active_mb: i32) -> ControlInputs {
        ControlInputs {
            active_mb,
            ..Default::default()
        }
    }

    #[test]
    fn test_healthy_when_advancing_and_satisfied() {
        let checker = HealthChecker::default();
        let report = checker.evaluate(
            &inputs(256),
            &status(10, true, 256 * MIB),
            &status(17, true, 256 * MIB),
        );
        assert_eq!(report.state, HealthState::Healthy);
        assert_eq!(report.frames_observed, 7);
    }

    #[test]
    fn test_degraded_on_shortfall() {
        let checker = HealthChecker::default();
        let report = checker.evaluate(
            &inputs(512),
            &status(1, true, 160 * MIB),
            &status(2, true, 160 * MIB),
        );
        assert_eq!(report.state, HealthState::Degraded);
        assert_eq!(report.requested_active_bytes, 512 * MIB);
    }

    #[test]
    fn test_unhealthy_when_stalled_or_stopped() {
        let checker = HealthChecker::default();
        let stalled = checker.evaluate(&inputs(0), &status(5, true, 0), &status(5, true, 0));
        assert_eq!(stalled.state, HealthState::Unhealthy);
        assert!(!stalled.advancing);

        let stopped = checker.evaluate(&inputs(0), &status(5, true, 0), &status(6, false, 0));
        assert_eq!(stopped.state, HealthState::Unhealthy);
    }

    #[test]
    fn test_sample_window_covers_slow_helpers() {
        let fast = HealthConfig::for_frame_interval(Duration::from_millis(33));
        assert_eq!(fast, HealthConfig::default());

        let two_fps = HealthConfig::for_frame_interval(Duration::from_millis(500));
        assert_eq!(two_fps.sample_interval, Duration::from_millis(1100));

        let one_fps = HealthConfig::for_frame_interval(Duration::from_secs(1));
        assert!(one_fps.sample_interval > Duration::from_secs(2));
    }

    #[test]
    fn test_report_serializes() {
        let checker = HealthChecker::default();
        let report = checker.evaluate(&inputs(0), &status(1, true, 0), &status(2, true, 0));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["state"], "Healthy");
    }
}
