// Copyright 2024-2026 vram-pressure Contributors
// SPDX-License-Identifier: Apache-2.0

//! `status`: print the record's inputs and outputs.

use serde::Serialize;

use super::{open_channel, EXIT_FAILURE, EXIT_OK};
use crate::channel::{ChannelConfig, ControlInputs, ControllerChannel, HelperStatus};
use crate::gpu::MemoryInfo;
use crate::memory::BudgetClass;

/// Everything `status` reports.
#[derive(Debug, Clone, Serialize)]
pub struct StatusDocument {
    pub channel: String,
    pub inputs: ControlInputs,
    pub outputs: HelperStatus,
}

impl StatusDocument {
    pub fn read(channel: &ControllerChannel) -> Self {
        Self {
            channel: channel.name().to_string(),
            inputs: channel.inputs().snapshot(),
            outputs: channel.outputs().snapshot(),
        }
    }

    /// Human-readable rendering.
    pub fn render(&self) -> String {
        let i = &self.inputs;
        let o = &self.outputs;
        let mut out = String::new();
        out.push_str(&format!("Channel: {}\n", self.channel));
        out.push_str(&format!(
            "Helper:  {} (frame {})\n\n",
            if o.running { "running" } else { "stopped" },
            o.frame_count
        ));
        out.push_str("Requested:\n");
        out.push_str(&format!(
            "  active  {:>8} MB  priority {}\n",
            i.active_mb,
            priority_label(i, BudgetClass::Active)
        ));
        out.push_str(&format!(
            "  idle    {:>8} MB  priority {}\n",
            i.idle_mb,
            priority_label(i, BudgetClass::Idle)
        ));
        out.push_str(&format!(
            "  heaps   512MB={} 1GB={}\n",
            on_off(i.heap_512mb),
            on_off(i.heap_1gb)
        ));
        if i.shutdown_requested {
            out.push_str("  shutdown requested\n");
        }
        out.push_str("\nAchieved:\n");
        out.push_str(&format!(
            "  active  {:>8} MB  ({} slots)\n",
            mib(o.active_bytes),
            o.active_slots
        ));
        out.push_str(&format!(
            "  idle    {:>8} MB  ({} slots)\n",
            mib(o.idle_bytes),
            o.idle_slots
        ));
        out.push_str(&format!("  heaps   {:>8} MB\n\n", mib(o.heap_bytes)));
        out.push_str("Memory budget (MB):\n");
        out.push_str("            budget     usage  avail-res   cur-res\n");
        out.push_str(&segment_row("local", &o.telemetry.local));
        out.push_str(&segment_row("non-local", &o.telemetry.non_local));
        out
    }
}

fn priority_label(inputs: &ControlInputs, class: BudgetClass) -> String {
    match inputs.priority(class) {
        Some(p) => p.to_string(),
        None => format!("invalid({})", inputs.priority_selector(class)),
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

fn mib(bytes: u64) -> u64 {
    bytes / (1024 * 1024)
}

fn segment_row(label: &str, info: &MemoryInfo) -> String {
    format!(
        "  {:<9} {:>9} {:>9} {:>10} {:>9}\n",
        label,
        mib(info.budget),
        mib(info.current_usage),
        mib(info.available_for_reservation),
        mib(info.current_reservation)
    )
}

/// Print status. Returns the process exit code.
pub fn run_status(config: &ChannelConfig, json: bool) -> i32 {
    let channel = match open_channel(config) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let doc = StatusDocument::read(&channel);
    if json {
        match serde_json::to_string_pretty(&doc) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("Error: failed to encode status: {e}");
                return EXIT_FAILURE;
            }
        }
    } else {
        print!("{}", doc.render());
    }
    EXIT_OK
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> StatusDocument {
        StatusDocument {
            channel: "Test".into(),
            inputs: ControlInputs {
                active_mb: 256,
                active_priority: 3,
                idle_priority: 11,
                heap_1gb: true,
                ..Default::default()
            },
            outputs: HelperStatus {
                active_bytes: 256 * 1024 * 1024,
                active_slots: 16,
                running: true,
                frame_count: 42,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_render_mentions_key_fields() {
        let text = doc().render();
        assert!(text.contains("running (frame 42)"));
        assert!(text.contains("priority high"));
        assert!(text.contains("invalid(11)"));
        assert!(text.contains("1GB=on"));
        assert!(text.contains("(16 slots)"));
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(doc()).unwrap();
        assert_eq!(json["inputs"]["active_mb"], 256);
        assert_eq!(json["outputs"]["active_slots"], 16);
        assert_eq!(json["outputs"]["telemetry"]["local"]["budget"], 0);
    }
}
