// Copyright 2024-2026 vram-pressure Contributors
// SPDX-License-Identifier: Apache-2.0

//! `set` and `stop`: write input fields of a running helper's record.

use super::{open_channel, EXIT_CONFIG, EXIT_OK};
use crate::channel::{ChannelConfig, InputWriter};
use crate::gpu::ResidencyPriority;
use crate::memory::{BudgetClass, HeapSize};

/// Fields to write. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetArgs {
    pub active_mb: Option<i32>,
    pub idle_mb: Option<i32>,
    pub active_priority: Option<ResidencyPriority>,
    pub idle_priority: Option<ResidencyPriority>,
    pub heap_512mb: Option<bool>,
    pub heap_1gb: Option<bool>,
}

impl SetArgs {
    /// Parse `--flag value` pairs.
    pub fn parse(args: &[String]) -> Result<Self, String> {
        let mut out = SetArgs::default();
        let mut iter = args.iter();
        while let Some(flag) = iter.next() {
            let value = iter
                .next()
                .ok_or_else(|| format!("missing value for {flag}"))?;
            match flag.as_str() {
                "--active-mb" => out.active_mb = Some(parse_mb(flag, value)?),
                "--idle-mb" => out.idle_mb = Some(parse_mb(flag, value)?),
                "--active-priority" => out.active_priority = Some(parse_priority(value)?),
                "--idle-priority" => out.idle_priority = Some(parse_priority(value)?),
                "--heap-512mb" => out.heap_512mb = Some(parse_switch(flag, value)?),
                "--heap-1gb" => out.heap_1gb = Some(parse_switch(flag, value)?),
                other => return Err(format!("unknown option: {other}")),
            }
        }
        if out.is_empty() {
            return Err("nothing to set".to_string());
        }
        Ok(out)
    }

    pub fn is_empty(&self) -> bool {
        *self == SetArgs::default()
    }

    /// Write the selected fields.
    pub fn apply(&self, writer: &InputWriter<'_>) {
        if let Some(mb) = self.active_mb {
            writer.set_target_mb(BudgetClass::Active, mb);
        }
        if let Some(mb) = self.idle_mb {
            writer.set_target_mb(BudgetClass::Idle, mb);
        }
        if let Some(p) = self.active_priority {
            writer.set_priority(BudgetClass::Active, p);
        }
        if let Some(p) = self.idle_priority {
            writer.set_priority(BudgetClass::Idle, p);
        }
        if let Some(on) = self.heap_512mb {
            writer.set_heap(HeapSize::HalfGib, on);
        }
        if let Some(on) = self.heap_1gb {
            writer.set_heap(HeapSize::OneGib, on);
        }
    }
}

fn parse_mb(flag: &str, value: &str) -> Result<i32, String> {
    match value.parse::<i32>() {
        Ok(mb) if mb >= 0 => Ok(mb),
        _ => Err(format!("{flag} expects a non-negative megabyte count, got {value:?}")),
    }
}

fn parse_priority(value: &str) -> Result<ResidencyPriority, String> {
    value.parse::<ResidencyPriority>().map_err(|e| e.to_string())
}

fn parse_switch(flag: &str, value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        _ => Err(format!("{flag} expects on or off, got {value:?}")),
    }
}

/// Parse and apply `set` arguments. Returns the process exit code.
pub fn run_set(config: &ChannelConfig, args: &[String]) -> i32 {
    let parsed = match SetArgs::parse(args) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {e}");
            return EXIT_CONFIG;
        }
    };
    let channel = match open_channel(config) {
        Ok(c) => c,
        Err(code) => return code,
    };
    parsed.apply(&channel.inputs());
    println!("Updated {}.", channel.name());
    EXIT_OK
}

/// Ask the helper to shut down. Returns the process exit code.
pub fn run_stop(config: &ChannelConfig) -> i32 {
    let channel = match open_channel(config) {
        Ok(c) => c,
        Err(code) => return code,
    };
    channel.inputs().request_shutdown();
    println!("Shutdown requested.");
    EXIT_OK
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_all_flags() {
        let parsed = SetArgs::parse(&args(&[
            "--active-mb",
            "1024",
            "--idle-mb",
            "0",
            "--active-priority",
            "maximum",
            "--idle-priority",
            "1",
            "--heap-512mb",
            "on",
            "--heap-1gb",
            "off",
        ]))
        .unwrap();
        assert_eq!(
            parsed,
            SetArgs {
                active_mb: Some(1024),
                idle_mb: Some(0),
                active_priority: Some(ResidencyPriority::Maximum),
                idle_priority: Some(ResidencyPriority::Low),
                heap_512mb: Some(true),
                heap_1gb: Some(false),
            }
        );
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(SetArgs::parse(&args(&[])).is_err());
        assert!(SetArgs::parse(&args(&["--active-mb"])).is_err());
        assert!(SetArgs::parse(&args(&["--active-mb", "-1"])).is_err());
        assert!(SetArgs::parse(&args(&["--active-priority", "urgent"])).is_err());
        assert!(SetArgs::parse(&args(&["--heap-1gb", "maybe"])).is_err());
        assert!(SetArgs::parse(&args(&["--colour", "red"])).is_err());
    }

    #[test]
    fn test_run_set_without_helper() {
        let dir = tempfile::tempdir().unwrap();
        let config = ChannelConfig::new("cli-set-missing").with_shm_dir(dir.path());
        assert_eq!(
            run_set(&config, &args(&["--active-mb", "1"])),
            crate::cli::EXIT_NOT_RUNNING
        );
        assert_eq!(run_set(&config, &args(&["--bogus", "1"])), EXIT_CONFIG);
        assert_eq!(run_stop(&config), crate::cli::EXIT_NOT_RUNNING);
    }
}
