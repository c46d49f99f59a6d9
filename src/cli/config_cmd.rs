// Copyright 2024-2026 vram-pressure Contributors
// SPDX-License-Identifier: Apache-2.0

//! Config CLI subcommands: show, defaults, validate.
//!
//! These read configuration only; no helper needs to be running.

use tracing_subscriber::EnvFilter;

use crate::config::{EffectiveConfig, HelperConfig};
use crate::gpu::GpuBackend;

/// Print effective config as key-value pairs to stdout.
pub fn run_show(config: &HelperConfig) {
    print_config(&config.effective_config());
}

/// Print default config values (no env or file overrides) to stdout.
pub fn run_defaults() {
    print_config(&HelperConfig::default().effective_config());
}

/// Check for configurations that load but cannot work.
///
/// Returns 0 if valid, 1 if any warnings are found.
pub fn run_validate(config: &HelperConfig) -> i32 {
    let warnings = validate(config);
    for w in &warnings {
        eprintln!("WARNING: {w}");
    }
    if warnings.is_empty() {
        println!("Configuration is valid.");
        0
    } else {
        1
    }
}

fn validate(config: &HelperConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.backend == GpuBackend::D3d12 && !cfg!(all(windows, feature = "d3d12")) {
        warnings.push("VRAM_PRESSURE_BACKEND=d3d12 but this build has no D3D12 support".into());
    }

    if config.backend == GpuBackend::Simulated {
        let requested = i64::from(config.active_mb) + i64::from(config.idle_mb);
        if requested > config.sim_capacity_mb as i64 {
            warnings.push(format!(
                "initial budgets ({requested} MB) exceed VRAM_PRESSURE_SIM_CAPACITY_MB ({})",
                config.sim_capacity_mb
            ));
        }
    }

    if let Err(e) = EnvFilter::try_new(&config.log.level) {
        warnings.push(format!("VRAM_PRESSURE_LOG is not a valid filter: {e}"));
    }

    #[cfg(unix)]
    if !config.channel.shm_dir.is_dir() {
        warnings.push(format!(
            "VRAM_PRESSURE_SHM_DIR ({}) is not a directory",
            config.channel.shm_dir.display()
        ));
    }

    warnings
}

fn print_config(cfg: &EffectiveConfig) {
    println!("VRAM_PRESSURE_CHANNEL_NAME={}", cfg.channel_name);
    println!("VRAM_PRESSURE_SHM_DIR={}", cfg.shm_dir.display());
    println!("VRAM_PRESSURE_FRAME_RATE={}", cfg.frame_rate);
    println!("VRAM_PRESSURE_BACKEND={}", cfg.backend);
    println!("VRAM_PRESSURE_ACTIVE_MB={}", cfg.active_mb);
    println!("VRAM_PRESSURE_IDLE_MB={}", cfg.idle_mb);
    println!("VRAM_PRESSURE_ACTIVE_PRIORITY={}", cfg.active_priority);
    println!("VRAM_PRESSURE_IDLE_PRIORITY={}", cfg.idle_priority);
    println!("VRAM_PRESSURE_DESCRIPTOR_HEADROOM={}", cfg.descriptor_headroom);
    println!("VRAM_PRESSURE_SIM_CAPACITY_MB={}", cfg.sim_capacity_mb);
    println!("VRAM_PRESSURE_LOG={}", cfg.log);
    println!(
        "VRAM_PRESSURE_LOG_FORMAT={}",
        match cfg.log_format {
            crate::telemetry::LogFormat::Json => "json",
            crate::telemetry::LogFormat::Pretty => "pretty",
        }
    );
    if let Some(path) = &cfg.log_file {
        println!("VRAM_PRESSURE_LOG_FILE={}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simulated() -> HelperConfig {
        HelperConfig {
            backend: GpuBackend::Simulated,
            channel: crate::channel::ChannelConfig::new("cfg-test")
                .with_shm_dir(std::env::temp_dir()),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_passes_with_defaults() {
        assert_eq!(run_validate(&simulated()), 0);
    }

    #[test]
    fn test_validate_flags_oversized_budget() {
        let cfg = HelperConfig {
            active_mb: 6000,
            idle_mb: 4000,
            ..simulated()
        };
        let warnings = validate(&cfg);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("10000 MB"));
        assert_eq!(run_validate(&cfg), 1);
    }

    #[test]
    fn test_validate_flags_bad_filter() {
        let mut cfg = simulated();
        cfg.log.level = "vram_pressure=loud".into();
        assert_eq!(validate(&cfg).len(), 1);
    }

    #[test]
    fn test_print_config_smoke() {
        run_defaults();
        run_show(&simulated());
    }
}
