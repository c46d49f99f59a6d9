// Copyright 2024-2026 vram-pressure Contributors
// SPDX-License-Identifier: Apache-2.0

//! Helper configuration from environment variables and an optional TOML file.
//!
//! Values are layered defaults → file → environment. Invalid environment
//! values are ignored (the lower layer wins) and numbers are clamped to sane
//! ranges, so loading never panics.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `VRAM_PRESSURE_CHANNEL_NAME` | `VramPressureSharedMemory` | Shared record name |
//! | `VRAM_PRESSURE_SHM_DIR` | `/dev/shm` or temp dir | Backing directory (Unix) |
//! | `VRAM_PRESSURE_FRAME_RATE` | 30 | Ticks per second (1-240) |
//! | `VRAM_PRESSURE_BACKEND` | platform | `d3d12` or `simulated` |
//! | `VRAM_PRESSURE_ACTIVE_MB` | 0 | Active budget seeded at create |
//! | `VRAM_PRESSURE_IDLE_MB` | 0 | Idle budget seeded at create |
//! | `VRAM_PRESSURE_ACTIVE_PRIORITY` | `high` | Initial active priority |
//! | `VRAM_PRESSURE_IDLE_PRIORITY` | `normal` | Initial idle priority |
//! | `VRAM_PRESSURE_DESCRIPTOR_HEADROOM` | 64 | Extra descriptors per table growth |
//! | `VRAM_PRESSURE_SIM_CAPACITY_MB` | 8192 | Simulated device capacity |
//! | `VRAM_PRESSURE_LOG` | `info` | Tracing filter |
//! | `VRAM_PRESSURE_LOG_FORMAT` | `pretty` | `json` or `pretty` |
//! | `VRAM_PRESSURE_LOG_FILE` | unset | Log to this file instead of stderr |

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channel::{self, ChannelConfig, ControlInputs, DEFAULT_CHANNEL_NAME};
use crate::controller::ControllerConfig;
use crate::gpu::{GpuBackend, ResidencyPriority, SurfaceDesc};
use crate::telemetry::{LogConfig, LogFormat};

const MIB: u64 = 1024 * 1024;
const MAX_FRAME_RATE: u32 = 240;
const MAX_HEADROOM: u32 = 4096;
const MAX_SIM_CAPACITY_MB: u64 = 1024 * 1024;

/// Errors from loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete helper configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperConfig {
    pub channel: ChannelConfig,
    pub frame_rate: u32,
    pub backend: GpuBackend,
    pub active_mb: i32,
    pub idle_mb: i32,
    pub active_priority: ResidencyPriority,
    pub idle_priority: ResidencyPriority,
    pub descriptor_headroom: u32,
    pub sim_capacity_mb: u64,
    pub log: LogConfig,
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::new(DEFAULT_CHANNEL_NAME),
            frame_rate: 30,
            backend: GpuBackend::default(),
            active_mb: 0,
            idle_mb: 0,
            active_priority: ResidencyPriority::High,
            idle_priority: ResidencyPriority::Normal,
            descriptor_headroom: 64,
            sim_capacity_mb: 8192,
            log: LogConfig::default(),
        }
    }
}

/// Serializable summary of every effective value.
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub channel_name: String,
    pub shm_dir: PathBuf,
    pub frame_rate: u32,
    pub backend: GpuBackend,
    pub active_mb: i32,
    pub idle_mb: i32,
    pub active_priority: ResidencyPriority,
    pub idle_priority: ResidencyPriority,
    pub descriptor_headroom: u32,
    pub sim_capacity_mb: u64,
    pub log: String,
    pub log_format: LogFormat,
    pub log_file: Option<PathBuf>,
}

/// On-disk layout. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    channel_name: Option<String>,
    shm_dir: Option<PathBuf>,
    frame_rate: Option<u32>,
    backend: Option<GpuBackend>,
    active_mb: Option<i32>,
    idle_mb: Option<i32>,
    active_priority: Option<ResidencyPriority>,
    idle_priority: Option<ResidencyPriority>,
    descriptor_headroom: Option<u32>,
    sim_capacity_mb: Option<u64>,
    log: Option<String>,
    log_format: Option<LogFormat>,
    log_file: Option<PathBuf>,
}

/// Parse an env var with `FromStr`, `None` when missing or invalid.
fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Load configuration from `path` (when given), then apply the environment.
pub fn load_with_file(path: Option<&Path>) -> Result<HelperConfig, ConfigError> {
    let mut cfg = HelperConfig::default();
    if let Some(path) = path {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: FileConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.apply_file(file);
    }
    cfg.apply_env();
    cfg.clamp();
    channel::validate_name(&cfg.channel.name)
        .map_err(|e| ConfigError::Invalid(e.to_string()))?;
    Ok(cfg)
}

impl HelperConfig {
    fn apply_file(&mut self, file: FileConfig) {
        if let Some(v) = file.channel_name {
            self.channel.name = v;
        }
        if let Some(v) = file.shm_dir {
            self.channel.shm_dir = v;
        }
        if let Some(v) = file.frame_rate {
            self.frame_rate = v;
        }
        if let Some(v) = file.backend {
            self.backend = v;
        }
        if let Some(v) = file.active_mb {
            self.active_mb = v;
        }
        if let Some(v) = file.idle_mb {
            self.idle_mb = v;
        }
        if let Some(v) = file.active_priority {
            self.active_priority = v;
        }
        if let Some(v) = file.idle_priority {
            self.idle_priority = v;
        }
        if let Some(v) = file.descriptor_headroom {
            self.descriptor_headroom = v;
        }
        if let Some(v) = file.sim_capacity_mb {
            self.sim_capacity_mb = v;
        }
        if let Some(v) = file.log {
            self.log.level = v;
        }
        if let Some(v) = file.log_format {
            self.log.format = v;
        }
        if let Some(v) = file.log_file {
            self.log.output_path = Some(v);
        }
    }

    fn apply_env(&mut self) {
        if let Some(v) = env_string("VRAM_PRESSURE_CHANNEL_NAME") {
            self.channel.name = v;
        }
        if let Some(v) = env_string("VRAM_PRESSURE_SHM_DIR") {
            self.channel.shm_dir = PathBuf::from(v);
        }
        if let Some(v) = parse_env("VRAM_PRESSURE_FRAME_RATE") {
            self.frame_rate = v;
        }
        if let Some(v) = parse_env("VRAM_PRESSURE_BACKEND") {
            self.backend = v;
        }
        if let Some(v) = parse_env("VRAM_PRESSURE_ACTIVE_MB") {
            self.active_mb = v;
        }
        if let Some(v) = parse_env("VRAM_PRESSURE_IDLE_MB") {
            self.idle_mb = v;
        }
        if let Some(v) = parse_env("VRAM_PRESSURE_ACTIVE_PRIORITY") {
            self.active_priority = v;
        }
        if let Some(v) = parse_env("VRAM_PRESSURE_IDLE_PRIORITY") {
            self.idle_priority = v;
        }
        if let Some(v) = parse_env("VRAM_PRESSURE_DESCRIPTOR_HEADROOM") {
            self.descriptor_headroom = v;
        }
        if let Some(v) = parse_env("VRAM_PRESSURE_SIM_CAPACITY_MB") {
            self.sim_capacity_mb = v;
        }
        if let Some(v) = env_string("VRAM_PRESSURE_LOG") {
            self.log.level = v;
        }
        if let Some(v) = parse_env("VRAM_PRESSURE_LOG_FORMAT") {
            self.log.format = v;
        }
        if let Some(v) = env_string("VRAM_PRESSURE_LOG_FILE") {
            self.log.output_path = Some(PathBuf::from(v));
        }
    }

    fn clamp(&mut self) {
        self.frame_rate = self.frame_rate.clamp(1, MAX_FRAME_RATE);
        self.active_mb = self.active_mb.max(0);
        self.idle_mb = self.idle_mb.max(0);
        self.descriptor_headroom = self.descriptor_headroom.min(MAX_HEADROOM);
        self.sim_capacity_mb = self.sim_capacity_mb.clamp(1, MAX_SIM_CAPACITY_MB);
    }

    /// Bytes of the simulated device.
    pub fn sim_capacity_bytes(&self) -> u64 {
        self.sim_capacity_mb * MIB
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            frame_rate: self.frame_rate,
            surface: SurfaceDesc::SLOT,
            descriptor_headroom: self.descriptor_headroom,
            active_priority: self.active_priority,
            idle_priority: self.idle_priority,
        }
    }

    /// Input values written into a freshly created record.
    pub fn seed_inputs(&self) -> ControlInputs {
        ControlInputs {
            active_mb: self.active_mb,
            idle_mb: self.idle_mb,
            active_priority: self.active_priority.ordinal(),
            idle_priority: self.idle_priority.ordinal(),
            heap_512mb: false,
            heap_1gb: false,
            shutdown_requested: false,
        }
    }

    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            channel_name: self.channel.name.clone(),
            shm_dir: self.channel.shm_dir.clone(),
            frame_rate: self.frame_rate,
            backend: self.backend,
            active_mb: self.active_mb,
            idle_mb: self.idle_mb,
            active_priority: self.active_priority,
            idle_priority: self.idle_priority,
            descriptor_headroom: self.descriptor_headroom,
            sim_capacity_mb: self.sim_capacity_mb,
            log: self.log.level.clone(),
            log_format: self.log.format,
            log_file: self.log.output_path.clone(),
        }
    }
}
