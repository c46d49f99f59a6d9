// Copyright 2024-2026 vram-pressure Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared control channel.
//!
//! A fixed 144-byte record mapped into the helper and into any number of
//! controller processes. The helper *creates* it (zero-filled), controllers
//! *open* it, and dropping a handle closes that side's mapping.
//!
//! Fields are split by owner: the controller writes inputs, the helper writes
//! outputs. There is no lock and no sequence stamp, so a reader may see
//! fields from different ticks.

mod layout;
mod views;

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
use unix::Region;
#[cfg(windows)]
use windows::Region;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use layout::{offsets, RECORD_SIZE};
pub use views::{ControlInputs, HelperStatus, InputView, InputWriter, OutputPublisher, OutputView};

/// Default logical channel name.
pub const DEFAULT_CHANNEL_NAME: &str = "VramPressureSharedMemory";

const MAX_NAME_LEN: usize = 200;

/// Errors from creating or opening the channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("invalid channel name: {0:?}")]
    InvalidName(String),

    #[error("helper not running (no live channel {0:?})")]
    NotRunning(String),

    #[error("channel {0:?} is held by a running helper")]
    AlreadyRunning(String),

    #[error("channel layout mismatch: expected {expected} bytes, found {actual}")]
    LayoutMismatch { expected: usize, actual: usize },

    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{call} failed with OS error {code}")]
    Os { call: &'static str, code: u32 },
}

/// Where the channel lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Logical name shared by helper and controllers.
    pub name: String,
    /// Directory holding the backing file (Unix only).
    pub shm_dir: PathBuf,
}

impl ChannelConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shm_dir: default_shm_dir(),
        }
    }

    pub fn with_shm_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shm_dir = dir.into();
        self
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_NAME)
    }
}

/// `/dev/shm` when present, else the temp dir.
pub fn default_shm_dir() -> PathBuf {
    let shm = Path::new("/dev/shm");
    if cfg!(target_os = "linux") && shm.is_dir() {
        shm.to_path_buf()
    } else {
        std::env::temp_dir()
    }
}

/// Reject names that cannot be used on every backing.
pub fn validate_name(name: &str) -> Result<(), ChannelError> {
    let bad = name.is_empty()
        || name.len() > MAX_NAME_LEN
        || name.contains(['/', '\\', '\0'])
        || name == "."
        || name == "..";
    if bad {
        return Err(ChannelError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// The helper's handle: owns the record for its lifetime.
pub struct HelperChannel {
    name: String,
    region: Region,
}

impl HelperChannel {
    /// Create the record and zero-fill it. On Unix a record left by a dead
    /// helper is replaced, while one held by a live helper fails with
    /// [`ChannelError::AlreadyRunning`].
    pub fn create(config: &ChannelConfig) -> Result<Self, ChannelError> {
        validate_name(&config.name)?;
        let region = Region::create(config)?;
        Ok(Self {
            name: config.name.clone(),
            region,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> InputView<'_> {
        InputView::new(self.region.block())
    }

    pub fn outputs(&self) -> OutputPublisher<'_> {
        OutputPublisher::new(self.region.block())
    }

    /// Write initial input values. Only valid before `IsRunning` is set,
    /// while no controller can have observed the record.
    pub fn seed_inputs(&self, inputs: &ControlInputs) {
        InputWriter::new(self.region.block()).write_all(inputs);
    }

    /// Unmap. Equivalent to dropping the handle.
    pub fn close(self) {}
}

/// A controller's handle onto a running helper's record.
pub struct ControllerChannel {
    name: String,
    region: Region,
}

impl ControllerChannel {
    /// Map an existing record. Fails with [`ChannelError::NotRunning`] when
    /// no helper has created it, or (on Unix) when the helper that created
    /// it has died; the leftover file is removed in that case.
    pub fn open(config: &ChannelConfig) -> Result<Self, ChannelError> {
        validate_name(&config.name)?;
        let region = Region::open(config)?;
        Ok(Self {
            name: config.name.clone(),
            region,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> InputWriter<'_> {
        InputWriter::new(self.region.block())
    }

    pub fn outputs(&self) -> OutputView<'_> {
        OutputView::new(self.region.block())
    }

    /// Unmap. Equivalent to dropping the handle.
    pub fn close(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_validation() {
        assert!(validate_name(DEFAULT_CHANNEL_NAME).is_ok());
        assert!(validate_name("a").is_ok());
        assert!(validate_name(&"x".repeat(MAX_NAME_LEN)).is_ok());

        for bad in ["", "a/b", "a\\b", "..", "nul\0byte"] {
            assert!(matches!(validate_name(bad), Err(ChannelError::InvalidName(_))), "{bad:?}");
        }
        assert!(validate_name(&"x".repeat(MAX_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn test_config_builder() {
        let cfg = ChannelConfig::new("Test").with_shm_dir("/tmp/x");
        assert_eq!(cfg.name, "Test");
        assert_eq!(cfg.shm_dir, PathBuf::from("/tmp/x"));
        assert_eq!(ChannelConfig::default().name, DEFAULT_CHANNEL_NAME);
    }
}
