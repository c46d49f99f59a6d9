// Copyright 2024-2026 vram-pressure Contributors
// SPDX-License-Identifier: Apache-2.0

//! Cooperative shutdown coordination.
//!
//! A request can come from Ctrl+C or from the record's `RequestShutdown`
//! field. The tick loop observes it at the next tick boundary, then drains the
//! GPU and releases everything before the process exits.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Shutdown state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Draining,
    Stopped,
}

/// What asked the helper to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C or console close.
    Signal,
    /// A controller set `RequestShutdown`.
    ChannelRequest,
    /// The tick loop hit a fatal device error.
    DeviceError,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Signal => write!(f, "signal"),
            ShutdownReason::ChannelRequest => write!(f, "channel request"),
            ShutdownReason::DeviceError => write!(f, "device error"),
        }
    }
}

/// Shared between the tick loop and the signal listener.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    state: Arc<RwLock<ShutdownState>>,
    reason: Arc<Mutex<Option<ShutdownReason>>>,
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(ShutdownState::Running)),
            reason: Arc::new(Mutex::new(None)),
            token: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.read()
    }

    /// Ask the loop to stop. Returns false if a request was already pending;
    /// the first reason wins.
    pub fn request(&self, reason: ShutdownReason) -> bool {
        let mut slot = self.reason.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(reason);
        drop(slot);
        info!(%reason, "shutdown requested");
        self.token.cancel();
        true
    }

    pub fn is_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.reason.lock()
    }

    /// Resolves once a shutdown has been requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub fn begin_drain(&self) {
        *self.state.write() = ShutdownState::Draining;
    }

    pub fn mark_stopped(&self) {
        *self.state.write() = ShutdownState::Stopped;
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Request shutdown when Ctrl+C arrives.
pub async fn listen_for_ctrl_c(coordinator: ShutdownCoordinator) {
    if tokio::signal::ctrl_c().await.is_ok() {
        coordinator.request(ShutdownReason::Signal);
    }
}
