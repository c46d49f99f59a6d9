// Copyright 2024-2026 vram-pressure Contributors
// SPDX-License-Identifier: Apache-2.0

//! Residency priority hints.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How reluctant the driver should be to evict an allocation.
///
/// The ordinal values are the ones carried in the shared record's priority
/// selector fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResidencyPriority {
    Minimum = 0,
    Low = 1,
    Normal = 2,
    High = 3,
    Maximum = 4,
}

impl ResidencyPriority {
    pub const ALL: [ResidencyPriority; 5] = [
        ResidencyPriority::Minimum,
        ResidencyPriority::Low,
        ResidencyPriority::Normal,
        ResidencyPriority::High,
        ResidencyPriority::Maximum,
    ];

    /// Ordinal as written to the shared record.
    pub fn ordinal(self) -> i32 {
        self as i32
    }

    /// Map a record ordinal back to a priority. `None` outside 0..=4.
    pub fn from_ordinal(value: i32) -> Option<Self> {
        usize::try_from(value)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn name(self) -> &'static str {
        match self {
            ResidencyPriority::Minimum => "minimum",
            ResidencyPriority::Low => "low",
            ResidencyPriority::Normal => "normal",
            ResidencyPriority::High => "high",
            ResidencyPriority::Maximum => "maximum",
        }
    }
}

impl fmt::Display for ResidencyPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error for unrecognized priority names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown residency priority '{0}' (expected minimum, low, normal, high, maximum or 0-4)")]
pub struct ParsePriorityError(pub String);

impl FromStr for ResidencyPriority {
    type Err = ParsePriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        if let Ok(ordinal) = lowered.parse::<i32>() {
            return Self::from_ordinal(ordinal).ok_or_else(|| ParsePriorityError(s.to_string()));
        }
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.name() == lowered)
            .ok_or_else(|| ParsePriorityError(s.to_string()))
    }
}
