// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Per-class freezing behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FreezeOptions {
    /// Lock instances after construction. With protections off, instances
    /// still capture and hash their arguments but accept attribute changes.
    pub protections: bool,
    /// Log every composite node entered and left by the walker at `trace`.
    pub trace_walk: bool,
}

impl Default for FreezeOptions {
    fn default() -> Self {
        Self {
            protections: true,
            trace_walk: false,
        }
    }
}

impl FreezeOptions {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_protections(mut self, protections: bool) -> Self {
        self.protections = protections;
        self
    }

    pub fn with_trace_walk(mut self, trace_walk: bool) -> Self {
        self.trace_walk = trace_walk;
        self
    }
}
