// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0

//! Conversion options, optionally read from a `[convert]` TOML table.
//!
//! ```toml
//! [convert]
//! enabled_precisions = ["f32", "f16"]
//! disallowed_ops = ["aten.sigmoid.default"]
//! allow_dynamic_shapes = true
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::ops::OpId;
use crate::types::DType;

/// Knobs applied by the converter on top of each rule's own constraints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConvertOptions {
    /// Dtypes the engine may run in. Empty means no restriction.
    pub enabled_precisions: BTreeSet<DType>,
    /// Ops that must stay outside the engine even if a rule exists.
    pub disallowed_ops: BTreeSet<OpId>,
    /// When false, every input spec must be static.
    pub allow_dynamic_shapes: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            enabled_precisions: BTreeSet::new(),
            disallowed_ops: BTreeSet::new(),
            allow_dynamic_shapes: true,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct OptionsFile {
    #[serde(default)]
    convert: ConvertOptions,
}

impl ConvertOptions {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: OptionsFile =
            toml::from_str(content).context("Failed to parse conversion options")?;
        Ok(file.convert)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("Invalid options in {}", path.display()))
    }

    pub fn allows_dtype(&self, dtype: DType) -> bool {
        self.enabled_precisions.is_empty() || self.enabled_precisions.contains(&dtype)
    }

    pub fn disallows(&self, op: &OpId) -> bool {
        self.disallowed_ops.contains(op)
    }
}
