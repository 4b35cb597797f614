// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the “License”);
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an “AS IS” BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of the MIND project (Machine Intelligence Native Design).

//! High-level lowering pipeline.
//!
//! Verifies the traced graph, converts it against a registry and verifies
//! the lowered result before it is handed to backend compilation.

use crate::config::ConvertOptions;
use crate::error::ConvertError;
use crate::graph::{self, Graph, GraphVerifyError};
use crate::lower::{self, Converter, LoweredGraph, LoweredVerifyError};
use crate::ops::{default_registry, Registry};
use crate::shapes::InputSpec;

/// Options controlling the lowering pipeline.
#[derive(Debug, Default, Clone)]
pub struct CompileOptions {
    pub convert: ConvertOptions,
}

/// Artifacts produced by [`compile_graph`].
#[derive(Debug, Clone)]
pub struct CompileProducts {
    /// Verified lowered graph.
    pub lowered: LoweredGraph,
}

/// Errors surfaced by the lowering pipeline.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// The traced graph is malformed.
    #[error("graph verification failed: {0}")]
    GraphVerify(#[from] GraphVerifyError),
    /// A node or input spec could not be converted.
    #[error("conversion failed: {0}")]
    Convert(#[from] ConvertError),
    /// The converter produced an inconsistent result.
    #[error("lowered graph verification failed: {0}")]
    LoweredVerify(#[from] LoweredVerifyError),
}

/// Pipeline entry point using the built-in registry.
pub fn compile_graph(
    graph: &Graph,
    specs: &[InputSpec],
    opts: &CompileOptions,
) -> Result<CompileProducts, CompileError> {
    compile_graph_with(default_registry(), graph, specs, opts)
}

/// Verify, convert and verify again against `registry`.
pub fn compile_graph_with(
    registry: &Registry,
    graph: &Graph,
    specs: &[InputSpec],
    opts: &CompileOptions,
) -> Result<CompileProducts, CompileError> {
    graph::verify_graph(graph)?;
    let lowered = Converter::new(registry)
        .with_options(opts.convert.clone())
        .convert(graph, specs)?;
    lower::verify_lowered(&lowered)?;
    Ok(CompileProducts { lowered })
}
