// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of the MIND project (Machine Intelligence Native Design).

//! Graph-to-engine lowering.
//!
//! [`Converter::convert`] validates the input shape specs, walks the graph
//! in dependency order, resolves every node against the [`Registry`] and
//! records the emitted [`NativeOp`] together with its propagated
//! [`ShapeRange`]. Conversion is all-or-nothing: the first failure aborts
//! the call and no partial graph is returned.

mod native;
mod print;
mod verify;

pub use native::{ActivationKind, ElementWiseKind, NativeOp, UnaryKind};
pub use print::format_lowered_graph;
pub use verify::{verify_lowered, LoweredVerifyError};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use log::{debug, info, trace};

use crate::config::ConvertOptions;
use crate::error::ConvertError;
use crate::graph::{
    topological_order, Graph, GraphInput, GraphNode, GraphVerifyError, NodeId, ValueRef,
};
use crate::ops::{default_registry, ConversionCtx, OpId, Registry};
use crate::shapes::engine::propagate;
use crate::shapes::{Dim, InputSpec, ShapeError, ShapeRange};
use crate::types::DType;

/// A graph input after its spec has been validated.
#[derive(Debug, Clone, PartialEq)]
pub struct LoweredInput {
    pub name: String,
    pub dtype: DType,
    pub shape: ShapeRange,
}

/// The conversion result for one source node.
#[derive(Debug, Clone, PartialEq)]
pub struct LoweredNode {
    pub source: NodeId,
    pub source_op: OpId,
    pub op: NativeOp,
    pub inputs: Vec<ValueRef>,
    pub dtype: DType,
    pub shape: ShapeRange,
}

/// Engine-native operations with per-node output ranges, in the order they
/// were converted. Values keep the source graph's [`ValueRef`]s.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoweredGraph {
    pub inputs: Vec<LoweredInput>,
    pub nodes: Vec<LoweredNode>,
    pub outputs: Vec<ValueRef>,
    used_ops: BTreeSet<OpId>,
}

impl LoweredGraph {
    /// Source op ids consumed by the conversion.
    pub fn used_ops(&self) -> &BTreeSet<OpId> {
        &self.used_ops
    }

    pub fn node(&self, source: NodeId) -> Option<&LoweredNode> {
        self.nodes.iter().find(|n| n.source == source)
    }

    pub fn value_shape(&self, value: ValueRef) -> Option<&ShapeRange> {
        match value {
            ValueRef::Input(idx) => self.inputs.get(idx).map(|i| &i.shape),
            ValueRef::Node(id) => self.node(id).map(|n| &n.shape),
        }
    }

    pub fn value_dtype(&self, value: ValueRef) -> Option<DType> {
        match value {
            ValueRef::Input(idx) => self.inputs.get(idx).map(|i| i.dtype),
            ValueRef::Node(id) => self.node(id).map(|n| n.dtype),
        }
    }

    pub fn output_shapes(&self) -> Vec<&ShapeRange> {
        self.outputs
            .iter()
            .filter_map(|v| self.value_shape(*v))
            .collect()
    }
}

impl fmt::Display for LoweredGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_lowered_graph(self))
    }
}

/// Progress of a single `convert` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvertState {
    Start,
    ValidatingInputs,
    ConvertingNodes { index: usize },
    Done,
    Failed(String),
}

impl ConvertState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConvertState::Done | ConvertState::Failed(_))
    }
}

struct Pass {
    state: ConvertState,
}

impl Pass {
    fn new() -> Self {
        Self {
            state: ConvertState::Start,
        }
    }

    fn advance(&mut self, next: ConvertState) {
        debug_assert!(!self.state.is_terminal(), "conversion already finished");
        trace!("convert: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn fail(&mut self, err: ConvertError) -> ConvertError {
        self.advance(ConvertState::Failed(err.to_string()));
        err
    }
}

/// Lowers graphs against a borrowed, read-only registry.
#[derive(Debug, Clone)]
pub struct Converter<'r> {
    registry: &'r Registry,
    options: ConvertOptions,
}

impl<'r> Converter<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            options: ConvertOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ConvertOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// Lower `graph` given one shape spec per graph input.
    pub fn convert(&self, graph: &Graph, specs: &[InputSpec]) -> Result<LoweredGraph, ConvertError> {
        let mut pass = Pass::new();
        match self.run(&mut pass, graph, specs) {
            Ok(lowered) => {
                pass.advance(ConvertState::Done);
                info!(
                    "lowered {} nodes using ops {:?}",
                    lowered.nodes.len(),
                    lowered.used_ops
                );
                Ok(lowered)
            }
            Err(err) => Err(pass.fail(err)),
        }
    }

    fn run(
        &self,
        pass: &mut Pass,
        graph: &Graph,
        specs: &[InputSpec],
    ) -> Result<LoweredGraph, ConvertError> {
        pass.advance(ConvertState::ValidatingInputs);
        let inputs = self.validate_inputs(graph, specs)?;
        let order = topological_order(graph)?;

        let mut lowered = LoweredGraph {
            inputs,
            nodes: Vec::with_capacity(order.len()),
            outputs: Vec::new(),
            used_ops: BTreeSet::new(),
        };
        let mut positions: BTreeMap<NodeId, usize> = BTreeMap::new();

        for (index, node) in order.into_iter().enumerate() {
            pass.advance(ConvertState::ConvertingNodes { index });
            let converted = self.convert_node(node, &lowered, &positions)?;
            debug!(
                "{} = {} -> {} {}",
                node.id, node.op, converted.op, converted.shape
            );
            positions.insert(node.id, lowered.nodes.len());
            lowered.used_ops.insert(node.op.clone());
            lowered.nodes.push(converted);
        }

        for (index, value) in graph.outputs.iter().enumerate() {
            if lowered.value_shape(*value).is_none() {
                return Err(GraphVerifyError::UndefinedOutput {
                    value: *value,
                    index,
                }
                .into());
            }
        }
        lowered.outputs = graph.outputs.clone();
        Ok(lowered)
    }

    fn validate_inputs(
        &self,
        graph: &Graph,
        specs: &[InputSpec],
    ) -> Result<Vec<LoweredInput>, ConvertError> {
        if specs.len() != graph.inputs.len() {
            return Err(ConvertError::ShapeArityMismatch {
                input: None,
                expected: graph.inputs.len(),
                found: specs.len(),
            });
        }

        graph
            .inputs
            .iter()
            .zip(specs)
            .enumerate()
            .map(|(idx, (input, spec))| {
                let shape = self.validate_spec(idx, input, spec)?;
                Ok(LoweredInput {
                    name: input.name.clone(),
                    dtype: input.dtype,
                    shape,
                })
            })
            .collect()
    }

    fn validate_spec(
        &self,
        idx: usize,
        input: &GraphInput,
        spec: &InputSpec,
    ) -> Result<ShapeRange, ConvertError> {
        let arity = |found| ConvertError::ShapeArityMismatch {
            input: Some(idx),
            expected: input.rank(),
            found,
        };
        let rank = spec.rank().map_err(|err| match err {
            ShapeError::RankMismatch { found, .. } => arity(found),
            _ => arity(0),
        })?;
        if rank != input.rank() {
            return Err(arity(rank));
        }
        let range = spec.to_range().map_err(|_| arity(rank))?;

        let invalid = |dim, reason: String| ConvertError::InvalidShapeRange {
            input: idx,
            dim,
            reason,
        };
        for (dim, (declared, bounds)) in input.shape.iter().zip(range.dims()).enumerate() {
            match declared {
                Dim::Static(n) => {
                    if bounds.static_extent() != Some(*n) {
                        return Err(invalid(
                            dim,
                            format!("declared static extent {n} but got {bounds}"),
                        ));
                    }
                }
                Dim::Dynamic => {
                    if !bounds.is_ordered() {
                        return Err(invalid(
                            dim,
                            format!("expected min <= opt <= max, got {bounds}"),
                        ));
                    }
                    if !self.options.allow_dynamic_shapes && !bounds.is_static() {
                        return Err(invalid(dim, "dynamic shapes are disabled".to_string()));
                    }
                }
            }
        }
        Ok(range)
    }

    fn convert_node(
        &self,
        node: &GraphNode,
        lowered: &LoweredGraph,
        positions: &BTreeMap<NodeId, usize>,
    ) -> Result<LoweredNode, ConvertError> {
        if self.options.disallows(&node.op) {
            return Err(ConvertError::unsupported_at(
                &node.op,
                node.id,
                "op is configured to run outside the engine",
            ));
        }
        let rule = self
            .registry
            .get(node.op.as_str())
            .ok_or_else(|| ConvertError::UnsupportedOperation {
                op: node.op.clone(),
                node: Some(node.id),
                reason: None,
            })?;

        if !rule.signature.arity.accepts(node.inputs.len()) {
            return Err(ConvertError::ArityMismatch {
                op: node.op.clone(),
                node: node.id,
                expected: rule.signature.arity.to_string(),
                found: node.inputs.len(),
            });
        }

        let mut ranges = Vec::with_capacity(node.inputs.len());
        let mut dtypes = Vec::with_capacity(node.inputs.len());
        for value in &node.inputs {
            let (dtype, range) = match value {
                ValueRef::Input(idx) => lowered.inputs.get(*idx).map(|i| (i.dtype, &i.shape)),
                ValueRef::Node(id) => positions
                    .get(id)
                    .map(|pos| &lowered.nodes[*pos])
                    .map(|n| (n.dtype, &n.shape)),
            }
            .ok_or(GraphVerifyError::UndefinedValue {
                value: *value,
                node: node.id,
            })?;
            if !rule.signature.accepts_dtype(dtype) || !self.options.allows_dtype(dtype) {
                return Err(ConvertError::UnsupportedDType {
                    op: node.op.clone(),
                    node: node.id,
                    dtype,
                });
            }
            ranges.push(range.clone());
            dtypes.push(dtype);
        }

        if !rule.supports_dynamic_shapes && ranges.iter().any(ShapeRange::is_dynamic) {
            return Err(ConvertError::unsupported_at(
                &node.op,
                node.id,
                "rule does not support dynamic shapes",
            ));
        }
        if let Some(check) = rule.capability {
            if !check(node) {
                return Err(ConvertError::unsupported_at(
                    &node.op,
                    node.id,
                    "rejected by the rule's capability check",
                ));
            }
        }

        let shape = propagate(rule, node, &ranges)?;
        let ctx = ConversionCtx {
            node,
            inputs: &ranges,
            dtypes: &dtypes,
        };
        let op = (rule.convert)(&ctx)?;

        let dtype = node.dtype.or_else(|| dtypes.first().copied()).ok_or_else(|| {
            ConvertError::unsupported_at(&node.op, node.id, "cannot infer the output dtype")
        })?;

        Ok(LoweredNode {
            source: node.id,
            source_op: node.op.clone(),
            op,
            inputs: node.inputs.clone(),
            dtype,
            shape,
        })
    }
}

/// Lower `graph` with the built-in registry and default options.
pub fn convert(graph: &Graph, specs: &[InputSpec]) -> Result<LoweredGraph, ConvertError> {
    Converter::new(default_registry()).convert(graph, specs)
}
