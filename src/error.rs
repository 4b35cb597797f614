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

use crate::graph::{GraphVerifyError, NodeId};
use crate::ops::OpId;
use crate::shapes::{DimRange, ShapeError};
use crate::types::DType;

/// Errors raised while registering rules or lowering a graph.
///
/// Every variant carries enough context (op id, node, input index,
/// dimension) to diagnose the failure without re-running the conversion.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConvertError {
    /// No rule is registered for the op, or the rule refused the node.
    #[error("unsupported operation `{op}`{}", site(.node, .reason))]
    UnsupportedOperation {
        op: OpId,
        node: Option<NodeId>,
        reason: Option<String>,
    },
    /// Wrong number of input specs (`input == None`) or wrong rank for one.
    #[error("{}", arity_message(.input, .expected, .found))]
    ShapeArityMismatch {
        input: Option<usize>,
        expected: usize,
        found: usize,
    },
    /// A declared input range violates `min <= opt <= max` or its declared shape.
    #[error("invalid shape range for input {input}, dim {dim}: {reason}")]
    InvalidShapeRange {
        input: usize,
        dim: usize,
        reason: String,
    },
    /// A rule produced an unordered output range.
    #[error("op `{op}` at node {node} produced inconsistent range {range} in dim {dim}")]
    ShapeRangeInconsistent {
        op: OpId,
        node: NodeId,
        dim: usize,
        range: DimRange,
    },
    /// The op id already has a rule.
    #[error("conversion rule for `{op}` is already registered")]
    DuplicateRegistration { op: OpId },
    /// The node has the wrong number of operands for its rule.
    #[error("op `{op}` at node {node} expects {expected} inputs but got {found}")]
    ArityMismatch {
        op: OpId,
        node: NodeId,
        expected: String,
        found: usize,
    },
    /// An operand's dtype is not accepted by the rule or by the options.
    #[error("op `{op}` at node {node} does not accept dtype {dtype}")]
    UnsupportedDType { op: OpId, node: NodeId, dtype: DType },
    /// An attribute is present but has the wrong type.
    #[error("op `{op}` at node {node}: attribute `{name}` {message}")]
    InvalidAttribute {
        op: OpId,
        node: NodeId,
        name: String,
        message: String,
    },
    /// Shape inference rejected the operands.
    #[error("shape inference failed for `{op}` at node {node}: {source}")]
    Shape {
        op: OpId,
        node: NodeId,
        #[source]
        source: ShapeError,
    },
    /// The graph itself is malformed.
    #[error(transparent)]
    Graph(#[from] GraphVerifyError),
}

impl ConvertError {
    pub fn unsupported(op: impl Into<OpId>) -> Self {
        ConvertError::UnsupportedOperation {
            op: op.into(),
            node: None,
            reason: None,
        }
    }

    pub fn unsupported_at(op: impl Into<OpId>, node: NodeId, reason: impl Into<String>) -> Self {
        ConvertError::UnsupportedOperation {
            op: op.into(),
            node: Some(node),
            reason: Some(reason.into()),
        }
    }

    /// Op id involved in the failure, when there is one.
    pub fn op(&self) -> Option<&OpId> {
        match self {
            ConvertError::UnsupportedOperation { op, .. }
            | ConvertError::ShapeRangeInconsistent { op, .. }
            | ConvertError::DuplicateRegistration { op }
            | ConvertError::ArityMismatch { op, .. }
            | ConvertError::UnsupportedDType { op, .. }
            | ConvertError::InvalidAttribute { op, .. }
            | ConvertError::Shape { op, .. } => Some(op),
            ConvertError::ShapeArityMismatch { .. }
            | ConvertError::InvalidShapeRange { .. }
            | ConvertError::Graph(_) => None,
        }
    }
}

fn site(node: &Option<NodeId>, reason: &Option<String>) -> String {
    match (node, reason) {
        (None, None) => String::new(),
        (Some(node), None) => format!(" at node {node}"),
        (None, Some(reason)) => format!(": {reason}"),
        (Some(node), Some(reason)) => format!(" at node {node}: {reason}"),
    }
}

fn arity_message(input: &Option<usize>, expected: &usize, found: &usize) -> String {
    match input {
        Some(idx) => format!("input {idx} spec has rank {found} but the graph declares rank {expected}"),
        None => format!("graph declares {expected} inputs but {found} specs were supplied"),
    }
}
