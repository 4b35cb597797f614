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

use std::collections::BTreeSet;

use crate::graph::{topological_order, Graph, NodeId, ValueRef};

/// Structured errors returned by the graph verifier.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum GraphVerifyError {
    /// Two nodes share an id.
    #[error("duplicate definition for node {0}")]
    DuplicateDefinition(NodeId),
    /// A node refers to a value nobody defines.
    #[error("use of undefined value {value} by node {node}")]
    UndefinedValue { value: ValueRef, node: NodeId },
    /// An output refers to a value nobody defines.
    #[error("graph output {index} refers to undefined value {value}")]
    UndefinedOutput { value: ValueRef, index: usize },
    /// The graph returns nothing.
    #[error("graph has no outputs")]
    MissingOutput,
    /// Dependencies between the listed nodes form a cycle.
    #[error("dependency cycle through nodes {}", join_ids(.0))]
    Cycle(Vec<NodeId>),
}

fn join_ids(ids: &[NodeId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Verify that a [`Graph`] is well-formed.
///
/// Checks unique node ids, that every operand and output refers to a
/// declared input or an existing node, and that dependencies are acyclic.
/// It returns structured errors instead of panicking on invalid input.
pub fn verify_graph(graph: &Graph) -> Result<(), GraphVerifyError> {
    let mut defined: BTreeSet<NodeId> = BTreeSet::new();
    for node in &graph.nodes {
        if !defined.insert(node.id) {
            return Err(GraphVerifyError::DuplicateDefinition(node.id));
        }
    }

    let is_defined = |value: &ValueRef| match value {
        ValueRef::Input(idx) => *idx < graph.inputs.len(),
        ValueRef::Node(id) => defined.contains(id),
    };

    for node in &graph.nodes {
        if let Some(value) = node.inputs.iter().find(|v| !is_defined(*v)) {
            return Err(GraphVerifyError::UndefinedValue {
                value: *value,
                node: node.id,
            });
        }
    }

    if graph.outputs.is_empty() {
        return Err(GraphVerifyError::MissingOutput);
    }
    for (index, value) in graph.outputs.iter().enumerate() {
        if !is_defined(value) {
            return Err(GraphVerifyError::UndefinedOutput {
                value: *value,
                index,
            });
        }
    }

    topological_order(graph).map(|_| ())
}
