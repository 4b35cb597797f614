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

use crate::graph::{NodeId, ValueRef};
use crate::lower::LoweredGraph;
use crate::ops::OpId;

/// Structured errors returned by the lowered-graph verifier.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LoweredVerifyError {
    #[error("duplicate lowering of node {0}")]
    DuplicateDefinition(NodeId),
    #[error("use of undefined value {value} at lowered node {index}")]
    UseBeforeDefinition { value: ValueRef, index: usize },
    #[error("output {index} refers to undefined value {value}")]
    UndefinedOutput { value: ValueRef, index: usize },
    #[error("value {value} has an unordered range in dim {dim}")]
    UnorderedRange { value: ValueRef, dim: usize },
    #[error("used op set does not match the lowered nodes: recorded {recorded:?}, found {found:?}")]
    UsedOpsOutOfSync {
        recorded: BTreeSet<OpId>,
        found: BTreeSet<OpId>,
    },
}

/// Check that a [`LoweredGraph`] is ready for backend compilation.
///
/// Nodes must appear after every value they read, each source node is
/// lowered once, every range is ordered and the recorded used-op set
/// matches the nodes actually emitted.
pub fn verify_lowered(graph: &LoweredGraph) -> Result<(), LoweredVerifyError> {
    let mut defined: BTreeSet<ValueRef> = (0..graph.inputs.len()).map(ValueRef::Input).collect();

    for (idx, input) in graph.inputs.iter().enumerate() {
        if let Some(dim) = input.shape.first_unordered() {
            return Err(LoweredVerifyError::UnorderedRange {
                value: ValueRef::Input(idx),
                dim,
            });
        }
    }

    for (index, node) in graph.nodes.iter().enumerate() {
        if let Some(value) = node.inputs.iter().find(|v| !defined.contains(*v)) {
            return Err(LoweredVerifyError::UseBeforeDefinition {
                value: *value,
                index,
            });
        }
        let value = ValueRef::Node(node.source);
        if !defined.insert(value) {
            return Err(LoweredVerifyError::DuplicateDefinition(node.source));
        }
        if let Some(dim) = node.shape.first_unordered() {
            return Err(LoweredVerifyError::UnorderedRange { value, dim });
        }
    }

    for (index, value) in graph.outputs.iter().enumerate() {
        if !defined.contains(value) {
            return Err(LoweredVerifyError::UndefinedOutput {
                value: *value,
                index,
            });
        }
    }

    let found: BTreeSet<OpId> = graph.nodes.iter().map(|n| n.source_op.clone()).collect();
    if &found != graph.used_ops() {
        return Err(LoweredVerifyError::UsedOpsOutOfSync {
            recorded: graph.used_ops().clone(),
            found,
        });
    }

    Ok(())
}
