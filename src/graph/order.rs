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

use std::collections::{BTreeMap, BTreeSet};

use crate::graph::{Graph, GraphNode, GraphVerifyError, NodeId, ValueRef};

/// Order nodes so every node follows the nodes it reads from.
///
/// Kahn's algorithm with ready nodes taken smallest id first, so the order
/// is deterministic regardless of how the nodes were listed. References to
/// unknown nodes are reported as [`GraphVerifyError::UndefinedValue`], a
/// repeated node id as [`GraphVerifyError::DuplicateDefinition`].
pub fn topological_order(graph: &Graph) -> Result<Vec<&GraphNode>, GraphVerifyError> {
    let mut by_id: BTreeMap<NodeId, &GraphNode> = BTreeMap::new();
    for node in &graph.nodes {
        if by_id.insert(node.id, node).is_some() {
            return Err(GraphVerifyError::DuplicateDefinition(node.id));
        }
    }

    let mut pending: BTreeMap<NodeId, usize> = BTreeMap::new();
    let mut users: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
    for node in &graph.nodes {
        let mut deps = 0usize;
        for input in &node.inputs {
            if let ValueRef::Node(dep) = input {
                if !by_id.contains_key(dep) {
                    return Err(GraphVerifyError::UndefinedValue {
                        value: *input,
                        node: node.id,
                    });
                }
                users.entry(*dep).or_default().push(node.id);
                deps += 1;
            }
        }
        pending.insert(node.id, deps);
    }

    let mut ready: BTreeSet<NodeId> = pending
        .iter()
        .filter(|(_, deps)| **deps == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut order = Vec::with_capacity(graph.nodes.len());

    while let Some(id) = ready.pop_first() {
        order.push(by_id[&id]);
        for user in users.get(&id).into_iter().flatten() {
            if let Some(deps) = pending.get_mut(user) {
                *deps -= 1;
                if *deps == 0 {
                    ready.insert(*user);
                }
            }
        }
    }

    if order.len() != pending.len() {
        let placed: BTreeSet<NodeId> = order.iter().map(|n| n.id).collect();
        let stuck = pending.keys().filter(|id| !placed.contains(id)).copied().collect();
        return Err(GraphVerifyError::Cycle(stuck));
    }

    Ok(order)
}
