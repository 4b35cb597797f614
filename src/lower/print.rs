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

use std::fmt::Write;

use crate::graph::ValueRef;
use crate::lower::{LoweredGraph, LoweredNode};

/// Format a [`LoweredGraph`] into a stable, human-readable string.
pub fn format_lowered_graph(graph: &LoweredGraph) -> String {
    let mut out = String::new();
    writeln!(&mut out, "engine {{").expect("write to string cannot fail");
    for (idx, input) in graph.inputs.iter().enumerate() {
        writeln!(
            &mut out,
            "  {} = input {:?} {} {}",
            ValueRef::Input(idx),
            input.name,
            input.dtype,
            input.shape
        )
        .expect("write to string cannot fail");
    }
    for node in &graph.nodes {
        format_node(node, &mut out);
    }
    let outputs: Vec<String> = graph.outputs.iter().map(ToString::to_string).collect();
    writeln!(&mut out, "  return {}", outputs.join(", ")).expect("write to string cannot fail");
    let used: Vec<&str> = graph.used_ops().iter().map(|op| op.as_str()).collect();
    writeln!(&mut out, "}}  // used = [{}]", used.join(", ")).expect("write to string cannot fail");
    out
}

fn format_node(node: &LoweredNode, out: &mut String) {
    let operands: Vec<String> = node.inputs.iter().map(ToString::to_string).collect();
    writeln!(
        out,
        "  {} = {} {} : {} {}  // {}",
        ValueRef::Node(node.source),
        node.op,
        operands.join(", "),
        node.dtype,
        node.shape,
        node.source_op
    )
    .expect("write to string cannot fail");
}
