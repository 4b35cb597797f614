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

//! Traced computation graphs handed to the converter.
//!
//! The tracing front end produces a [`Graph`]: declared inputs, a list of
//! [`GraphNode`]s in any order, and the values returned by the program.
//! Nodes refer to their operands through [`ValueRef`]s.

mod order;
mod verify;

pub use order::topological_order;
pub use verify::{verify_graph, GraphVerifyError};

use std::collections::BTreeMap;
use std::fmt;

use crate::ops::OpId;
use crate::shapes::Dim;
use crate::types::DType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Operand reference: a graph input by position, or another node's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueRef {
    Input(usize),
    Node(NodeId),
}

impl fmt::Display for ValueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueRef::Input(idx) => write!(f, "%in{idx}"),
            ValueRef::Node(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Ints(Vec<i64>),
}

impl AttrValue {
    /// Numeric view; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Float(v) => Some(*v),
            AttrValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            AttrValue::Int(_) => "int",
            AttrValue::Float(_) => "float",
            AttrValue::Bool(_) => "bool",
            AttrValue::Str(_) => "str",
            AttrValue::Ints(_) => "int[]",
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Int(v) => write!(f, "{v}"),
            AttrValue::Float(v) => write!(f, "{v:?}"),
            AttrValue::Bool(v) => write!(f, "{v}"),
            AttrValue::Str(v) => write!(f, "{v:?}"),
            AttrValue::Ints(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

/// A declared graph input (placeholder) with its traced shape.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphInput {
    pub name: String,
    pub dtype: DType,
    pub shape: Vec<Dim>,
}

impl GraphInput {
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn is_dynamic(&self) -> bool {
        self.shape.iter().any(|d| d.is_dynamic())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub id: NodeId,
    pub op: OpId,
    pub inputs: Vec<ValueRef>,
    pub attrs: BTreeMap<String, AttrValue>,
    /// Output dtype recorded by the tracer, if any.
    pub dtype: Option<DType>,
}

impl GraphNode {
    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.get(name)
    }

    /// Reads a numeric attribute, falling back to `default` when absent.
    pub fn attr_f64_or(&self, name: &str, default: f64) -> Result<f64, String> {
        match self.attrs.get(name) {
            None => Ok(default),
            Some(value) => value
                .as_f64()
                .ok_or_else(|| format!("expected a number, found {}", value.kind())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Graph {
    pub inputs: Vec<GraphInput>,
    pub nodes: Vec<GraphNode>,
    pub outputs: Vec<ValueRef>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Distinct op ids appearing in the graph.
    pub fn op_ids(&self) -> Vec<&OpId> {
        let mut ops: Vec<&OpId> = self.nodes.iter().map(|n| &n.op).collect();
        ops.sort();
        ops.dedup();
        ops
    }
}

/// Incremental constructor for [`Graph`], assigning node ids in order.
///
/// # Example
/// ```
/// use mind_lower::graph::GraphBuilder;
/// use mind_lower::types::DType;
///
/// let mut b = GraphBuilder::new();
/// let x = b.input("x", DType::F32, &[-1, -1, -1]);
/// let y = b.node("aten.tanh.default", &[x]);
/// b.output(y);
/// let graph = b.build();
/// assert_eq!(graph.nodes.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct GraphBuilder {
    graph: Graph,
    next_id: usize,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an input; negative extents are dynamic.
    pub fn input(&mut self, name: impl Into<String>, dtype: DType, shape: &[i64]) -> ValueRef {
        let idx = self.graph.inputs.len();
        self.graph.inputs.push(GraphInput {
            name: name.into(),
            dtype,
            shape: shape.iter().copied().map(Dim::from_declared).collect(),
        });
        ValueRef::Input(idx)
    }

    pub fn node(&mut self, op: impl Into<OpId>, inputs: &[ValueRef]) -> ValueRef {
        self.node_with_attrs(op, inputs, BTreeMap::new())
    }

    pub fn node_with_attrs(
        &mut self,
        op: impl Into<OpId>,
        inputs: &[ValueRef],
        attrs: BTreeMap<String, AttrValue>,
    ) -> ValueRef {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.graph.nodes.push(GraphNode {
            id,
            op: op.into(),
            inputs: inputs.to_vec(),
            attrs,
            dtype: None,
        });
        ValueRef::Node(id)
    }

    pub fn output(&mut self, value: ValueRef) {
        self.graph.outputs.push(value);
    }

    pub fn build(self) -> Graph {
        self.graph
    }
}

/// Graph of one unary op applied to a single input, e.g. `tanh(x)`.
pub fn unary_graph(op: impl Into<OpId>, dtype: DType, declared: &[i64]) -> Graph {
    let mut b = GraphBuilder::new();
    let x = b.input("x", dtype, declared);
    let y = b.node(op, &[x]);
    b.output(y);
    b.build()
}
