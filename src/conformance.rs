//! Dispatch test harness and the built-in conformance suite.
//!
//! A [`DispatchCase`] lowers a small graph and checks which source ops the
//! converter consumed, which it must not have consumed, and the output
//! ranges it produced. [`run_conformance`] runs the built-in cases.

use std::collections::BTreeSet;

use crate::graph::{unary_graph, Graph, GraphBuilder};
use crate::lower::{LoweredGraph, NativeOp};
use crate::ops::{aten, OpId, Registry};
use crate::pipeline::{compile_graph_with, CompileOptions};
use crate::shapes::{InputSpec, ShapeRange};
use crate::types::DType;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConformanceProfile {
    /// Static input shapes only.
    Static,
    /// Static and dynamic input shapes.
    Dynamic,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConformanceOptions {
    pub profile: ConformanceProfile,
}

#[derive(Debug, thiserror::Error)]
#[error("conformance failures: {0:?}")]
pub struct ConformanceFailure(pub Vec<String>);

#[derive(Debug, Clone)]
pub struct DispatchCase {
    pub name: String,
    pub graph: Graph,
    pub inputs: Vec<InputSpec>,
    pub options: CompileOptions,
    pub expected_ops: BTreeSet<OpId>,
    pub unexpected_ops: BTreeSet<OpId>,
    pub expected_outputs: Option<Vec<ShapeRange>>,
    pub expected_native: Option<NativeOp>,
    pub expected_error: Option<String>,
}

impl DispatchCase {
    pub fn new(name: impl Into<String>, graph: Graph, inputs: Vec<InputSpec>) -> Self {
        Self {
            name: name.into(),
            graph,
            inputs,
            options: CompileOptions::default(),
            expected_ops: BTreeSet::new(),
            unexpected_ops: BTreeSet::new(),
            expected_outputs: None,
            expected_native: None,
            expected_error: None,
        }
    }

    pub fn expect_ops<I, S>(mut self, ops: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OpId>,
    {
        self.expected_ops.extend(ops.into_iter().map(Into::into));
        self
    }

    pub fn forbid_ops<I, S>(mut self, ops: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OpId>,
    {
        self.unexpected_ops.extend(ops.into_iter().map(Into::into));
        self
    }

    pub fn expect_outputs(mut self, outputs: Vec<ShapeRange>) -> Self {
        self.expected_outputs = Some(outputs);
        self
    }

    /// The first lowered node must be exactly this layer.
    pub fn expect_native(mut self, op: NativeOp) -> Self {
        self.expected_native = Some(op);
        self
    }

    pub fn expect_error(mut self, fragment: impl Into<String>) -> Self {
        self.expected_error = Some(fragment.into());
        self
    }

    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    fn is_dynamic(&self) -> bool {
        self.inputs.iter().any(|spec| {
            spec.to_range()
                .map(|range| range.is_dynamic())
                .unwrap_or(false)
        })
    }
}

/// Lower the case and check every expectation it declares. Returns the
/// lowered graph on success, or `None` when the case expected a failure.
pub fn run_case(case: &DispatchCase, registry: &Registry) -> Result<Option<LoweredGraph>, String> {
    let products = match compile_graph_with(registry, &case.graph, &case.inputs, &case.options) {
        Ok(products) => products,
        Err(err) => {
            return match &case.expected_error {
                Some(expected) => {
                    let msg = err.to_string().to_lowercase();
                    if msg.contains(&expected.to_lowercase()) {
                        Ok(None)
                    } else {
                        Err(format!("expected error containing '{expected}', got {msg}"))
                    }
                }
                None => Err(format!("unexpected conversion error: {err}")),
            };
        }
    };

    if let Some(expected) = &case.expected_error {
        return Err(format!(
            "expected failure containing '{expected}' but conversion succeeded"
        ));
    }

    let lowered = products.lowered;
    let used = lowered.used_ops();

    if !case.expected_ops.is_empty() && used != &case.expected_ops {
        return Err(format!(
            "used ops mismatch. expected {:?}, got {:?}",
            names(&case.expected_ops),
            names(used)
        ));
    }

    let forbidden: BTreeSet<OpId> = used.intersection(&case.unexpected_ops).cloned().collect();
    if !forbidden.is_empty() {
        return Err(format!("unexpected ops were converted: {:?}", names(&forbidden)));
    }

    if let Some(expected) = &case.expected_outputs {
        let actual: Vec<ShapeRange> = lowered.output_shapes().into_iter().cloned().collect();
        if &actual != expected {
            return Err(format!(
                "output ranges mismatch. expected {}, got {}",
                render_ranges(expected),
                render_ranges(&actual)
            ));
        }
    }

    if let Some(expected) = &case.expected_native {
        match lowered.nodes.first() {
            Some(node) if node.op == *expected => {}
            Some(node) => {
                return Err(format!("expected native op {expected}, got {}", node.op));
            }
            None => return Err(format!("expected native op {expected}, graph is empty")),
        }
    }

    Ok(Some(lowered))
}

/// Static-shape dispatch check: every spec must be static.
pub fn run_test<I, S>(
    registry: &Registry,
    graph: Graph,
    inputs: Vec<InputSpec>,
    expected_ops: I,
) -> Result<LoweredGraph, String>
where
    I: IntoIterator<Item = S>,
    S: Into<OpId>,
{
    let case = DispatchCase::new("run_test", graph, inputs).expect_ops(expected_ops);
    if case.is_dynamic() {
        return Err("run_test expects static input specs".to_string());
    }
    run_case(&case, registry)?.ok_or_else(|| "conversion unexpectedly failed".to_string())
}

/// Dynamic-shape dispatch check: at least one spec must carry a range.
pub fn run_test_with_dynamic_shape<I, S>(
    registry: &Registry,
    graph: Graph,
    inputs: Vec<InputSpec>,
    expected_ops: I,
) -> Result<LoweredGraph, String>
where
    I: IntoIterator<Item = S>,
    S: Into<OpId>,
{
    let case = DispatchCase::new("run_test_with_dynamic_shape", graph, inputs)
        .expect_ops(expected_ops);
    if !case.is_dynamic() {
        return Err("run_test_with_dynamic_shape expects a dynamic input spec".to_string());
    }
    run_case(&case, registry)?.ok_or_else(|| "conversion unexpectedly failed".to_string())
}

pub fn run_conformance(
    registry: &Registry,
    opts: ConformanceOptions,
) -> Result<usize, ConformanceFailure> {
    let mut failures = Vec::new();
    let mut ran = 0usize;

    for case in builtin_cases() {
        if matches!(opts.profile, ConformanceProfile::Static) && case.is_dynamic() {
            continue;
        }
        ran += 1;
        if let Err(msg) = run_case(&case, registry) {
            failures.push(format!("{} => {msg}", case.name));
        }
    }

    if failures.is_empty() {
        Ok(ran)
    } else {
        Err(ConformanceFailure(failures))
    }
}

fn names(ops: &BTreeSet<OpId>) -> Vec<&str> {
    ops.iter().map(OpId::as_str).collect()
}

fn render_ranges(ranges: &[ShapeRange]) -> String {
    let parts: Vec<String> = ranges.iter().map(ToString::to_string).collect();
    format!("[{}]", parts.join(", "))
}

fn range(min: &[usize], opt: &[usize], max: &[usize]) -> ShapeRange {
    ShapeRange::from_bounds(min, opt, max).unwrap_or_default()
}

/// Built-in cases, static ones first.
pub fn builtin_cases() -> Vec<DispatchCase> {
    let binary = {
        let mut b = GraphBuilder::new();
        let x = b.input("x", DType::F32, &[2, 3]);
        let y = b.input("y", DType::F32, &[1, 3]);
        let z = b.node(aten::ADD, &[x, y]);
        let t = b.node(aten::TANH, &[z]);
        b.output(t);
        b.build()
    };

    vec![
        DispatchCase::new(
            "tanh",
            unary_graph(aten::TANH, DType::F32, &[1, 10]),
            vec![InputSpec::fixed([1, 10])],
        )
        .expect_ops([aten::TANH])
        .expect_outputs(vec![ShapeRange::from_static(&[1, 10])]),
        DispatchCase::new(
            "relu",
            unary_graph(aten::RELU, DType::F16, &[2, 4, 8]),
            vec![InputSpec::fixed([2, 4, 8])],
        )
        .expect_ops([aten::RELU])
        .forbid_ops([aten::TANH]),
        DispatchCase::new(
            "add_then_tanh",
            binary,
            vec![InputSpec::fixed([2, 3]), InputSpec::fixed([1, 3])],
        )
        .expect_ops([aten::ADD, aten::TANH])
        .expect_outputs(vec![ShapeRange::from_static(&[2, 3])]),
        DispatchCase::new(
            "unsupported_op",
            unary_graph("aten.erf.default", DType::F32, &[4]),
            vec![InputSpec::fixed([4])],
        )
        .expect_error("unsupported operation `aten.erf.default`"),
        DispatchCase::new(
            "tanh_with_dynamic_shape",
            unary_graph(aten::TANH, DType::F32, &[-1, -1, -1]),
            vec![InputSpec::dynamic([1, 1, 1], [1, 2, 3], [3, 3, 3])],
        )
        .expect_ops([aten::TANH])
        .expect_outputs(vec![range(&[1, 1, 1], &[1, 2, 3], &[3, 3, 3])]),
        DispatchCase::new(
            "tanh_with_dynamic_shape_four_dimensions",
            unary_graph(aten::TANH, DType::F32, &[-1, -1, -1, -1]),
            vec![InputSpec::dynamic([1, 1, 1, 5], [1, 2, 3, 5], [3, 3, 3, 5])],
        )
        .expect_ops([aten::TANH])
        .expect_outputs(vec![range(&[1, 1, 1, 5], &[1, 2, 3, 5], &[3, 3, 3, 5])]),
        DispatchCase::new(
            "tanh_rank_mismatch",
            unary_graph(aten::TANH, DType::F32, &[-1, -1, -1]),
            vec![InputSpec::dynamic([1, 1], [1, 2], [3, 3])],
        )
        .expect_error("input 0 spec has rank 2"),
        DispatchCase::new(
            "sigmoid_with_dynamic_shape",
            unary_graph(aten::SIGMOID, DType::F32, &[-1, 16]),
            vec![InputSpec::dynamic([1, 16], [8, 16], [32, 16])],
        )
        .expect_ops([aten::SIGMOID])
        .expect_outputs(vec![range(&[1, 16], &[8, 16], &[32, 16])]),
    ]
}
