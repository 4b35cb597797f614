use std::collections::BTreeMap;

use mind_lower::graph::{unary_graph, AttrValue, GraphNode, GraphVerifyError};
use mind_lower::lower::{ActivationKind, ElementWiseKind, NativeOp};
use mind_lower::ops::{aten, Arity, ConversionCtx, ConversionRule, OpSignature};
use mind_lower::shapes::engine::{broadcast_ranges, ShapeRule, ShapeRuleKind};
use mind_lower::shapes::{DimRange, ShapeError};
use mind_lower::{
    convert, ConvertError, ConvertOptions, Converter, DType, Graph, GraphBuilder, InputSpec,
    NodeId, OpId, Registry, ShapeRange, ValueRef,
};

fn range(min: &[usize], opt: &[usize], max: &[usize]) -> ShapeRange {
    ShapeRange::from_bounds(min, opt, max).expect("ordered range")
}

fn attrs(pairs: &[(&str, AttrValue)]) -> BTreeMap<String, AttrValue> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn unary_with_attrs(op: &str, declared: &[i64], attrs: BTreeMap<String, AttrValue>) -> Graph {
    let mut b = GraphBuilder::new();
    let x = b.input("x", DType::F32, declared);
    let y = b.node_with_attrs(op, &[x], attrs);
    b.output(y);
    b.build()
}

fn binary_graph(op: &str, lhs: &[i64], rhs: &[i64]) -> Graph {
    let mut b = GraphBuilder::new();
    let x = b.input("x", DType::F32, lhs);
    let y = b.input("y", DType::F32, rhs);
    let z = b.node(op, &[x, y]);
    b.output(z);
    b.build()
}

fn passthrough(_: &ConversionCtx<'_>) -> Result<NativeOp, ConvertError> {
    Ok(NativeOp::Identity)
}

fn test_signature(name: &'static str) -> OpSignature {
    OpSignature {
        name,
        arity: Arity::Fixed(1),
        allowed_dtypes: &[],
        summary: "test rule",
    }
}

#[test]
fn input_count_mismatch() {
    let graph = unary_graph(aten::TANH, DType::F32, &[1, 10]);
    let err = convert(
        &graph,
        &[InputSpec::fixed([1, 10]), InputSpec::fixed([1, 10])],
    )
    .unwrap_err();

    assert_eq!(
        err,
        ConvertError::ShapeArityMismatch {
            input: None,
            expected: 1,
            found: 2
        }
    );
}

#[test]
fn spec_rank_mismatch_names_the_input() {
    let graph = unary_graph(aten::TANH, DType::F32, &[-1, -1, -1]);
    let err = convert(&graph, &[InputSpec::dynamic([1, 1], [1, 2], [3, 3])]).unwrap_err();

    assert_eq!(
        err,
        ConvertError::ShapeArityMismatch {
            input: Some(0),
            expected: 3,
            found: 2
        }
    );
}

#[test]
fn dynamic_tuples_of_different_rank_are_rejected() {
    let graph = unary_graph(aten::TANH, DType::F32, &[-1, -1]);
    let err = convert(&graph, &[InputSpec::dynamic([1, 1], [1, 2, 3], [3, 3])]).unwrap_err();
    assert!(matches!(
        err,
        ConvertError::ShapeArityMismatch { input: Some(0), .. }
    ));
}

#[test]
fn unordered_input_range_is_invalid() {
    let graph = unary_graph(aten::TANH, DType::F32, &[-1, -1]);
    let err = convert(&graph, &[InputSpec::dynamic([3, 1], [1, 1], [3, 3])]).unwrap_err();

    match err {
        ConvertError::InvalidShapeRange { input, dim, reason } => {
            assert_eq!((input, dim), (0, 0));
            assert!(reason.contains("min <= opt <= max"), "{reason}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn opt_above_max_is_invalid() {
    let graph = unary_graph(aten::TANH, DType::F32, &[-1, -1]);
    let err = convert(&graph, &[InputSpec::dynamic([1, 1], [1, 4], [3, 3])]).unwrap_err();
    assert!(matches!(
        err,
        ConvertError::InvalidShapeRange { input: 0, dim: 1, .. }
    ));
}

#[test]
fn spec_must_match_declared_static_dims() {
    let graph = unary_graph(aten::TANH, DType::F32, &[1, 10]);
    let err = convert(&graph, &[InputSpec::fixed([1, 11])]).unwrap_err();
    assert!(matches!(
        err,
        ConvertError::InvalidShapeRange { input: 0, dim: 1, .. }
    ));

    let graph = unary_graph(aten::TANH, DType::F32, &[-1, 5]);
    let err = convert(&graph, &[InputSpec::dynamic([1, 1], [2, 5], [3, 5])]).unwrap_err();
    assert!(matches!(
        err,
        ConvertError::InvalidShapeRange { input: 0, dim: 1, .. }
    ));
}

#[test]
fn dynamic_shapes_can_be_disabled() {
    let graph = unary_graph(aten::TANH, DType::F32, &[-1, -1, -1]);
    let registry = Registry::with_defaults();
    let converter = Converter::new(&registry).with_options(ConvertOptions {
        allow_dynamic_shapes: false,
        ..ConvertOptions::default()
    });

    let err = converter
        .convert(&graph, &[InputSpec::dynamic([1, 1, 1], [1, 2, 3], [3, 3, 3])])
        .unwrap_err();
    assert!(err.to_string().contains("dynamic shapes are disabled"), "{err}");

    // A static spec still passes through a dynamic declaration.
    let lowered = converter
        .convert(&graph, &[InputSpec::fixed([1, 2, 3])])
        .expect("static spec converts");
    assert_eq!(lowered.output_shapes()[0].to_static(), Some(vec![1, 2, 3]));
}

#[test]
fn unknown_op_is_unsupported_at_its_node() {
    let graph = unary_graph("aten.erf.default", DType::F32, &[4]);
    let err = convert(&graph, &[InputSpec::fixed([4])]).unwrap_err();

    assert_eq!(
        err,
        ConvertError::UnsupportedOperation {
            op: OpId::from("aten.erf.default"),
            node: Some(NodeId(0)),
            reason: None,
        }
    );
}

#[test]
fn failure_late_in_the_graph_returns_no_partial_result() {
    let mut b = GraphBuilder::new();
    let x = b.input("x", DType::F32, &[4]);
    let t = b.node(aten::TANH, &[x]);
    let e = b.node("aten.erf.default", &[t]);
    b.output(e);

    let err = convert(&b.build(), &[InputSpec::fixed([4])]).unwrap_err();
    assert_eq!(err.op().map(OpId::as_str), Some("aten.erf.default"));
}

#[test]
fn disallowed_ops_are_not_converted() {
    let graph = unary_graph(aten::TANH, DType::F32, &[4]);
    let registry = Registry::with_defaults();
    let mut options = ConvertOptions::default();
    options.disallowed_ops.insert(OpId::from(aten::TANH));

    let err = Converter::new(&registry)
        .with_options(options)
        .convert(&graph, &[InputSpec::fixed([4])])
        .unwrap_err();
    assert!(matches!(
        err,
        ConvertError::UnsupportedOperation { node: Some(NodeId(0)), .. }
    ));
}

#[test]
fn integer_tanh_is_rejected() {
    let graph = unary_graph(aten::TANH, DType::I32, &[4]);
    let err = convert(&graph, &[InputSpec::fixed([4])]).unwrap_err();
    assert_eq!(
        err,
        ConvertError::UnsupportedDType {
            op: OpId::from(aten::TANH),
            node: NodeId(0),
            dtype: DType::I32,
        }
    );
}

#[test]
fn enabled_precisions_restrict_dtypes() {
    let registry = Registry::with_defaults();
    let options = ConvertOptions {
        enabled_precisions: [DType::F16].into_iter().collect(),
        ..ConvertOptions::default()
    };
    let converter = Converter::new(&registry).with_options(options);

    let f32_graph = unary_graph(aten::TANH, DType::F32, &[4]);
    assert!(matches!(
        converter.convert(&f32_graph, &[InputSpec::fixed([4])]),
        Err(ConvertError::UnsupportedDType { dtype: DType::F32, .. })
    ));

    let f16_graph = unary_graph(aten::TANH, DType::F16, &[4]);
    let lowered = converter
        .convert(&f16_graph, &[InputSpec::fixed([4])])
        .expect("f16 is enabled");
    assert_eq!(lowered.nodes[0].dtype, DType::F16);
}

#[test]
fn wrong_operand_count_is_an_arity_mismatch() {
    let graph = binary_graph(aten::TANH, &[4], &[4]);
    let err = convert(&graph, &[InputSpec::fixed([4]), InputSpec::fixed([4])]).unwrap_err();
    assert_eq!(
        err,
        ConvertError::ArityMismatch {
            op: OpId::from(aten::TANH),
            node: NodeId(0),
            expected: "1".to_string(),
            found: 2,
        }
    );
}

#[test]
fn static_only_rule_rejects_dynamic_inputs() {
    let mut registry = Registry::new();
    registry
        .register(
            ConversionRule::new(
                test_signature("custom.fixed.default"),
                ShapeRuleKind::ElementwiseUnary.into(),
                passthrough,
            )
            .static_shapes_only(),
        )
        .expect("registers");
    let converter = Converter::new(&registry);

    let graph = unary_graph("custom.fixed.default", DType::F32, &[-1, 4]);
    let err = converter
        .convert(&graph, &[InputSpec::dynamic([1, 4], [2, 4], [8, 4])])
        .unwrap_err();
    assert!(err.to_string().contains("dynamic shapes"), "{err}");

    converter
        .convert(&graph, &[InputSpec::fixed([2, 4])])
        .expect("static spec is fine");
}

fn backwards_range(_: &GraphNode, _: &[ShapeRange]) -> Result<ShapeRange, ShapeError> {
    Ok(ShapeRange::new(vec![DimRange::fixed(2), DimRange::new(5, 2, 3)]))
}

#[test]
fn inconsistent_custom_range_is_reported() {
    let mut registry = Registry::new();
    registry
        .register(ConversionRule::new(
            test_signature("custom.broken.default"),
            ShapeRule::Custom(backwards_range),
            passthrough,
        ))
        .expect("registers");

    let graph = unary_graph("custom.broken.default", DType::F32, &[2, 3]);
    let err = Converter::new(&registry)
        .convert(&graph, &[InputSpec::fixed([2, 3])])
        .unwrap_err();

    assert_eq!(
        err,
        ConvertError::ShapeRangeInconsistent {
            op: OpId::from("custom.broken.default"),
            node: NodeId(0),
            dim: 1,
            range: DimRange::new(5, 2, 3),
        }
    );
}

#[test]
fn conversion_is_idempotent_across_registries() {
    let _ = env_logger::builder().is_test(true).try_init();
    let graph = unary_graph(aten::TANH, DType::F32, &[-1, -1, -1]);
    let specs = [InputSpec::dynamic([1, 1, 1], [1, 2, 3], [3, 3, 3])];

    let first_registry = Registry::with_defaults();
    let second_registry = Registry::with_defaults();
    let first = Converter::new(&first_registry)
        .convert(&graph, &specs)
        .expect("first conversion");
    let second = Converter::new(&second_registry)
        .convert(&graph, &specs)
        .expect("second conversion");

    assert_eq!(first, second);
    assert_eq!(first.to_string(), second.to_string());
    assert_eq!(first.used_ops(), second.used_ops());
}

#[test]
fn nodes_listed_out_of_order_follow_dependencies() {
    let mut b = GraphBuilder::new();
    let x = b.input("x", DType::F32, &[2, 3]);
    let t = b.node(aten::TANH, &[x]);
    let r = b.node(aten::RELU, &[t]);
    b.output(r);
    let mut graph = b.build();
    graph.nodes.reverse();

    let lowered = convert(&graph, &[InputSpec::fixed([2, 3])]).expect("converts");
    let sources: Vec<NodeId> = lowered.nodes.iter().map(|n| n.source).collect();
    assert_eq!(sources, vec![NodeId(0), NodeId(1)]);
    assert_eq!(lowered.outputs, vec![ValueRef::Node(NodeId(1))]);
}

#[test]
fn cyclic_graph_is_rejected() {
    let mut b = GraphBuilder::new();
    let x = b.input("x", DType::F32, &[4]);
    b.node(aten::ADD, &[x, ValueRef::Node(NodeId(1))]);
    let t = b.node(aten::TANH, &[ValueRef::Node(NodeId(0))]);
    b.output(t);

    let err = convert(&b.build(), &[InputSpec::fixed([4])]).unwrap_err();
    assert!(matches!(err, ConvertError::Graph(_)), "{err}");
    assert!(err.to_string().contains("cycle"), "{err}");
}

#[test]
fn duplicate_node_ids_are_rejected_before_conversion() {
    let mut b = GraphBuilder::new();
    let x = b.input("x", DType::F32, &[4]);
    let r = b.node(aten::RELU, &[x]);
    let t = b.node(aten::TANH, &[r]);
    b.output(t);
    let mut graph = b.build();
    let mut twin = graph.nodes[1].clone();
    twin.op = OpId::from(aten::SIGMOID);
    graph.nodes.push(twin);

    let err = convert(&graph, &[InputSpec::fixed([4])]).unwrap_err();
    assert_eq!(
        err,
        ConvertError::Graph(GraphVerifyError::DuplicateDefinition(NodeId(1)))
    );
}

#[test]
fn duplicate_id_does_not_hide_an_unsupported_node() {
    for ops in [[aten::TANH, "aten.erf.default"], ["aten.erf.default", aten::TANH]] {
        let mut b = GraphBuilder::new();
        let x = b.input("x", DType::F32, &[4]);
        let first = b.node(ops[0], &[x]);
        b.output(first);
        let mut graph = b.build();
        let mut twin = graph.nodes[0].clone();
        twin.op = OpId::from(ops[1]);
        graph.nodes.push(twin);

        let err = Converter::new(&Registry::with_defaults())
            .convert(&graph, &[InputSpec::fixed([4])])
            .unwrap_err();
        assert_eq!(
            err,
            ConvertError::Graph(GraphVerifyError::DuplicateDefinition(NodeId(0))),
            "{ops:?}"
        );
    }
}

#[test]
fn leaky_relu_reads_negative_slope() {
    let graph = unary_with_attrs(
        aten::LEAKY_RELU,
        &[8],
        attrs(&[("negative_slope", AttrValue::Float(0.2))]),
    );
    let lowered = convert(&graph, &[InputSpec::fixed([8])]).expect("converts");
    assert_eq!(
        lowered.nodes[0].op,
        NativeOp::Activation {
            kind: ActivationKind::LeakyRelu,
            alpha: 0.2,
            beta: 0.0,
        }
    );

    let graph = unary_graph(aten::LEAKY_RELU, DType::F32, &[8]);
    let lowered = convert(&graph, &[InputSpec::fixed([8])]).expect("converts");
    assert_eq!(
        lowered.nodes[0].op,
        NativeOp::Activation {
            kind: ActivationKind::LeakyRelu,
            alpha: 0.01,
            beta: 0.0,
        }
    );
}

#[test]
fn mistyped_attribute_is_reported() {
    let graph = unary_with_attrs(
        aten::LEAKY_RELU,
        &[8],
        attrs(&[("negative_slope", AttrValue::Str("steep".into()))]),
    );
    let err = convert(&graph, &[InputSpec::fixed([8])]).unwrap_err();
    match err {
        ConvertError::InvalidAttribute { name, .. } => assert_eq!(name, "negative_slope"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn hardtanh_lowers_to_clip() {
    let graph = unary_with_attrs(
        aten::HARDTANH,
        &[-1, 4],
        attrs(&[
            ("min_val", AttrValue::Float(0.0)),
            ("max_val", AttrValue::Int(6)),
        ]),
    );
    let lowered = convert(&graph, &[InputSpec::dynamic([1, 4], [2, 4], [4, 4])]).expect("converts");
    assert_eq!(
        lowered.nodes[0].op,
        NativeOp::Activation {
            kind: ActivationKind::Clip,
            alpha: 0.0,
            beta: 6.0,
        }
    );
}

#[test]
fn hardtanh_with_inverted_bounds_fails_capability_check() {
    let graph = unary_with_attrs(
        aten::HARDTANH,
        &[4],
        attrs(&[
            ("min_val", AttrValue::Float(2.0)),
            ("max_val", AttrValue::Float(1.0)),
        ]),
    );
    let err = convert(&graph, &[InputSpec::fixed([4])]).unwrap_err();
    assert!(err.to_string().contains("capability"), "{err}");
}

#[test]
fn add_broadcasts_static_shapes() {
    let graph = binary_graph(aten::ADD, &[2, 3], &[3]);
    let lowered = convert(&graph, &[InputSpec::fixed([2, 3]), InputSpec::fixed([3])])
        .expect("converts");

    assert_eq!(
        lowered.nodes[0].op,
        NativeOp::ElementWise {
            kind: ElementWiseKind::Sum
        }
    );
    assert_eq!(lowered.output_shapes()[0].to_static(), Some(vec![2, 3]));
}

#[test]
fn mul_intersects_dynamic_ranges() {
    let graph = binary_graph(aten::MUL, &[-1, 8], &[-1, 8]);
    let lowered = convert(
        &graph,
        &[
            InputSpec::dynamic([2, 8], [4, 8], [8, 8]),
            InputSpec::dynamic([4, 8], [6, 8], [16, 8]),
        ],
    )
    .expect("overlapping ranges broadcast");

    assert_eq!(lowered.output_shapes()[0], &range(&[4, 8], &[6, 8], &[8, 8]));
}

#[test]
fn incompatible_broadcast_is_a_shape_error() {
    let graph = binary_graph(aten::ADD, &[2, 3], &[4, 3]);
    let err = convert(&graph, &[InputSpec::fixed([2, 3]), InputSpec::fixed([4, 3])]).unwrap_err();
    match err {
        ConvertError::Shape { op, source, .. } => {
            assert_eq!(op.as_str(), aten::ADD);
            assert!(matches!(source, ShapeError::BroadcastIncompatible { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn scaled_add_is_unsupported() {
    let mut b = GraphBuilder::new();
    let x = b.input("x", DType::F32, &[4]);
    let y = b.input("y", DType::F32, &[4]);
    let z = b.node_with_attrs(aten::ADD, &[x, y], attrs(&[("alpha", AttrValue::Int(2))]));
    b.output(z);

    let err = convert(&b.build(), &[InputSpec::fixed([4]), InputSpec::fixed([4])]).unwrap_err();
    assert!(matches!(err, ConvertError::UnsupportedOperation { .. }));
}

#[test]
fn traced_dtype_annotation_wins() {
    let mut graph = unary_graph(aten::CLONE, DType::I64, &[3]);
    graph.nodes[0].dtype = Some(DType::I32);

    let lowered = convert(&graph, &[InputSpec::fixed([3])]).expect("converts");
    assert_eq!(lowered.nodes[0].op, NativeOp::Identity);
    assert_eq!(lowered.value_dtype(ValueRef::Node(NodeId(0))), Some(DType::I32));
    assert_eq!(lowered.value_dtype(ValueRef::Input(0)), Some(DType::I64));
}

fn broadcast_all(_: &GraphNode, inputs: &[ShapeRange]) -> Result<ShapeRange, ShapeError> {
    let (first, rest) = inputs.split_first().ok_or(ShapeError::RankMismatch {
        expected: 2,
        found: 0,
    })?;
    rest.iter()
        .try_fold(first.clone(), |acc, next| broadcast_ranges(&acc, next))
}

fn convert_sum(_: &ConversionCtx<'_>) -> Result<NativeOp, ConvertError> {
    Ok(NativeOp::ElementWise {
        kind: ElementWiseKind::Sum,
    })
}

#[test]
fn variadic_rule_accepts_any_count_above_its_minimum() {
    let mut registry = Registry::new();
    registry
        .register(ConversionRule::new(
            OpSignature {
                name: "custom.sum_n.default",
                arity: Arity::Variadic { min: 2 },
                allowed_dtypes: DType::FLOATS,
                summary: "sum of any number of tensors",
            },
            ShapeRule::Custom(broadcast_all),
            convert_sum,
        ))
        .expect("registers");
    let converter = Converter::new(&registry);

    let mut b = GraphBuilder::new();
    let x = b.input("x", DType::F32, &[-1, 8]);
    let y = b.input("y", DType::F32, &[1, 8]);
    let z = b.input("z", DType::F32, &[8]);
    let s = b.node("custom.sum_n.default", &[x, y, z]);
    b.output(s);
    let specs = [
        InputSpec::dynamic([1, 8], [4, 8], [16, 8]),
        InputSpec::fixed([1, 8]),
        InputSpec::fixed([8]),
    ];
    let lowered = converter.convert(&b.build(), &specs).expect("three operands convert");
    assert_eq!(lowered.output_shapes()[0], &range(&[1, 8], &[4, 8], &[16, 8]));

    let mut b = GraphBuilder::new();
    let x = b.input("x", DType::F32, &[8]);
    let s = b.node("custom.sum_n.default", &[x]);
    b.output(s);
    let err = converter
        .convert(&b.build(), &[InputSpec::fixed([8])])
        .unwrap_err();
    assert_eq!(
        err,
        ConvertError::ArityMismatch {
            op: OpId::from("custom.sum_n.default"),
            node: NodeId(0),
            expected: "2+".to_string(),
            found: 1,
        }
    );
}
