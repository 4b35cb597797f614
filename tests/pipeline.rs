use mind_lower::graph::{unary_graph, GraphVerifyError};
use mind_lower::ops::aten;
use mind_lower::pipeline::{compile_graph, CompileError, CompileOptions};
use mind_lower::{ConvertError, DType, GraphBuilder, InputSpec, NodeId, ValueRef};

#[test]
fn compiles_dynamic_tanh() {
    let graph = unary_graph(aten::TANH, DType::F32, &[-1, -1, -1]);
    let products = compile_graph(
        &graph,
        &[InputSpec::dynamic([1, 1, 1], [1, 2, 3], [3, 3, 3])],
        &CompileOptions::default(),
    )
    .expect("pipeline succeeds");

    let text = products.lowered.to_string();
    assert!(text.contains("activation.tanh %in0"), "{text}");
    assert!(text.contains("[1:1:3, 1:2:3, 1:3:3]"), "{text}");
    assert!(text.ends_with("}  // used = [aten.tanh.default]\n"), "{text}");
}

#[test]
fn malformed_graph_stops_before_conversion() {
    let mut b = GraphBuilder::new();
    let x = b.input("x", DType::F32, &[4]);
    b.node(aten::TANH, &[x]);
    let err = compile_graph(&b.build(), &[InputSpec::fixed([4])], &CompileOptions::default())
        .unwrap_err();

    assert!(matches!(
        err,
        CompileError::GraphVerify(GraphVerifyError::MissingOutput)
    ));
}

#[test]
fn undefined_operand_is_a_verify_error() {
    let mut b = GraphBuilder::new();
    b.input("x", DType::F32, &[4]);
    let y = b.node(aten::TANH, &[ValueRef::Node(NodeId(7))]);
    b.output(y);

    let err = compile_graph(&b.build(), &[InputSpec::fixed([4])], &CompileOptions::default())
        .unwrap_err();
    assert!(err.to_string().contains("undefined value %7"), "{err}");
}

#[test]
fn conversion_errors_are_wrapped() {
    let graph = unary_graph(aten::TANH, DType::Bool, &[4]);
    let err = compile_graph(&graph, &[InputSpec::fixed([4])], &CompileOptions::default())
        .unwrap_err();

    match err {
        CompileError::Convert(ConvertError::UnsupportedDType { dtype, .. }) => {
            assert_eq!(dtype, DType::Bool)
        }
        other => panic!("unexpected error: {other}"),
    }
}
