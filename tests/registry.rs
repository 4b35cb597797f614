use mind_lower::lower::{ActivationKind, NativeOp};
use mind_lower::ops::{aten, Arity, ConversionCtx, ConversionRule, OpSignature};
use mind_lower::shapes::engine::ShapeRuleKind;
use mind_lower::{default_registry, ConvertError, OpId, Registry};

fn convert_noop(_: &ConversionCtx<'_>) -> Result<NativeOp, ConvertError> {
    Ok(NativeOp::Identity)
}

fn custom_rule(name: &'static str) -> ConversionRule {
    ConversionRule::new(
        OpSignature {
            name,
            arity: Arity::Fixed(1),
            allowed_dtypes: &[],
            summary: "test rule",
        },
        ShapeRuleKind::ElementwiseUnary.into(),
        convert_noop,
    )
}

#[test]
fn defaults_include_tanh() {
    let registry = Registry::with_defaults();
    let rule = registry.lookup(aten::TANH).expect("tanh is registered");

    assert_eq!(rule.name(), "aten.tanh.default");
    assert_eq!(rule.signature.arity, Arity::Fixed(1));
    assert!(rule.supports_dynamic_shapes);
    assert!(registry.contains(aten::ADD));
}

#[test]
fn default_registry_is_shared() {
    let a = default_registry();
    let b = default_registry();
    assert!(std::ptr::eq(a, b));
    assert_eq!(a.len(), Registry::with_defaults().len());
}

#[test]
fn duplicate_registration_is_rejected() {
    let mut registry = Registry::with_defaults();
    let before = registry.len();

    let err = registry.register(custom_rule(aten::TANH)).unwrap_err();
    assert_eq!(
        err,
        ConvertError::DuplicateRegistration {
            op: OpId::from(aten::TANH)
        }
    );
    assert_eq!(registry.len(), before);

    // The original rule survives.
    let tanh = registry.get(aten::TANH).expect("tanh still registered");
    assert_eq!(tanh.signature.summary, "Hyperbolic tangent activation.");
}

#[test]
fn unknown_lookup_names_the_op() {
    let registry = Registry::with_defaults();
    let err = registry.lookup("aten.erf.default").unwrap_err();

    assert_eq!(err.op().map(OpId::as_str), Some("aten.erf.default"));
    assert!(err.to_string().contains("aten.erf.default"));
}

#[test]
fn overloads_are_distinct_ids() {
    let mut registry = Registry::new();
    registry
        .register(custom_rule("aten.tanh.out"))
        .expect("fresh id registers");

    assert!(registry.contains("aten.tanh.out"));
    assert!(!registry.contains(aten::TANH));
}

#[test]
fn custom_rules_are_used_by_the_converter() {
    let mut registry = Registry::new();
    registry
        .register(custom_rule("custom.swish.default"))
        .expect("registers");

    let graph = mind_lower::graph::unary_graph("custom.swish.default", mind_lower::DType::F32, &[4]);
    let lowered = mind_lower::Converter::new(&registry)
        .convert(&graph, &[mind_lower::InputSpec::fixed([4])])
        .expect("custom rule converts");

    assert_eq!(lowered.nodes[0].op, NativeOp::Identity);
    assert_ne!(
        lowered.nodes[0].op,
        NativeOp::activation(ActivationKind::Tanh)
    );
}

#[test]
fn iteration_is_sorted_by_op_id() {
    let registry = Registry::with_defaults();
    let ids: Vec<&str> = registry.iter().map(|(op, _)| op.as_str()).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted);
    assert!(!registry.is_empty());
}

#[test]
fn shared_registry_serves_concurrent_conversions() {
    let registry = default_registry();
    let dynamic = mind_lower::graph::unary_graph(aten::TANH, mind_lower::DType::F32, &[-1, -1, -1]);
    let specs = [mind_lower::InputSpec::dynamic([1, 1, 1], [1, 2, 3], [3, 3, 3])];

    let (first, second) = std::thread::scope(|scope| {
        let a = scope.spawn(|| mind_lower::Converter::new(registry).convert(&dynamic, &specs));
        let b = scope.spawn(|| mind_lower::Converter::new(registry).convert(&dynamic, &specs));
        (
            a.join().expect("first thread"),
            b.join().expect("second thread"),
        )
    });

    let first = first.expect("first conversion");
    let second = second.expect("second conversion");
    assert_eq!(first, second);
    assert_eq!(first.to_string(), second.to_string());
    assert_eq!(
        first.used_ops().iter().map(OpId::as_str).collect::<Vec<_>>(),
        vec![aten::TANH]
    );
}
