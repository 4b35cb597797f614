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

//! Built-in conversion rules for traced ATen operators.

use crate::error::ConvertError;
use crate::graph::GraphNode;
use crate::lower::{ActivationKind, ElementWiseKind, NativeOp, UnaryKind};
use crate::ops::registry::{Arity, ConversionCtx, ConversionRule, OpSignature};
use crate::shapes::engine::ShapeRuleKind;
use crate::types::DType;

pub const TANH: &str = "aten.tanh.default";
pub const RELU: &str = "aten.relu.default";
pub const SIGMOID: &str = "aten.sigmoid.default";
pub const LEAKY_RELU: &str = "aten.leaky_relu.default";
pub const HARDTANH: &str = "aten.hardtanh.default";
pub const EXP: &str = "aten.exp.default";
pub const LOG: &str = "aten.log.default";
pub const NEG: &str = "aten.neg.default";
pub const ABS: &str = "aten.abs.default";
pub const SQRT: &str = "aten.sqrt.default";
pub const CLONE: &str = "aten.clone.default";
pub const ADD: &str = "aten.add.Tensor";
pub const SUB: &str = "aten.sub.Tensor";
pub const MUL: &str = "aten.mul.Tensor";
pub const DIV: &str = "aten.div.Tensor";

const DEFAULT_NEGATIVE_SLOPE: f64 = 0.01;

fn unary(name: &'static str, dtypes: &'static [DType], summary: &'static str) -> OpSignature {
    OpSignature {
        name,
        arity: Arity::Fixed(1),
        allowed_dtypes: dtypes,
        summary,
    }
}

fn binary(name: &'static str, summary: &'static str) -> OpSignature {
    OpSignature {
        name,
        arity: Arity::Fixed(2),
        allowed_dtypes: DType::NUMERIC,
        summary,
    }
}

fn numeric_attr(ctx: &ConversionCtx<'_>, name: &str, default: f64) -> Result<f64, ConvertError> {
    ctx.node
        .attr_f64_or(name, default)
        .map_err(|message| ConvertError::InvalidAttribute {
            op: ctx.node.op.clone(),
            node: ctx.node.id,
            name: name.to_string(),
            message,
        })
}

fn convert_tanh(_: &ConversionCtx<'_>) -> Result<NativeOp, ConvertError> {
    Ok(NativeOp::activation(ActivationKind::Tanh))
}

fn convert_relu(_: &ConversionCtx<'_>) -> Result<NativeOp, ConvertError> {
    Ok(NativeOp::activation(ActivationKind::Relu))
}

fn convert_sigmoid(_: &ConversionCtx<'_>) -> Result<NativeOp, ConvertError> {
    Ok(NativeOp::activation(ActivationKind::Sigmoid))
}

fn convert_leaky_relu(ctx: &ConversionCtx<'_>) -> Result<NativeOp, ConvertError> {
    Ok(NativeOp::Activation {
        kind: ActivationKind::LeakyRelu,
        alpha: numeric_attr(ctx, "negative_slope", DEFAULT_NEGATIVE_SLOPE)?,
        beta: 0.0,
    })
}

fn convert_hardtanh(ctx: &ConversionCtx<'_>) -> Result<NativeOp, ConvertError> {
    Ok(NativeOp::Activation {
        kind: ActivationKind::Clip,
        alpha: numeric_attr(ctx, "min_val", -1.0)?,
        beta: numeric_attr(ctx, "max_val", 1.0)?,
    })
}

/// `min_val > max_val` has no clip layer equivalent.
fn hardtanh_bounds_ordered(node: &GraphNode) -> bool {
    match (
        node.attr_f64_or("min_val", -1.0),
        node.attr_f64_or("max_val", 1.0),
    ) {
        (Ok(lo), Ok(hi)) => lo <= hi,
        // Type errors are reported by the converter with more context.
        _ => true,
    }
}

fn convert_exp(_: &ConversionCtx<'_>) -> Result<NativeOp, ConvertError> {
    Ok(NativeOp::Unary { kind: UnaryKind::Exp })
}

fn convert_log(_: &ConversionCtx<'_>) -> Result<NativeOp, ConvertError> {
    Ok(NativeOp::Unary { kind: UnaryKind::Log })
}

fn convert_neg(_: &ConversionCtx<'_>) -> Result<NativeOp, ConvertError> {
    Ok(NativeOp::Unary { kind: UnaryKind::Neg })
}

fn convert_abs(_: &ConversionCtx<'_>) -> Result<NativeOp, ConvertError> {
    Ok(NativeOp::Unary { kind: UnaryKind::Abs })
}

fn convert_sqrt(_: &ConversionCtx<'_>) -> Result<NativeOp, ConvertError> {
    Ok(NativeOp::Unary { kind: UnaryKind::Sqrt })
}

fn convert_clone(_: &ConversionCtx<'_>) -> Result<NativeOp, ConvertError> {
    Ok(NativeOp::Identity)
}

fn convert_add(_: &ConversionCtx<'_>) -> Result<NativeOp, ConvertError> {
    Ok(NativeOp::ElementWise { kind: ElementWiseKind::Sum })
}

fn convert_sub(_: &ConversionCtx<'_>) -> Result<NativeOp, ConvertError> {
    Ok(NativeOp::ElementWise { kind: ElementWiseKind::Sub })
}

fn convert_mul(_: &ConversionCtx<'_>) -> Result<NativeOp, ConvertError> {
    Ok(NativeOp::ElementWise { kind: ElementWiseKind::Prod })
}

fn convert_div(_: &ConversionCtx<'_>) -> Result<NativeOp, ConvertError> {
    Ok(NativeOp::ElementWise { kind: ElementWiseKind::Div })
}

/// `add`/`sub` with a scaled second operand need an extra layer.
fn unit_alpha(node: &GraphNode) -> bool {
    node.attr("alpha")
        .map_or(true, |alpha| alpha.as_f64() == Some(1.0))
}

/// The built-in rules, in a stable order so listings stay deterministic.
pub fn builtin_rules() -> Vec<ConversionRule> {
    use ShapeRuleKind::{ElementwiseBinary, ElementwiseUnary};

    vec![
        ConversionRule::new(
            unary(TANH, DType::FLOATS, "Hyperbolic tangent activation."),
            ElementwiseUnary.into(),
            convert_tanh,
        ),
        ConversionRule::new(
            unary(RELU, DType::FLOATS, "Rectified linear activation."),
            ElementwiseUnary.into(),
            convert_relu,
        ),
        ConversionRule::new(
            unary(SIGMOID, DType::FLOATS, "Logistic sigmoid activation."),
            ElementwiseUnary.into(),
            convert_sigmoid,
        ),
        ConversionRule::new(
            unary(LEAKY_RELU, DType::FLOATS, "Leaky ReLU with `negative_slope`."),
            ElementwiseUnary.into(),
            convert_leaky_relu,
        ),
        ConversionRule::new(
            unary(HARDTANH, DType::FLOATS, "Clamp to [`min_val`, `max_val`]."),
            ElementwiseUnary.into(),
            convert_hardtanh,
        )
        .with_capability(hardtanh_bounds_ordered),
        ConversionRule::new(
            unary(EXP, DType::FLOATS, "Elementwise natural exponential."),
            ElementwiseUnary.into(),
            convert_exp,
        ),
        ConversionRule::new(
            unary(LOG, DType::FLOATS, "Elementwise natural logarithm."),
            ElementwiseUnary.into(),
            convert_log,
        ),
        ConversionRule::new(
            unary(NEG, DType::NUMERIC, "Elementwise negation."),
            ElementwiseUnary.into(),
            convert_neg,
        ),
        ConversionRule::new(
            unary(ABS, DType::NUMERIC, "Elementwise absolute value."),
            ElementwiseUnary.into(),
            convert_abs,
        ),
        ConversionRule::new(
            unary(SQRT, DType::FLOATS, "Elementwise square root."),
            ElementwiseUnary.into(),
            convert_sqrt,
        ),
        ConversionRule::new(
            unary(CLONE, &[], "Copy; lowers to an identity layer."),
            ElementwiseUnary.into(),
            convert_clone,
        ),
        ConversionRule::new(
            binary(ADD, "Elementwise addition with broadcasting."),
            ElementwiseBinary.into(),
            convert_add,
        )
        .with_capability(unit_alpha),
        ConversionRule::new(
            binary(SUB, "Elementwise subtraction with broadcasting."),
            ElementwiseBinary.into(),
            convert_sub,
        )
        .with_capability(unit_alpha),
        ConversionRule::new(
            binary(MUL, "Elementwise multiplication with broadcasting."),
            ElementwiseBinary.into(),
            convert_mul,
        ),
        ConversionRule::new(
            binary(DIV, "Elementwise division with broadcasting."),
            ElementwiseBinary.into(),
            convert_div,
        ),
    ]
}
