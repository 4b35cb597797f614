use std::fmt;

use crate::error::ConvertError;
use crate::graph::GraphNode;
use crate::ops::ConversionRule;
use crate::shapes::{DimRange, Extent, ShapeError, ShapeRange};

/// Rule-supplied propagation for ops whose output shape is not one of the
/// built-in [`ShapeRuleKind`]s.
pub type PropagateFn = fn(&GraphNode, &[ShapeRange]) -> Result<ShapeRange, ShapeError>;

/// High-level shape rule categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeRuleKind {
    /// Unary elementwise op: output range equals input range.
    ElementwiseUnary,
    /// Binary elementwise op: broadcasting is applied to operands.
    ElementwiseBinary,
}

#[derive(Clone, Copy)]
pub enum ShapeRule {
    Kind(ShapeRuleKind),
    Custom(PropagateFn),
}

impl fmt::Debug for ShapeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeRule::Kind(kind) => f.debug_tuple("Kind").field(kind).finish(),
            ShapeRule::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl From<ShapeRuleKind> for ShapeRule {
    fn from(kind: ShapeRuleKind) -> Self {
        ShapeRule::Kind(kind)
    }
}

fn expect_inputs(inputs: &[ShapeRange], count: usize) -> Result<(), ShapeError> {
    if inputs.len() != count {
        return Err(ShapeError::RankMismatch {
            expected: count,
            found: inputs.len(),
        });
    }
    Ok(())
}

/// Broadcast one pair of dimensions.
///
/// A static `1` stretches to the other side. Two different non-unit
/// dimensions must agree at runtime, so the result is their intersection.
fn broadcast_dim(a: DimRange, b: DimRange) -> Option<DimRange> {
    if a == b || b == DimRange::fixed(1) {
        return Some(a);
    }
    if a == DimRange::fixed(1) {
        return Some(b);
    }

    let min = a.min.max(b.min);
    let max = a.max.min(b.max);
    if Extent::Known(min) > max {
        return None;
    }
    let mut opt = a.opt.max(b.opt).max(min);
    if let Extent::Known(hi) = max {
        opt = opt.min(hi);
    }
    Some(DimRange { min, opt, max })
}

/// Compute the broadcasted range for two input ranges following the
/// standard "numpy-style" broadcasting rules.
///
/// Ranges are aligned from the right; missing leading dimensions count
/// as a static `1`.
pub fn broadcast_ranges(lhs: &ShapeRange, rhs: &ShapeRange) -> Result<ShapeRange, ShapeError> {
    let (l, r) = (lhs.dims(), rhs.dims());
    let rank = l.len().max(r.len());
    let mut dims = Vec::with_capacity(rank);

    for i in 0..rank {
        let a = if i < l.len() { l[l.len() - 1 - i] } else { DimRange::fixed(1) };
        let b = if i < r.len() { r[r.len() - 1 - i] } else { DimRange::fixed(1) };
        let dim = broadcast_dim(a, b).ok_or_else(|| ShapeError::BroadcastIncompatible {
            lhs: lhs.clone(),
            rhs: rhs.clone(),
        })?;
        dims.push(dim);
    }

    dims.reverse();
    Ok(ShapeRange::new(dims))
}

/// Infer the output range for a built-in rule kind.
pub fn infer_range(kind: ShapeRuleKind, inputs: &[ShapeRange]) -> Result<ShapeRange, ShapeError> {
    match kind {
        ShapeRuleKind::ElementwiseUnary => {
            expect_inputs(inputs, 1)?;
            Ok(inputs[0].clone())
        }
        ShapeRuleKind::ElementwiseBinary => {
            expect_inputs(inputs, 2)?;
            broadcast_ranges(&inputs[0], &inputs[1])
        }
    }
}

/// Run a rule's shape function and check the result.
///
/// Every output dimension must satisfy `min <= opt <= max`; built-in kinds
/// always do, custom rules are checked here.
pub fn propagate(
    rule: &ConversionRule,
    node: &GraphNode,
    inputs: &[ShapeRange],
) -> Result<ShapeRange, ConvertError> {
    let output = match rule.shape {
        ShapeRule::Kind(kind) => infer_range(kind, inputs),
        ShapeRule::Custom(f) => f(node, inputs),
    }
    .map_err(|source| ConvertError::Shape {
        op: node.op.clone(),
        node: node.id,
        source,
    })?;

    if let Some(dim) = output.first_unordered() {
        return Err(ConvertError::ShapeRangeInconsistent {
            op: node.op.clone(),
            node: node.id,
            dim,
            range: output.dims()[dim],
        });
    }

    Ok(output)
}
