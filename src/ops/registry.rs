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

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use log::debug;

use crate::error::ConvertError;
use crate::graph::GraphNode;
use crate::lower::NativeOp;
use crate::ops::{aten, OpId};
use crate::shapes::engine::ShapeRule;
use crate::shapes::ShapeRange;
use crate::types::DType;

/// Arity description for ops that accept a fixed or variadic input count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed(usize),
    Variadic { min: usize },
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Fixed(n) => count == n,
            Arity::Variadic { min } => count >= min,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Fixed(n) => write!(f, "{n}"),
            Arity::Variadic { min } => write!(f, "{min}+"),
        }
    }
}

/// Fixed-function metadata for a convertible operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpSignature {
    /// Fully qualified op name, overload included.
    pub name: &'static str,
    /// Number of inputs expected by the op.
    pub arity: Arity,
    /// Dtypes accepted by the op. An empty slice accepts every dtype.
    pub allowed_dtypes: &'static [DType],
    /// Short description of the op contract.
    pub summary: &'static str,
}

impl OpSignature {
    pub fn accepts_dtype(&self, dtype: DType) -> bool {
        self.allowed_dtypes.is_empty() || self.allowed_dtypes.contains(&dtype)
    }
}

/// Everything a conversion function may inspect about the node it lowers.
#[derive(Debug, Clone, Copy)]
pub struct ConversionCtx<'a> {
    pub node: &'a GraphNode,
    pub inputs: &'a [ShapeRange],
    pub dtypes: &'a [DType],
}

pub type ConvertFn = fn(&ConversionCtx<'_>) -> Result<NativeOp, ConvertError>;

/// Extra per-node acceptance check, run before shape propagation.
pub type CapabilityFn = fn(&GraphNode) -> bool;

/// How one source op is lowered: its signature, shape rule and emitter.
#[derive(Clone, Copy)]
pub struct ConversionRule {
    pub signature: OpSignature,
    pub shape: ShapeRule,
    pub convert: ConvertFn,
    pub supports_dynamic_shapes: bool,
    pub capability: Option<CapabilityFn>,
}

impl ConversionRule {
    pub fn new(signature: OpSignature, shape: ShapeRule, convert: ConvertFn) -> Self {
        Self {
            signature,
            shape,
            convert,
            supports_dynamic_shapes: true,
            capability: None,
        }
    }

    pub fn static_shapes_only(mut self) -> Self {
        self.supports_dynamic_shapes = false;
        self
    }

    pub fn with_capability(mut self, check: CapabilityFn) -> Self {
        self.capability = Some(check);
        self
    }

    pub fn name(&self) -> &'static str {
        self.signature.name
    }
}

impl fmt::Debug for ConversionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionRule")
            .field("signature", &self.signature)
            .field("shape", &self.shape)
            .field("supports_dynamic_shapes", &self.supports_dynamic_shapes)
            .field("capability", &self.capability.is_some())
            .finish_non_exhaustive()
    }
}

/// Op id to conversion rule table.
///
/// Built once before any conversion starts and only read afterwards, so a
/// shared reference can serve concurrent conversions. Iteration is sorted
/// by op id.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    rules: BTreeMap<OpId, ConversionRule>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in rule.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for rule in aten::builtin_rules() {
            registry
                .register(rule)
                .expect("built-in conversion rules have unique op ids");
        }
        registry
    }

    pub fn register(&mut self, rule: ConversionRule) -> Result<(), ConvertError> {
        let op = OpId::from(rule.name());
        if self.rules.contains_key(&op) {
            return Err(ConvertError::DuplicateRegistration { op });
        }
        debug!("registered conversion rule for `{op}`");
        self.rules.insert(op, rule);
        Ok(())
    }

    pub fn get(&self, op: &str) -> Option<&ConversionRule> {
        self.rules.get(op)
    }

    /// Like [`Registry::get`], but a miss names the op in an
    /// `UnsupportedOperation` error.
    pub fn lookup(&self, op: &str) -> Result<&ConversionRule, ConvertError> {
        self.get(op).ok_or_else(|| ConvertError::unsupported(op))
    }

    pub fn contains(&self, op: &str) -> bool {
        self.rules.contains_key(op)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OpId, &ConversionRule)> {
        self.rules.iter()
    }
}

/// Process-wide registry of built-in rules, initialised on first use.
pub fn default_registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(Registry::with_defaults)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_accepts() {
        assert!(Arity::Fixed(1).accepts(1));
        assert!(!Arity::Fixed(1).accepts(2));
        assert!(Arity::Variadic { min: 2 }.accepts(5));
        assert_eq!(Arity::Variadic { min: 2 }.to_string(), "2+");
    }

    #[test]
    fn registry_is_shareable_across_threads() {
        fn assert_sync<T: Send + Sync>() {}
        assert_sync::<Registry>();
    }
}
