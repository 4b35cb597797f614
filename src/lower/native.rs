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

//! Engine-native layers produced by conversion rules.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivationKind {
    Tanh,
    Relu,
    Sigmoid,
    LeakyRelu,
    /// Clamp to `[alpha, beta]`.
    Clip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryKind {
    Exp,
    Log,
    Neg,
    Abs,
    Sqrt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementWiseKind {
    Sum,
    Sub,
    Prod,
    Div,
}

/// One engine layer. Parameters that only some activations use default to 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NativeOp {
    Activation {
        kind: ActivationKind,
        alpha: f64,
        beta: f64,
    },
    Unary {
        kind: UnaryKind,
    },
    ElementWise {
        kind: ElementWiseKind,
    },
    Identity,
}

impl NativeOp {
    pub fn activation(kind: ActivationKind) -> Self {
        NativeOp::Activation {
            kind,
            alpha: 0.0,
            beta: 0.0,
        }
    }

    pub fn mnemonic(&self) -> &'static str {
        match self {
            NativeOp::Activation { kind, .. } => match kind {
                ActivationKind::Tanh => "activation.tanh",
                ActivationKind::Relu => "activation.relu",
                ActivationKind::Sigmoid => "activation.sigmoid",
                ActivationKind::LeakyRelu => "activation.leaky_relu",
                ActivationKind::Clip => "activation.clip",
            },
            NativeOp::Unary { kind } => match kind {
                UnaryKind::Exp => "unary.exp",
                UnaryKind::Log => "unary.log",
                UnaryKind::Neg => "unary.neg",
                UnaryKind::Abs => "unary.abs",
                UnaryKind::Sqrt => "unary.sqrt",
            },
            NativeOp::ElementWise { kind } => match kind {
                ElementWiseKind::Sum => "elementwise.sum",
                ElementWiseKind::Sub => "elementwise.sub",
                ElementWiseKind::Prod => "elementwise.prod",
                ElementWiseKind::Div => "elementwise.div",
            },
            NativeOp::Identity => "identity",
        }
    }
}

impl fmt::Display for NativeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())?;
        match self {
            NativeOp::Activation {
                kind: ActivationKind::LeakyRelu,
                alpha,
                ..
            } => write!(f, " alpha={alpha:?}"),
            NativeOp::Activation {
                kind: ActivationKind::Clip,
                alpha,
                beta,
            } => write!(f, " alpha={alpha:?} beta={beta:?}"),
            _ => Ok(()),
        }
    }
}
